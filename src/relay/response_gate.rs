use super::framing::{unframe_strip, LENGTH_PREFIX_SIZE};

/// RCODE 1. The upstream could not parse the query.
pub const FORMERR: u8 = 1;

/// Bytes of a message needed to reach the RCODE nibble.
pub const MIN_MESSAGE_LEN: usize = 4;

/// Offset of the flags byte holding the RCODE nibble, prefix included.
const RCODE_OFFSET: usize = LENGTH_PREFIX_SIZE + MIN_MESSAGE_LEN - 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Upstream answered FORMERR.
    MalformedQuery,
    /// Response too short to carry a header flags field.
    MissingHeader,
}

/// What to do with an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Send these bytes to the client.
    Forward(Vec<u8>),
    Drop(DropReason),
}

/// Extracts the RCODE nibble from a framed response.
pub fn response_code(framed_response: &[u8]) -> Option<u8> {
    framed_response.get(RCODE_OFFSET).map(|flags| flags & 0x0F)
}

/// Decides whether a framed upstream response is relayed to the client.
///
/// Only FORMERR is dropped. SERVFAIL, NXDOMAIN and friends are the client's business.
pub fn admit(framed_response: &[u8]) -> Decision {
    match response_code(framed_response) {
        None => Decision::Drop(DropReason::MissingHeader),
        Some(FORMERR) => Decision::Drop(DropReason::MalformedQuery),
        Some(_) => Decision::Forward(unframe_strip(framed_response).to_vec()),
    }
}
