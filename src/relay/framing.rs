//! RFC 1035 4.2.2 length-prefixed framing for stream transports.
//! https://datatracker.ietf.org/doc/html/rfc7858#section-3.3

use super::error::RelayError;

/// Size of the big-endian length prefix in front of every message.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Prefixes a raw DNS message with its 2-byte big-endian length.
pub fn frame(query: &[u8]) -> Result<Vec<u8>, RelayError> {
    let length = u16::try_from(query.len()).map_err(|_| RelayError::QueryTooLarge(query.len()))?;
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + query.len());
    framed.extend_from_slice(&length.to_be_bytes());
    framed.extend_from_slice(query);
    Ok(framed)
}

/// Removes the length prefix. The declared length is not checked against the payload.
pub fn unframe_strip(framed: &[u8]) -> &[u8] {
    framed.get(LENGTH_PREFIX_SIZE..).unwrap_or(&[])
}

/// Declared length of a framed message.
pub fn declared_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> usize {
    u16::from_be_bytes(prefix) as usize
}
