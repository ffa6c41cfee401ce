/**
 * Relays plain DNS queries received on a UDP socket to a
 * DNS-over-TLS resolver. One fresh TLS session per query.
 */
mod admission;
mod dns_socket;
mod error;
mod exchange;
mod framing;
mod query_summary;
mod rate_limiter;
mod response_gate;
mod upstream;

#[cfg(test)]
mod test_helpers;

pub use dns_socket::RelaySocket;
pub use upstream::{TlsUpstream, UpstreamConnector, UpstreamSettings};
