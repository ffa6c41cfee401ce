/// Anything that can go wrong while relaying a single query.
///
/// None of these ever reach the client. The handler logs them and
/// the client sees a timeout, same as a silent upstream.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("Timeout. Upstream connection or TLS handshake did not complete in time.")]
    ConnectTimeout,

    #[error("Failed to connect to upstream. {0}")]
    Connect(std::io::Error),

    #[error("Upstream certificate rejected. {0}")]
    TlsVerification(std::io::Error),

    #[error("Invalid upstream TLS server name '{0}'.")]
    InvalidServerName(String),

    #[error("Timeout. No answer received from upstream.")]
    UpstreamTimeout,

    #[error("Upstream closed the connection without answering.")]
    EmptyResponse,

    #[error("Upstream response truncated. Expected {expected} bytes, received {received}.")]
    TruncatedResponse { expected: usize, received: usize },

    #[error("Upstream answered FORMERR. Query is malformed.")]
    MalformedQuery,

    #[error("Query of {0} bytes does not fit into a 2-byte length prefix.")]
    QueryTooLarge(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::ConnectTimeout => "connect_timeout",
            RelayError::Connect(_) => "connect_error",
            RelayError::TlsVerification(_) => "tls_verification_error",
            RelayError::InvalidServerName(_) => "invalid_server_name",
            RelayError::UpstreamTimeout => "upstream_timeout",
            RelayError::EmptyResponse => "empty_response",
            RelayError::TruncatedResponse { .. } => "truncated_response",
            RelayError::MalformedQuery => "malformed_query",
            RelayError::QueryTooLarge(_) => "query_too_large",
            RelayError::Io(_) => "io_error",
        }
    }
}
