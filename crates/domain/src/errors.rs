use thiserror::Error;

/// Failure of a single `resolve` call against one upstream.
///
/// Transports never retry; every variant names the remote server so the
/// caller can log it and decide whether to try the next configured upstream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Cannot reach {server}: {reason}")]
    Unreachable { server: String, reason: String },

    #[error("No DNS response from {server}")]
    NoResponse { server: String },

    #[error("Response buffer too small for response of length {size} (capacity {capacity})")]
    BufferTooSmall { size: usize, capacity: usize },

    #[error("DoH request to {url} failed: {status} - {reason}")]
    UpstreamHttp {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("Malformed response from {server}: {reason}")]
    MalformedResponse { server: String, reason: String },

    #[error("Query of {size} bytes exceeds the {max} byte limit of the transport")]
    QueryTooLarge { size: usize, max: usize },

    #[error("No upstream servers available")]
    NoUpstreamAvailable,
}

impl UpstreamError {
    /// Whether another upstream (or a later attempt) could reasonably succeed.
    ///
    /// Sizing problems are on the caller's side and are not worth retrying
    /// elsewhere.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            UpstreamError::BufferTooSmall { .. }
                | UpstreamError::QueryTooLarge { .. }
                | UpstreamError::NoUpstreamAvailable
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::NoResponse { .. })
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            UpstreamError::Unreachable { server, .. }
            | UpstreamError::NoResponse { server }
            | UpstreamError::MalformedResponse { server, .. } => Some(server),
            UpstreamError::UpstreamHttp { url, .. } => Some(url),
            UpstreamError::BufferTooSmall { .. }
            | UpstreamError::QueryTooLarge { .. }
            | UpstreamError::NoUpstreamAvailable => None,
        }
    }
}
