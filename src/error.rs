//! Error types for the media streaming gateway

use thiserror::Error;

/// Result type alias for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Error types that can occur while resolving and streaming media
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("{0}")]
    InvalidIdentifier(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(i64),

    #[error("Unexpected peer kind for container {id}: {kind}")]
    UnexpectedPeerKind { id: i64, kind: String },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Malformed media: {0}")]
    MalformedMedia(String),

    #[error("Invalid byte range: {0}")]
    InvalidRange(String),

    #[error("Remote fetch error: {0}")]
    RemoteFetchError(String),

    #[error("Unexpected response shape: {0}")]
    UnexpectedResponseShape(String),

    #[error("Stream truncated: expected {expected} bytes, delivered {delivered}")]
    TruncatedStream { expected: u64, delivered: u64 },

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::RemoteFetchError(err.to_string())
    }
}

impl From<bincode::Error> for StreamError {
    fn from(err: bincode::Error) -> Self {
        StreamError::CacheError(err.to_string())
    }
}

impl StreamError {
    /// Convert error to HTTP status code
    ///
    /// Caller-fault errors and everything that means "this object cannot be
    /// served as a file" map to 400. Remote failures and broken contracts
    /// with the remote API map to 500.
    pub fn to_http_status(&self) -> u16 {
        match self {
            StreamError::InvalidIdentifier(_) => 400,
            StreamError::InvalidRange(_) => 400,

            // No distinct 404: lookups that yield nothing are client errors
            StreamError::ObjectNotFound(_) => 400,
            StreamError::ContainerNotFound(_) => 400,
            StreamError::UnexpectedPeerKind { .. } => 400,
            StreamError::UnsupportedMediaType(_) => 400,
            StreamError::MalformedMedia(_) => 400,

            // Cache failures abort resolution, which is surfaced like any
            // other resolution failure
            StreamError::CacheError(_) => 400,

            StreamError::RemoteFetchError(_) => 500,
            StreamError::UnexpectedResponseShape(_) => 500,
            StreamError::TruncatedStream { .. } => 500,
            StreamError::ConfigError(_) => 500,
            StreamError::IoError(_) => 500,
            StreamError::InternalError(_) => 500,
        }
    }

    /// Whether the caller is at fault for this error
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.to_http_status())
    }

    /// Create a RemoteFetchError from anything displayable
    pub fn remote(message: impl std::fmt::Display) -> Self {
        StreamError::RemoteFetchError(message.to_string())
    }
}
