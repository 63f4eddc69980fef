use crate::config::ConfigError;
use crate::stream::StreamError;

/// Error type shared by the client and the CLI.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Broad error category, used by the CLI to word its report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    ServerError,
    Connection,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 | 404 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl ClientError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Config(_) => ErrorCategory::InvalidRequest,
            ClientError::Transport(_) | ClientError::Stream(_) => ErrorCategory::Connection,
            ClientError::Decode(_) => ErrorCategory::ServerError,
            ClientError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// Whether the failure happened while moving bytes, as opposed to the
    /// service rejecting the request.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }
}
