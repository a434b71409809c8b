use std::time::Duration;
use thiserror::Error;

/// Result type for dispatcher operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Infrastructure errors for dispatcher operations
///
/// A job's own failure never shows up here: it is reported through the
/// metrics sink and the log stream only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Dispatcher did not become idle within {waited:?}")]
    IdleTimeout { waited: Duration },

    #[error("Dispatcher has been shut down")]
    ShutDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Job execution outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error - will schedule retry if attempts remain
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}
