//! Centralized error types for the relay.

use thiserror::Error;

/// Main error type for relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("failed to serialize broadcast message: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("send deadline elapsed")]
    SendTimeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl ToString) -> Self {
        Self::Transport(msg.to_string())
    }
}
