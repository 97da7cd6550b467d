//! Gateway-specific error types.

use thiserror::Error;

/// Result type for gateway operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Errors that can occur while running a statement against the database.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("failed to reach database: {0}")]
    Transport(#[from] reqwest::Error),

    /// The database rejected the statement.
    #[error("database error (status {status}): {message}")]
    Database {
        /// HTTP status returned by the server.
        status: u16,
        /// Error text as reported by the database.
        message: String,
    },

    /// The response body was not in the expected format.
    #[error("failed to decode database response: {0}")]
    Decode(#[source] serde_json::Error),

    /// A parameter value could not be bound.
    #[error("unsupported value for parameter '{0}'")]
    UnsupportedParameter(String),

    /// Invalid gateway configuration.
    #[error("invalid gateway configuration: {0}")]
    InvalidConfig(String),
}

impl ExecutionError {
    /// Create a database error from a status code and body.
    pub fn database(status: u16, message: impl Into<String>) -> Self {
        Self::Database {
            status,
            message: message.into(),
        }
    }

    /// Check if running the same statement again may succeed: timeouts,
    /// refused connections and gateway errors in front of the server.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Database { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }
}
