//! Error types and result handling for core operations.
//!
//! Covers queue transport failures, missing entities, and invalid chain
//! definitions. Engine-level failures (link execution, dead-lettering,
//! worker supervision) live in the engine crate's own error type.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for queue and configuration operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Queue store operation failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or is malformed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Queue(err.to_string())
    }
}
