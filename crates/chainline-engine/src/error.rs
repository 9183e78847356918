//! Error types for chain processing operations.
//!
//! Separates configuration errors (which must fail before any link runs)
//! from execution errors (which dead-letter the record) and supervision
//! errors (shutdown timeouts, worker panics). Wrap-up failures are not
//! represented here at all: they are caught and logged inside wrap-up
//! because a record already accepted into the pipeline must not be lost
//! over a downstream sink failure.

use std::time::Duration;

use chainline_core::CoreError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error types for chain execution and worker supervision.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A link implementation failed; fatal for this record's chain pass.
    #[error("link {link} failed: {message}")]
    LinkFailed {
        /// Name of the link that failed
        link: String,
        /// Error message from the link implementation
        message: String,
    },

    /// A storage backend rejected a save. Only surfaced by direct backend
    /// calls; wrap-up catches and logs it instead of propagating.
    #[error("storage backend {backend} failed: {message}")]
    StorageFailed {
        /// Name of the backend that failed
        backend: String,
        /// Error message from the backend
        message: String,
    },

    /// A chain references a link name the registry cannot resolve.
    #[error("unknown link: {0}")]
    UnknownLink(String),

    /// A chain references a storage name the registry cannot resolve.
    #[error("unknown storage backend: {0}")]
    UnknownStorage(String),

    /// Two enabled chains claim the same ingress queue.
    #[error("queue {queue} is claimed by both chain {first} and chain {second}")]
    AmbiguousQueue {
        /// The contested ingress queue name
        queue: String,
        /// Name of the chain that claimed the queue first
        first: String,
        /// Name of the chain that claimed the queue second
        second: String,
    },

    /// A chain definition violates a structural invariant.
    #[error("invalid chain {chain}: {message}")]
    InvalidChain {
        /// Name of the offending chain
        chain: String,
        /// Description of the violation
        message: String,
    },

    /// Chain configuration could not be loaded.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Queue store operation failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// Graceful shutdown exceeded its deadline.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Id of the worker whose task panicked
        worker_id: usize,
        /// Join error description
        error: String,
    },
}

impl EngineError {
    /// Creates a link failure error.
    pub fn link_failed(link: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LinkFailed { link: link.into(), message: message.into() }
    }

    /// Creates a storage failure error.
    pub fn storage_failed(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageFailed { backend: backend.into(), message: message.into() }
    }

    /// Creates an invalid chain error.
    pub fn invalid_chain(chain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidChain { chain: chain.into(), message: message.into() }
    }

    /// True for errors caused by the chain table rather than the record.
    ///
    /// Configuration errors must surface before any link executes; they
    /// still dead-letter the in-flight record because the pop is already
    /// irreversible by the time they are observed.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownLink(_)
                | Self::UnknownStorage(_)
                | Self::AmbiguousQueue { .. }
                | Self::InvalidChain { .. }
                | Self::Configuration(_)
        )
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Queue(message) => Self::Queue(message),
            CoreError::Configuration(message) => Self::Configuration(message),
            CoreError::NotFound(message) | CoreError::InvalidInput(message) => {
                Self::Configuration(message)
            },
        }
    }
}
