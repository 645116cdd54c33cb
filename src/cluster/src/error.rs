use storage::StoreError;
use thiserror::Error;

/// Errors raised by the replication engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A peer or client sent a clock sized for a different replica count.
    #[error("vector clock has {actual} entries, expected {expected}")]
    ClockMismatch { expected: usize, actual: usize },
    #[error("unknown replica {0}")]
    UnknownReplica(usize),
}

/// Errors raised by a naming registry.
#[derive(Debug, Error)]
pub enum NamingError {
    #[error("naming registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed naming registry: {0}")]
    Format(#[from] serde_json::Error),
}
