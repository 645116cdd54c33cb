use server::Status;
use thiserror::Error;

/// Errors surfaced to frontend callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The replica rejected the request as invalid
    #[error("{status}: {message}")]
    Validation { status: Status, message: String },
    /// Retry and failover budget exhausted
    #[error("replica unavailable: {0}")]
    Unavailable(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("naming error: {0}")]
    Naming(String),
}
