use cluster::{EngineError, NamingError};
use storage::StoreError;
use thiserror::Error;

use crate::message::Status;

/// Error type for replica startup and configuration
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// A request failure as sent back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {message}")]
pub struct RpcError {
    pub status: Status,
    pub message: String,
}

impl RpcError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        RpcError {
            status,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        RpcError::new(Status::InvalidArgument, message)
    }
}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => RpcError::new(Status::NotFound, msg),
            // conflicts are reported as bad input
            other => RpcError::invalid(other.to_string()),
        }
    }
}

impl From<EngineError> for RpcError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(e) => e.into(),
            other => RpcError::invalid(other.to_string()),
        }
    }
}
