use thiserror::Error;

/// Errors raised by validation and by the replica store itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Malformed request data (camera name, coordinates, kind/id format).
    #[error("{0}")]
    InvalidArgument(String),
    /// Lookup miss (unknown camera).
    #[error("{0}")]
    NotFound(String),
    /// Camera re-registration with different coordinates.
    #[error("Camera with name {0} already exists and has different coords")]
    Conflict(String),
}

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        StoreError::NotFound(msg.into())
    }
}
