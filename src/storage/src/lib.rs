// Core modules
pub mod types;
pub mod clock;
pub mod storage;

// Support modules
pub mod error;

// Re-export main types for convenience
pub use types::{
    Camera, ObjectKey, ObjectKind, Observation, Sighting, TrackedObject,
    current_timestamp_ms, sort_most_recent_first,
};
pub use clock::VectorClock;
pub use storage::{Registration, ReplicaStore};
pub use error::StoreError;
