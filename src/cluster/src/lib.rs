pub mod config;
pub mod error;
pub mod types;
pub mod replication;
pub mod manager;
pub mod naming;
pub mod gossip;

// Re-exports for convenience
pub use config::ReplicaConfig;
pub use error::{EngineError, NamingError};
pub use types::*;
pub use replication::{ObjectDelta, OperationLog, UpdatePayload, UpdateRecord};
pub use manager::{ReadView, ReplicationEngine, group_observations};
pub use naming::{FileNaming, Naming, StaticNaming};
pub use gossip::{GossipExchanger, GossipFault, GossipTransport, RoundSummary};
