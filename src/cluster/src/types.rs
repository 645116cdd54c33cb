use serde::{Deserialize, Serialize};
use storage::VectorClock;

/// A replica as listed by the naming registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaRecord {
    pub id: usize,
    /// `host:port`
    pub address: String,
}

impl ReplicaRecord {
    pub fn new(id: usize, address: impl Into<String>) -> Self {
        ReplicaRecord {
            id,
            address: address.into(),
        }
    }
}

impl std::fmt::Display for ReplicaRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "replica {} at {}", self.id, self.address)
    }
}

/// Result of a local write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOutcome {
    /// The write changed state; carries the clock right after it.
    Applied(VectorClock),
    /// Retransmission of an already accepted write; carries the current clock.
    Duplicate(VectorClock),
}

impl LocalOutcome {
    pub fn into_clock(self) -> VectorClock {
        match self {
            LocalOutcome::Applied(clock) | LocalOutcome::Duplicate(clock) => clock,
        }
    }
}

/// Result of applying one update received through gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied,
    AlreadySeen,
    /// Earlier updates from the same origin are still missing; skipped.
    Gap,
}

/// Result of a camera registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub session_id: u64,
    pub clock: VectorClock,
}
