use std::time::Duration;

use crate::cache::DEFAULT_CACHE_CAPACITY;

/// How the frontend picks its replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Always talk to this replica; never fail over.
    Pinned(usize),
    /// Talk to a random replica; fail over freely.
    Floating,
}

/// Frontend configuration
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    /// Replica count; the length of the client's vector clock
    pub replicas: usize,
    pub mode: Mode,
    /// Deadline for one attempt
    pub deadline: Duration,
    /// Consecutive timeouts tolerated before giving up on a replica
    pub max_attempts: usize,
    /// Replica switches per call before reporting unavailable (floating mode)
    pub max_failovers: usize,
    pub cache_capacity: usize,
}

impl FrontendConfig {
    pub fn new(replicas: usize, mode: Mode) -> Self {
        FrontendConfig {
            replicas,
            mode,
            deadline: Duration::from_secs(2),
            max_attempts: 3,
            max_failovers: 8,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn from_env() -> Self {
        let replicas = std::env::var("LOOKOUT_REPLICAS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let mode = std::env::var("LOOKOUT_TARGET_REPLICA")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Mode::Pinned)
            .unwrap_or(Mode::Floating);

        let mut config = FrontendConfig::new(replicas, mode);

        if let Some(ms) = std::env::var("LOOKOUT_RPC_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) {
            config.deadline = Duration::from_millis(ms);
        }

        if let Some(size) = std::env::var("LOOKOUT_CACHE_SIZE").ok().and_then(|v| v.parse().ok()) {
            config.cache_capacity = size;
        }

        config
    }
}
