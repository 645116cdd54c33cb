use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_PORT: u16 = 8080;

/// Replica configuration
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub replica_id: usize,
    /// Fixed replica count; the length of every vector clock
    pub replicas: usize,
    pub host: String,
    pub port: u16,
    /// `None` disables gossip
    pub gossip_interval: Option<Duration>,
    /// Deadline for one gossip pull
    pub rpc_timeout: Duration,
    /// Shared naming registry file; in-process registry when unset
    pub naming_file: Option<PathBuf>,
}

impl ReplicaConfig {
    pub fn new(replica_id: usize, replicas: usize) -> Self {
        ReplicaConfig {
            replica_id,
            replicas,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_BASE_PORT.saturating_add(replica_id as u16),
            gossip_interval: Some(Duration::from_secs(30)),
            rpc_timeout: Duration::from_millis(2000),
            naming_file: None,
        }
    }

    pub fn from_env() -> Option<Self> {
        let replica_id: usize = std::env::var("LOOKOUT_REPLICA_ID").ok()?.parse().ok()?;

        let replicas = std::env::var("LOOKOUT_REPLICAS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        if replica_id >= replicas {
            return None;
        }

        let mut config = ReplicaConfig::new(replica_id, replicas);

        if let Ok(host) = std::env::var("LOOKOUT_HOST") {
            config.host = host;
        }

        if let Some(port) = std::env::var("LOOKOUT_PORT").ok().and_then(|v| v.parse().ok()) {
            config.port = port;
        }

        if let Some(secs) = std::env::var("LOOKOUT_GOSSIP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.gossip_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(ms) = std::env::var("LOOKOUT_RPC_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) {
            config.rpc_timeout = Duration::from_millis(ms);
        }

        config.naming_file = std::env::var("LOOKOUT_NAMING_FILE").ok().map(PathBuf::from);

        Some(config)
    }

    /// `host:port` this replica listens on and publishes.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
