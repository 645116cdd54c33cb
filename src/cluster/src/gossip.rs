use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use storage::VectorClock;
use thiserror::Error;

use crate::manager::ReplicationEngine;
use crate::naming::Naming;
use crate::replication::UpdateRecord;
use crate::types::{RemoteOutcome, ReplicaRecord};

/// Attempts against one peer before moving on to the next.
pub const GOSSIP_ATTEMPTS_PER_PEER: usize = 3;

/// Why a pull from a peer failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GossipFault {
    #[error("gossip pull timed out")]
    Timeout,
    #[error("peer unavailable: {0}")]
    Unavailable(String),
    #[error("peer rejected gossip pull: {0}")]
    Rejected(String),
}

/// Carries a gossip pull to a peer replica.
pub trait GossipTransport: Send {
    /// Send `clock` to the replica at `address` and return the updates it
    /// reports this replica is missing.
    fn pull(
        &mut self,
        address: &str,
        clock: &VectorClock,
    ) -> impl Future<Output = Result<Vec<UpdateRecord>, GossipFault>> + Send;
}

/// Counts from one completed round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub peer: usize,
    pub applied: usize,
    pub already_seen: usize,
    pub gaps: usize,
}

/// Pulls missing updates from a random peer.
pub struct GossipExchanger<T: GossipTransport> {
    engine: Arc<ReplicationEngine>,
    naming: Arc<dyn Naming>,
    transport: T,
    timeout: Duration,
}

impl<T: GossipTransport> GossipExchanger<T> {
    pub fn new(engine: Arc<ReplicationEngine>, naming: Arc<dyn Naming>, transport: T, timeout: Duration) -> Self {
        GossipExchanger {
            engine,
            naming,
            transport,
            timeout,
        }
    }

    /// Run one gossip round.
    ///
    /// Peers are tried in random order. A peer that times out is retried up
    /// to `GOSSIP_ATTEMPTS_PER_PEER` times; an unavailable one is skipped at
    /// once. Returns `None` when no peer answered.
    pub async fn round(&mut self) -> Option<RoundSummary> {
        let self_id = self.engine.replica_id();
        let mut peers: Vec<ReplicaRecord> = self
            .naming
            .list_replicas()
            .into_iter()
            .filter(|r| r.id != self_id)
            .collect();
        if peers.is_empty() {
            debug!("No peers to gossip with");
            return None;
        }
        peers.shuffle(&mut rand::thread_rng());

        let clock = self.engine.clock().await;
        for peer in &peers {
            let Some(updates) = self.pull_from(peer, &clock).await else {
                continue;
            };
            let summary = self.apply_updates(peer.id, updates).await;
            info!(
                "Gossip with replica {}: {} applied, {} already seen, {} skipped",
                summary.peer, summary.applied, summary.already_seen, summary.gaps
            );
            return Some(summary);
        }

        warn!("Gossip round abandoned: no peer reachable");
        None
    }

    async fn pull_from(&mut self, peer: &ReplicaRecord, clock: &VectorClock) -> Option<Vec<UpdateRecord>> {
        for attempt in 1..=GOSSIP_ATTEMPTS_PER_PEER {
            let result = match tokio::time::timeout(self.timeout, self.transport.pull(&peer.address, clock)).await {
                Ok(result) => result,
                Err(_) => Err(GossipFault::Timeout),
            };
            match result {
                Ok(updates) => return Some(updates),
                Err(GossipFault::Timeout) => {
                    debug!("Gossip pull from {} timed out (attempt {})", peer, attempt);
                }
                Err(e) => {
                    warn!("Gossip pull from {} failed: {}", peer, e);
                    return None;
                }
            }
        }
        warn!("Gossip pull from {} timed out {} times", peer, GOSSIP_ATTEMPTS_PER_PEER);
        None
    }

    async fn apply_updates(&self, peer: usize, updates: Vec<UpdateRecord>) -> RoundSummary {
        let mut summary = RoundSummary {
            peer,
            ..RoundSummary::default()
        };
        for update in updates {
            match self.engine.apply_remote(update).await {
                Ok(RemoteOutcome::Applied) => summary.applied += 1,
                Ok(RemoteOutcome::AlreadySeen) => summary.already_seen += 1,
                Ok(RemoteOutcome::Gap) => summary.gaps += 1,
                Err(e) => {
                    warn!("Dropping malformed update from replica {}: {}", peer, e);
                    summary.gaps += 1;
                }
            }
        }
        summary
    }

    /// Run a round every `interval` until shutdown is signalled.
    pub async fn run(mut self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Gossip every {:?}", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.round().await;
                }
                _ = shutdown.recv() => {
                    info!("Gossip task shutting down");
                    break;
                }
            }
        }
    }
}
