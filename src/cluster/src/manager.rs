use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard};
use log::{debug, info, warn};
use storage::{Camera, ObjectKey, Observation, Registration, ReplicaStore, StoreError, VectorClock};

use crate::error::EngineError;
use crate::replication::{ObjectDelta, OperationLog, UpdatePayload, UpdateRecord};
use crate::types::{Joined, LocalOutcome, RemoteOutcome};

/// Clock, log and client stamps. Always mutated together under one lock.
struct ReplicaState {
    clock: VectorClock,
    log: OperationLog,
    /// Highest write sequence accepted per client session
    client_stamps: HashMap<u64, u64>,
}

/// Replication engine: owns this replica's causal bookkeeping and applies
/// local writes and gossiped updates to the store.
///
/// Every write (local or remote) holds the state write lock for the whole
/// store mutation, clock update and log append, so gossip pulls and client
/// reads of the clock never see an increment without its log record.
pub struct ReplicationEngine {
    replica_id: usize,
    store: ReplicaStore,
    state: RwLock<ReplicaState>,
    sessions: AtomicU64,
}

impl ReplicationEngine {
    pub fn new(replica_id: usize, replicas: usize, store: ReplicaStore) -> Result<Self, EngineError> {
        if replica_id >= replicas {
            return Err(EngineError::UnknownReplica(replica_id));
        }
        info!("Replication engine for replica {} of {}", replica_id, replicas);

        Ok(ReplicationEngine {
            replica_id,
            store,
            state: RwLock::new(ReplicaState {
                clock: VectorClock::new(replicas),
                log: OperationLog::new(replicas),
                client_stamps: HashMap::new(),
            }),
            sessions: AtomicU64::new(0),
        })
    }

    pub fn replica_id(&self) -> usize {
        self.replica_id
    }

    pub fn store(&self) -> &ReplicaStore {
        &self.store
    }

    /// Snapshot of the current vector clock.
    pub async fn clock(&self) -> VectorClock {
        self.state.read().await.clock.clone()
    }

    /// Hold off writes while a query reads the store, so the clock returned
    /// with an answer covers exactly the updates the answer reflects.
    pub async fn read_view(&self) -> ReadView<'_> {
        ReadView {
            state: self.state.read().await,
            store: &self.store,
        }
    }

    /// Allocate a session id unique across replicas.
    pub fn next_session_id(&self) -> u64 {
        let counter = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        ((self.replica_id as u64) << 32) | (counter & 0xFFFF_FFFF)
    }

    /// Register a camera and open a client session.
    ///
    /// Re-registering an identical camera opens a new session without
    /// producing an update.
    pub async fn register_camera(&self, camera: Camera) -> Result<Joined, EngineError> {
        camera.validate()?;
        let mut state = self.state.write().await;

        match self.store.register_camera(camera.clone()).await {
            Registration::Created => {
                self.commit_local(&mut state, UpdatePayload::Camera(camera))?;
            }
            Registration::AlreadyExists => {
                debug!("Camera {} already registered", camera.name);
            }
            Registration::Conflict => return Err(StoreError::Conflict(camera.name).into()),
        }

        Ok(Joined {
            session_id: self.next_session_id(),
            clock: state.clock.clone(),
        })
    }

    /// Apply a write submitted by `client_id` with write sequence `client_seq`.
    ///
    /// A sequence at or below the highest one already accepted from the same
    /// client is a retransmission: nothing changes and the current clock is
    /// returned.
    pub async fn apply_local(
        &self,
        client_id: u64,
        client_seq: u64,
        deltas: Vec<ObjectDelta>,
    ) -> Result<LocalOutcome, EngineError> {
        let mut state = self.state.write().await;

        if let Some(&last) = state.client_stamps.get(&client_id) {
            if client_seq <= last {
                debug!("Duplicate write {} from client {:#x}", client_seq, client_id);
                return Ok(LocalOutcome::Duplicate(state.clock.clone()));
            }
        }

        let payload = UpdatePayload::Observations(deltas);
        self.apply_payload(&payload).await;
        state.client_stamps.insert(client_id, client_seq);
        self.commit_local(&mut state, payload)?;
        Ok(LocalOutcome::Applied(state.clock.clone()))
    }

    fn commit_local(&self, state: &mut ReplicaState, payload: UpdatePayload) -> Result<(), EngineError> {
        let seq = state.clock.increment(self.replica_id);
        state.log.append(UpdateRecord {
            origin: self.replica_id,
            seq,
            payload,
        })
    }

    async fn apply_payload(&self, payload: &UpdatePayload) {
        match payload {
            UpdatePayload::Camera(camera) => {
                if self.store.register_camera(camera.clone()).await == Registration::Conflict {
                    warn!("Keeping local camera {}; ignoring conflicting remote registration", camera.name);
                }
            }
            UpdatePayload::Observations(deltas) => {
                for delta in deltas {
                    let mut observations = Vec::with_capacity(delta.observations.len());
                    for observation in &delta.observations {
                        let camera = self.store.ensure_camera(&observation.camera).await;
                        observations.push(Observation::new(observation.timestamp, camera));
                    }
                    self.store.apply_observations(delta.key.clone(), observations).await;
                }
            }
        }
    }

    /// Every update this replica holds that `peer_clock` shows the peer is
    /// missing, grouped by origin and ascending within each origin.
    pub async fn pull_missing(&self, peer_clock: &VectorClock) -> Result<Vec<UpdateRecord>, EngineError> {
        let state = self.state.read().await;
        if peer_clock.len() != state.clock.len() {
            return Err(EngineError::ClockMismatch {
                expected: state.clock.len(),
                actual: peer_clock.len(),
            });
        }

        let mut updates = Vec::new();
        for origin in 0..state.clock.len() {
            let ours = state.clock.get(origin);
            let theirs = peer_clock.get(origin);
            if ours > theirs {
                updates.extend_from_slice(state.log.range(origin, theirs, ours));
            }
        }
        Ok(updates)
    }

    /// Apply one update received through gossip.
    pub async fn apply_remote(&self, update: UpdateRecord) -> Result<RemoteOutcome, EngineError> {
        let mut state = self.state.write().await;
        if update.origin >= state.clock.len() {
            return Err(EngineError::UnknownReplica(update.origin));
        }

        let current = state.clock.get(update.origin);
        if update.seq <= current {
            return Ok(RemoteOutcome::AlreadySeen);
        }
        if update.seq > current + 1 {
            warn!(
                "Skipping update {} from replica {}: only {} applied so far",
                update.seq, update.origin, current
            );
            return Ok(RemoteOutcome::Gap);
        }

        self.apply_payload(&update.payload).await;
        state.clock.advance(update.origin, update.seq);
        state.log.append(update)?;
        Ok(RemoteOutcome::Applied)
    }

    /// Insert a camera and one observation without conflict checks or
    /// bookkeeping. Bootstrap helper.
    pub async fn seed(&self, camera: Camera, key: ObjectKey, timestamp: u64) {
        let camera = self.store.insert_camera_unchecked(camera).await;
        self.store
            .apply_observations(key, vec![Observation::new(timestamp, camera)])
            .await;
    }

    /// Drop every camera and object. The clock and log are kept.
    pub async fn reset(&self) {
        let cameras = self.store.cameras_count().await;
        let objects = self.store.objects_count().await;
        self.store.clear().await;
        info!("Dropped {} cameras and {} tracked objects", cameras, objects);
    }
}

/// Consistent read of the store together with the clock.
pub struct ReadView<'a> {
    state: RwLockReadGuard<'a, ReplicaState>,
    store: &'a ReplicaStore,
}

impl ReadView<'_> {
    pub fn store(&self) -> &ReplicaStore {
        self.store
    }

    pub fn clock(&self) -> VectorClock {
        self.state.clock.clone()
    }
}

/// Group report entries per object, preserving first-seen order.
pub fn group_observations(entries: Vec<(ObjectKey, Observation)>) -> Vec<ObjectDelta> {
    let mut deltas: Vec<ObjectDelta> = Vec::new();
    let mut index: HashMap<ObjectKey, usize> = HashMap::new();
    for (key, observation) in entries {
        match index.get(&key) {
            Some(&i) => deltas[i].observations.push(observation),
            None => {
                index.insert(key.clone(), deltas.len());
                deltas.push(ObjectDelta {
                    key,
                    observations: vec![observation],
                });
            }
        }
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use storage::ObjectKind;

    fn engine(id: usize, replicas: usize) -> ReplicationEngine {
        ReplicationEngine::new(id, replicas, ReplicaStore::new()).unwrap()
    }

    fn report(camera: &Camera, kind: ObjectKind, id: &str, timestamp: u64) -> Vec<ObjectDelta> {
        vec![ObjectDelta {
            key: ObjectKey::new(kind, id),
            observations: vec![Observation::new(timestamp, Arc::new(camera.clone()))],
        }]
    }

    #[test]
    fn test_replica_id_out_of_range() {
        assert!(matches!(
            ReplicationEngine::new(2, 2, ReplicaStore::new()),
            Err(EngineError::UnknownReplica(2))
        ));
    }

    #[test]
    fn test_session_ids_are_unique_per_replica() {
        let a = engine(0, 2);
        let b = engine(1, 2);
        let first = a.next_session_id();
        assert_ne!(first, a.next_session_id());
        assert_ne!(first, b.next_session_id());
        assert_eq!(b.next_session_id() >> 32, 1);
    }

    #[tokio::test]
    async fn test_register_camera_advances_clock_once() {
        let engine = engine(0, 2);
        let cam = Camera::new("Cam1", 1.0, 2.0);

        let joined = engine.register_camera(cam.clone()).await.unwrap();
        assert_eq!(joined.clock.as_slice(), &[1, 0]);

        let again = engine.register_camera(cam).await.unwrap();
        assert_eq!(again.clock.as_slice(), &[1, 0]);
        assert_ne!(joined.session_id, again.session_id);

        let conflict = engine.register_camera(Camera::new("Cam1", 5.0, 5.0)).await;
        assert!(matches!(conflict, Err(EngineError::Store(StoreError::Conflict(_)))));
        assert_eq!(engine.clock().await.as_slice(), &[1, 0]);
        assert_eq!(engine.store().get_camera("Cam1").await.unwrap().latitude, 1.0);
    }

    #[tokio::test]
    async fn test_register_invalid_camera() {
        let engine = engine(0, 1);
        let result = engine.register_camera(Camera::new("C", 0.0, 0.0)).await;
        assert!(matches!(result, Err(EngineError::Store(StoreError::InvalidArgument(_)))));
        assert_eq!(engine.clock().await.as_slice(), &[0]);
    }

    #[tokio::test]
    async fn test_apply_local_is_idempotent_per_client_seq() {
        let engine = engine(0, 2);
        let cam = Camera::new("Cam1", 0.0, 0.0);
        let joined = engine.register_camera(cam.clone()).await.unwrap();
        let key = ObjectKey::new(ObjectKind::Person, "1");

        let first = engine
            .apply_local(joined.session_id, 1, report(&cam, ObjectKind::Person, "1", 10))
            .await
            .unwrap();
        assert_eq!(first, LocalOutcome::Applied(VectorClock::from_counts(vec![2, 0])));

        let retry = engine
            .apply_local(joined.session_id, 1, report(&cam, ObjectKind::Person, "1", 10))
            .await
            .unwrap();
        assert_eq!(retry, LocalOutcome::Duplicate(VectorClock::from_counts(vec![2, 0])));
        assert_eq!(engine.store().find_exact(&key).await.unwrap().len(), 1);

        // another client is not affected by the first client's stamp
        engine
            .apply_local(joined.session_id + 1, 1, report(&cam, ObjectKind::Person, "1", 11))
            .await
            .unwrap();
        assert_eq!(engine.store().find_exact(&key).await.unwrap().len(), 2);
        assert_eq!(engine.clock().await.as_slice(), &[3, 0]);
    }

    #[tokio::test]
    async fn test_read_view_holds_off_writes() {
        let engine = Arc::new(engine(0, 1));
        let cam = Camera::new("Cam1", 0.0, 0.0);
        let joined = engine.register_camera(cam.clone()).await.unwrap();
        let key = ObjectKey::new(ObjectKind::Person, "1");

        let view = engine.read_view().await;
        let writer = {
            let engine = engine.clone();
            let deltas = report(&cam, ObjectKind::Person, "1", 10);
            tokio::spawn(async move { engine.apply_local(joined.session_id, 1, deltas).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(view.store().find_exact(&key).await.is_none());
        assert_eq!(view.clock().as_slice(), &[1]);
        assert!(!writer.is_finished());
        drop(view);

        writer.await.unwrap().unwrap();
        let view = engine.read_view().await;
        assert_eq!(view.store().find_exact(&key).await.unwrap().len(), 1);
        assert_eq!(view.clock().as_slice(), &[2]);
    }

    #[tokio::test]
    async fn test_pull_missing_returns_unseen_suffix() {
        let engine = engine(0, 2);
        let cam = Camera::new("Cam1", 0.0, 0.0);
        let joined = engine.register_camera(cam.clone()).await.unwrap();
        for seq in 1..=3 {
            engine
                .apply_local(joined.session_id, seq, report(&cam, ObjectKind::Person, "1", seq))
                .await
                .unwrap();
        }

        let all = engine.pull_missing(&VectorClock::new(2)).await.unwrap();
        assert_eq!(all.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let suffix = engine
            .pull_missing(&VectorClock::from_counts(vec![2, 0]))
            .await
            .unwrap();
        assert_eq!(suffix.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![3, 4]);

        let none = engine
            .pull_missing(&VectorClock::from_counts(vec![4, 7]))
            .await
            .unwrap();
        assert!(none.is_empty());

        assert!(matches!(
            engine.pull_missing(&VectorClock::new(3)).await,
            Err(EngineError::ClockMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_gossip_between_two_engines() {
        let a = engine(0, 2);
        let b = engine(1, 2);
        let cam = Camera::new("Cam1", 3.0, 4.0);
        let joined = a.register_camera(cam.clone()).await.unwrap();
        a.apply_local(joined.session_id, 1, report(&cam, ObjectKind::Car, "AB12CD", 5))
            .await
            .unwrap();

        for update in a.pull_missing(&b.clock().await).await.unwrap() {
            assert_eq!(b.apply_remote(update).await.unwrap(), RemoteOutcome::Applied);
        }

        assert_eq!(b.clock().await.as_slice(), &[2, 0]);
        assert_eq!(b.store().get_camera("Cam1").await.unwrap().longitude, 4.0);
        let object = b
            .store()
            .find_exact(&ObjectKey::new(ObjectKind::Car, "AB12CD"))
            .await
            .unwrap();
        assert_eq!(object.latest().map(|o| o.timestamp), Some(5));

        // replaying the same round changes nothing
        for update in a.pull_missing(&VectorClock::new(2)).await.unwrap() {
            assert_eq!(b.apply_remote(update).await.unwrap(), RemoteOutcome::AlreadySeen);
        }
        assert_eq!(
            b.store()
                .find_exact(&ObjectKey::new(ObjectKind::Car, "AB12CD"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_transitive_relay() {
        let a = engine(0, 3);
        let b = engine(1, 3);
        let c = engine(2, 3);
        a.register_camera(Camera::new("Cam1", 0.0, 0.0)).await.unwrap();

        for update in a.pull_missing(&b.clock().await).await.unwrap() {
            b.apply_remote(update).await.unwrap();
        }
        for update in b.pull_missing(&c.clock().await).await.unwrap() {
            assert_eq!(update.origin, 0);
            c.apply_remote(update).await.unwrap();
        }

        assert_eq!(c.clock().await.as_slice(), &[1, 0, 0]);
        assert!(c.store().has_camera("Cam1").await);
    }

    #[tokio::test]
    async fn test_apply_remote_gap_is_skipped() {
        let a = engine(0, 2);
        let b = engine(1, 2);
        a.register_camera(Camera::new("Cam1", 0.0, 0.0)).await.unwrap();
        a.register_camera(Camera::new("Cam2", 0.0, 0.0)).await.unwrap();

        let updates = a.pull_missing(&VectorClock::new(2)).await.unwrap();
        let second = updates[1].clone();
        assert_eq!(b.apply_remote(second).await.unwrap(), RemoteOutcome::Gap);
        assert_eq!(b.clock().await.as_slice(), &[0, 0]);
        assert!(!b.store().has_camera("Cam2").await);

        assert!(matches!(
            b.apply_remote(UpdateRecord { origin: 9, ..updates[0].clone() }).await,
            Err(EngineError::UnknownReplica(9))
        ));
    }

    #[tokio::test]
    async fn test_remote_camera_conflict_keeps_local() {
        let a = engine(0, 2);
        let b = engine(1, 2);
        a.register_camera(Camera::new("Cam1", 1.0, 1.0)).await.unwrap();
        b.register_camera(Camera::new("Cam1", 2.0, 2.0)).await.unwrap();

        for update in a.pull_missing(&b.clock().await).await.unwrap() {
            assert_eq!(b.apply_remote(update).await.unwrap(), RemoteOutcome::Applied);
        }

        assert_eq!(b.clock().await.as_slice(), &[1, 1]);
        assert_eq!(b.store().get_camera("Cam1").await.unwrap().latitude, 2.0);
    }

    #[tokio::test]
    async fn test_reset_keeps_clock() {
        let engine = engine(0, 1);
        engine.register_camera(Camera::new("Cam1", 0.0, 0.0)).await.unwrap();
        engine.reset().await;

        assert_eq!(engine.clock().await.as_slice(), &[1]);
        assert!(!engine.store().has_camera("Cam1").await);
    }

    #[tokio::test]
    async fn test_seed_bypasses_bookkeeping() {
        let engine = engine(0, 1);
        engine
            .seed(Camera::new("Cam1", 0.0, 0.0), ObjectKey::new(ObjectKind::Person, "5"), 100)
            .await;
        engine
            .seed(Camera::new("Cam1", 9.0, 9.0), ObjectKey::new(ObjectKind::Person, "5"), 200)
            .await;

        assert_eq!(engine.clock().await.as_slice(), &[0]);
        let object = engine
            .store()
            .find_exact(&ObjectKey::new(ObjectKind::Person, "5"))
            .await
            .unwrap();
        assert_eq!(object.len(), 2);
    }

    #[test]
    fn test_group_observations() {
        let cam = Arc::new(Camera::new("Cam1", 0.0, 0.0));
        let p1 = ObjectKey::new(ObjectKind::Person, "1");
        let c1 = ObjectKey::new(ObjectKind::Car, "AB12CD");
        let deltas = group_observations(vec![
            (p1.clone(), Observation::new(1, cam.clone())),
            (c1.clone(), Observation::new(1, cam.clone())),
            (p1.clone(), Observation::new(1, cam.clone())),
        ]);

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].key, p1);
        assert_eq!(deltas[0].observations.len(), 2);
        assert_eq!(deltas[1].key, c1);
    }
}
