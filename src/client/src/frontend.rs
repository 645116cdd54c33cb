//! Client-side access to the replicas.
//!
//! `ClientFrontend` wraps a replica channel with the retry and failover
//! policy and keeps the client's view of causal progress:
//!
//! - every response clock is merged into the client's clock;
//! - a query answered by a replica that is behind the client on some index
//!   is answered from the response cache instead, when the cache has an
//!   earlier answer for the same request;
//! - timeouts are retried on the same replica, up to `max_attempts` in a
//!   row, then the frontend moves to another replica (floating mode) or
//!   gives up (pinned mode);
//! - a connection failure moves to another replica at once (floating mode)
//!   or redials the pinned one, whose address is resolved again;
//! - after switching replicas a camera re-registers before its next report.

use std::sync::Arc;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use cluster::{Naming, ReplicaRecord};
use server::{ReportEntry, Request, Response};
use storage::{Camera, ObjectKind, Sighting, VectorClock};

use crate::cache::ResponseCache;
use crate::channel::{Connector, Fault, ReplicaChannel};
use crate::config::{FrontendConfig, Mode};
use crate::error::ClientError;

#[derive(Debug, Clone)]
struct Session {
    camera: Camera,
    session_id: u64,
}

struct FrontendState<Ch> {
    channel: Option<Ch>,
    target: Option<ReplicaRecord>,
    clock: VectorClock,
    cache: ResponseCache<Response>,
    session: Option<Session>,
    write_seq: u64,
}

pub struct ClientFrontend<C: Connector> {
    config: FrontendConfig,
    naming: Arc<dyn Naming>,
    connector: C,
    state: Mutex<FrontendState<C::Channel>>,
}

fn fingerprint(op: &str, kind: ObjectKind, id: &str) -> String {
    format!("{}_{}_{}", op, kind, id)
}

fn unexpected(response: Response) -> ClientError {
    ClientError::Protocol(format!("unexpected response {:?}", response))
}

impl<C: Connector> ClientFrontend<C> {
    pub fn new(config: FrontendConfig, naming: Arc<dyn Naming>, connector: C) -> Self {
        let state = FrontendState {
            channel: None,
            target: None,
            clock: VectorClock::new(config.replicas),
            cache: ResponseCache::new(config.cache_capacity),
            session: None,
            write_seq: 0,
        };
        ClientFrontend {
            config,
            naming,
            connector,
            state: Mutex::new(state),
        }
    }

    /// The client's observed vector clock.
    pub async fn clock(&self) -> VectorClock {
        self.state.lock().await.clock.clone()
    }

    /// Replica currently targeted, if connected.
    pub async fn target(&self) -> Option<usize> {
        self.state.lock().await.target.as_ref().map(|t| t.id)
    }

    pub async fn ping(&self, message: &str) -> Result<String, ClientError> {
        let request = Request::Ping {
            message: message.to_string(),
        };
        match self.invoke(request, None).await? {
            Response::Pong { message } => Ok(message),
            other => Err(unexpected(other)),
        }
    }

    pub async fn reset(&self) -> Result<(), ClientError> {
        match self.invoke(Request::Reset, None).await? {
            Response::Ack { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn seed(&self, camera: Camera, kind: ObjectKind, id: &str, timestamp: u64) -> Result<(), ClientError> {
        let request = Request::Seed {
            camera,
            kind,
            id: id.to_string(),
            timestamp,
        };
        match self.invoke(request, None).await? {
            Response::Ack { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Register `camera` and remember it for re-registration after failover.
    pub async fn register_camera(&self, camera: Camera) -> Result<u64, ClientError> {
        let request = Request::RegisterCamera {
            camera: camera.clone(),
            clock: VectorClock::default(),
        };
        match self.invoke(request, None).await? {
            Response::Registered { session_id, .. } => {
                self.state.lock().await.session = Some(Session { camera, session_id });
                Ok(session_id)
            }
            other => Err(unexpected(other)),
        }
    }

    pub async fn camera_info(&self, name: &str) -> Result<Camera, ClientError> {
        let request = Request::CameraInfo {
            name: name.to_string(),
            clock: VectorClock::default(),
        };
        match self.invoke(request, Some(format!("camInfo_{}", name))).await? {
            Response::CameraInfo { camera, .. } => Ok(camera),
            other => Err(unexpected(other)),
        }
    }

    /// Report sightings from the registered camera `camera_name`.
    pub async fn report(&self, camera_name: &str, entries: Vec<ReportEntry>) -> Result<(), ClientError> {
        let request = Request::Report {
            camera_name: camera_name.to_string(),
            entries,
            clock: VectorClock::default(),
            session_id: 0,
            client_seq: 0,
        };
        match self.invoke(request, None).await? {
            Response::Ack { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Most recent sighting of one object.
    pub async fn track(&self, kind: ObjectKind, id: &str) -> Result<Option<Sighting>, ClientError> {
        let request = Request::TrackExact {
            kind,
            id: id.to_string(),
            clock: VectorClock::default(),
        };
        match self.invoke(request, Some(fingerprint("track", kind, id))).await? {
            Response::Track { sighting, .. } => Ok(sighting),
            other => Err(unexpected(other)),
        }
    }

    /// Every sighting of one object, most recent first.
    pub async fn trace(&self, kind: ObjectKind, id: &str) -> Result<Vec<Sighting>, ClientError> {
        let request = Request::TraceAll {
            kind,
            id: id.to_string(),
            clock: VectorClock::default(),
        };
        match self.invoke(request, Some(fingerprint("trace", kind, id))).await? {
            Response::Trace { sightings, .. } => Ok(sightings),
            other => Err(unexpected(other)),
        }
    }

    /// Most recent sighting of each object whose id matches `pattern`.
    pub async fn track_match(&self, kind: ObjectKind, pattern: &str) -> Result<Vec<Sighting>, ClientError> {
        let request = Request::TrackPattern {
            kind,
            pattern: pattern.to_string(),
            clock: VectorClock::default(),
        };
        match self.invoke(request, Some(fingerprint("trackMatch", kind, pattern))).await? {
            Response::Trace { sightings, .. } => Ok(sightings),
            other => Err(unexpected(other)),
        }
    }

    /// Run `request` through the retry state machine.
    async fn invoke(&self, mut request: Request, fingerprint: Option<String>) -> Result<Response, ClientError> {
        let mut state = self.state.lock().await;

        if let Request::Report { camera_name, client_seq, .. } = &mut request {
            let registered = state.session.as_ref().is_some_and(|s| s.camera.name == *camera_name);
            if !registered {
                return Err(ClientError::Validation {
                    status: server::Status::InvalidArgument,
                    message: format!("Camera {} has not joined", camera_name),
                });
            }
            // one sequence number per logical write, reused by every retry
            state.write_seq += 1;
            *client_seq = state.write_seq;
        }
        let rejoin_on_switch = matches!(request, Request::Report { .. });

        let mut needs_join = false;
        // consecutive failed attempts against the current target
        let mut attempts = 0;
        let mut failovers = 0;
        loop {
            let fault = match self.attempt(&mut state, &mut request, &mut needs_join).await {
                Ok(response) => return Ok(self.accept(&mut state, fingerprint, response)),
                Err(Fault::Rejected(err)) => {
                    return Err(ClientError::Validation {
                        status: err.status,
                        message: err.message,
                    });
                }
                Err(fault) => fault,
            };

            let switched = match (self.config.mode, fault) {
                (Mode::Floating, Fault::Timeout) => {
                    attempts += 1;
                    if attempts < self.config.max_attempts {
                        debug!("Timeout (attempt {}), retrying", attempts);
                        false
                    } else {
                        true
                    }
                }
                (Mode::Floating, Fault::Unavailable(msg)) => {
                    info!("Replica unavailable: {}", msg);
                    true
                }
                (Mode::Pinned(id), Fault::Timeout) => {
                    attempts += 1;
                    if attempts >= self.config.max_attempts {
                        return Err(ClientError::Unavailable(format!(
                            "replica {} did not answer after {} attempts",
                            id, self.config.max_attempts
                        )));
                    }
                    false
                }
                (Mode::Pinned(id), Fault::Unavailable(msg)) => {
                    attempts += 1;
                    if attempts >= self.config.max_attempts {
                        return Err(ClientError::Unavailable(format!("replica {}: {}", id, msg)));
                    }
                    info!("Reconnecting to replica {}: {}", id, msg);
                    // address may have changed in the registry
                    state.channel = None;
                    state.target = None;
                    needs_join = rejoin_on_switch;
                    false
                }
                (_, Fault::Rejected(_)) => false,
            };

            if switched {
                failovers += 1;
                if failovers > self.config.max_failovers {
                    return Err(ClientError::Unavailable("no replica answered".to_string()));
                }
                self.fail_over(&mut state)?;
                attempts = 0;
                needs_join = rejoin_on_switch;
            }
        }
    }

    /// One attempt: connect if needed, re-register if needed, then call.
    async fn attempt(
        &self,
        state: &mut FrontendState<C::Channel>,
        request: &mut Request,
        needs_join: &mut bool,
    ) -> Result<Response, Fault> {
        self.ensure_channel(state).await?;

        if *needs_join {
            if let Some(session) = state.session.clone() {
                let join = Request::RegisterCamera {
                    camera: session.camera.clone(),
                    clock: state.clock.clone(),
                };
                match self.call(state, &join).await? {
                    Response::Registered { session_id, clock } => {
                        info!("Re-registered camera {} with session {:#x}", session.camera.name, session_id);
                        state.clock.merge(&clock);
                        state.session = Some(Session {
                            camera: session.camera,
                            session_id,
                        });
                    }
                    other => return Err(Fault::Unavailable(format!("unexpected join response {:?}", other))),
                }
            }
            *needs_join = false;
        }

        refresh(request, state);
        self.call(state, request).await
    }

    async fn call(&self, state: &mut FrontendState<C::Channel>, request: &Request) -> Result<Response, Fault> {
        let Some(channel) = state.channel.as_mut() else {
            return Err(Fault::Unavailable("not connected".to_string()));
        };
        match tokio::time::timeout(self.config.deadline, channel.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(Fault::Timeout),
        }
    }

    async fn ensure_channel(&self, state: &mut FrontendState<C::Channel>) -> Result<(), Fault> {
        if state.channel.is_some() {
            return Ok(());
        }

        let target = match (&state.target, self.config.mode) {
            (Some(target), Mode::Floating) => target.clone(),
            (_, Mode::Pinned(id)) => {
                let address = self
                    .naming
                    .resolve(id)
                    .ok_or_else(|| Fault::Unavailable(format!("replica {} is not registered", id)))?;
                ReplicaRecord::new(id, address)
            }
            (None, Mode::Floating) => self
                .pick_replica(None)
                .ok_or_else(|| Fault::Unavailable("no replicas registered".to_string()))?,
        };

        debug!("Connecting to {}", target);
        let channel = match tokio::time::timeout(self.config.deadline, self.connector.connect(&target.address)).await {
            Ok(result) => result?,
            Err(_) => return Err(Fault::Timeout),
        };
        state.channel = Some(channel);
        state.target = Some(target);
        Ok(())
    }

    fn pick_replica(&self, exclude: Option<usize>) -> Option<ReplicaRecord> {
        let replicas = self.naming.list_replicas();
        let others: Vec<&ReplicaRecord> = replicas.iter().filter(|r| Some(r.id) != exclude).collect();
        let mut rng = rand::thread_rng();
        match others.choose(&mut rng) {
            Some(record) => Some((*record).clone()),
            // only the excluded replica is left
            None => replicas.choose(&mut rng).cloned(),
        }
    }

    fn fail_over(&self, state: &mut FrontendState<C::Channel>) -> Result<(), ClientError> {
        let previous = state.target.as_ref().map(|t| t.id);
        let next = self
            .pick_replica(previous)
            .ok_or_else(|| ClientError::Naming("no replicas registered".to_string()))?;

        match previous {
            Some(prev) => warn!("Failing over from replica {} to {}", prev, next),
            None => info!("Switching to {}", next),
        }
        state.channel = None;
        state.target = Some(next);
        Ok(())
    }

    /// Merge the response clock and mask stale answers with the cache.
    fn accept(&self, state: &mut FrontendState<C::Channel>, fingerprint: Option<String>, response: Response) -> Response {
        let caught_up = match response.clock() {
            Some(clock) => state.clock.merge(clock),
            None => true,
        };

        let Some(fingerprint) = fingerprint else {
            return response;
        };
        if !caught_up {
            if let Some(cached) = state.cache.get(&fingerprint) {
                debug!("Replica is behind; answering {} from cache", fingerprint);
                return cached.clone();
            }
        }
        state.cache.put(fingerprint, response.clone());
        response
    }
}

/// Stamp the client's current clock and session on an outgoing request.
fn refresh<Ch>(request: &mut Request, state: &FrontendState<Ch>) {
    match request {
        Request::Report { clock, session_id, .. } => {
            *clock = state.clock.clone();
            *session_id = state.session.as_ref().map_or(0, |s| s.session_id);
        }
        Request::RegisterCamera { clock, .. }
        | Request::CameraInfo { clock, .. }
        | Request::TrackExact { clock, .. }
        | Request::TraceAll { clock, .. }
        | Request::TrackPattern { clock, .. } => *clock = state.clock.clone(),
        Request::Ping { .. } | Request::Reset | Request::Seed { .. } | Request::GossipPull { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::future::Future;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};
    use cluster::{ReplicationEngine, StaticNaming};
    use server::{RequestHandler, Status, OP_PING, OP_REGISTER_CAMERA, OP_REPORT};
    use storage::{ObjectKey, ReplicaStore};

    #[derive(Debug, Clone, Copy)]
    enum Scripted {
        Timeout,
        Unavailable,
        /// The replica applies the request but the answer never arrives
        LoseResponse,
        Hang,
    }

    /// In-process replicas reachable by address, with scripted faults
    /// consumed one per call regardless of the target.
    #[derive(Clone, Default)]
    struct FakeNet {
        replicas: Arc<StdMutex<HashMap<String, RequestHandler>>>,
        script: Arc<StdMutex<VecDeque<Scripted>>>,
        calls: Arc<StdMutex<Vec<(String, u16)>>>,
    }

    impl FakeNet {
        fn add(&self, address: &str, handler: RequestHandler) {
            self.replicas.lock().unwrap().insert(address.to_string(), handler);
        }

        fn script(&self, steps: &[Scripted]) {
            self.script.lock().unwrap().extend(steps.iter().copied());
        }

        fn calls(&self) -> Vec<(String, u16)> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeChannel {
        address: String,
        net: FakeNet,
    }

    impl ReplicaChannel for FakeChannel {
        fn call(&mut self, request: &Request) -> impl Future<Output = Result<Response, Fault>> + Send {
            let request = request.clone();
            let address = self.address.clone();
            let net = self.net.clone();
            async move {
                net.calls.lock().unwrap().push((address.clone(), request.opcode()));
                let step = net.script.lock().unwrap().pop_front();
                let handler = net.replicas.lock().unwrap().get(&address).cloned();
                let Some(handler) = handler else {
                    return Err(Fault::Unavailable(address));
                };
                match step {
                    Some(Scripted::Timeout) => Err(Fault::Timeout),
                    Some(Scripted::Unavailable) => Err(Fault::Unavailable(address)),
                    Some(Scripted::LoseResponse) => {
                        let _ = handler.handle(request).await;
                        Err(Fault::Timeout)
                    }
                    Some(Scripted::Hang) => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Err(Fault::Timeout)
                    }
                    None => handler.handle(request).await.map_err(Fault::Rejected),
                }
            }
        }
    }

    impl Connector for FakeNet {
        type Channel = FakeChannel;

        fn connect(&self, address: &str) -> impl Future<Output = Result<FakeChannel, Fault>> + Send {
            let known = self.replicas.lock().unwrap().contains_key(address);
            let channel = FakeChannel {
                address: address.to_string(),
                net: self.clone(),
            };
            async move {
                if known {
                    Ok(channel)
                } else {
                    Err(Fault::Unavailable(channel.address))
                }
            }
        }
    }

    fn address(id: usize) -> String {
        format!("r{}", id)
    }

    fn setup(replicas: usize) -> (FakeNet, Arc<StaticNaming>, Vec<RequestHandler>) {
        let net = FakeNet::default();
        let naming = Arc::new(StaticNaming::new());
        let mut handlers = Vec::new();
        for id in 0..replicas {
            let engine = ReplicationEngine::new(id, replicas, ReplicaStore::new()).unwrap();
            let handler = RequestHandler::new(Arc::new(engine));
            net.add(&address(id), handler.clone());
            naming.publish(id, &address(id)).unwrap();
            handlers.push(handler);
        }
        (net, naming, handlers)
    }

    fn frontend(net: &FakeNet, naming: &Arc<StaticNaming>, replicas: usize, mode: Mode) -> ClientFrontend<FakeNet> {
        let mut config = FrontendConfig::new(replicas, mode);
        config.deadline = Duration::from_millis(100);
        ClientFrontend::new(config, naming.clone(), net.clone())
    }

    fn entry(kind: ObjectKind, id: &str) -> ReportEntry {
        ReportEntry {
            kind,
            id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_floating_fails_over_after_three_timeouts() {
        let (net, naming, _handlers) = setup(2);
        let frontend = frontend(&net, &naming, 2, Mode::Floating);

        frontend.ping("first").await.unwrap();
        let first = frontend.target().await.unwrap();

        net.script(&[Scripted::Timeout, Scripted::Timeout, Scripted::Timeout]);
        assert_eq!(frontend.ping("again").await.unwrap(), "Hello again!");

        let second = frontend.target().await.unwrap();
        assert_ne!(first, second);

        let calls = net.calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[1..4].iter().all(|(a, _)| *a == address(first)));
        assert_eq!(calls[4], (address(second), OP_PING));
    }

    #[tokio::test]
    async fn test_floating_fails_over_on_unavailable() {
        let (net, naming, _handlers) = setup(3);
        let frontend = frontend(&net, &naming, 3, Mode::Floating);

        frontend.ping("x").await.unwrap();
        let first = frontend.target().await.unwrap();

        net.script(&[Scripted::Timeout, Scripted::Unavailable]);
        frontend.ping("x").await.unwrap();
        assert_ne!(frontend.target().await.unwrap(), first);
        assert_eq!(net.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_floating_gives_up_when_nothing_answers() {
        let net = FakeNet::default();
        let naming = Arc::new(StaticNaming::with_replicas([(0, "gone0"), (1, "gone1")]));
        let frontend = frontend(&net, &naming, 2, Mode::Floating);

        assert!(matches!(frontend.ping("x").await, Err(ClientError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_pinned_gives_up_after_three_timeouts() {
        let (net, naming, _handlers) = setup(2);
        let frontend = frontend(&net, &naming, 2, Mode::Pinned(1));

        net.script(&[Scripted::Timeout, Scripted::Timeout, Scripted::Timeout]);
        let result = frontend.ping("x").await;
        assert!(matches!(result, Err(ClientError::Unavailable(_))));

        let calls = net.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(a, _)| *a == address(1)));
        assert_eq!(frontend.target().await, Some(1));

        // the next call starts with a fresh budget
        assert!(frontend.ping("x").await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_call_does_not_carry_timeouts_over() {
        let (net, naming, _handlers) = setup(1);
        let frontend = frontend(&net, &naming, 1, Mode::Pinned(0));

        net.script(&[Scripted::Timeout, Scripted::Timeout]);
        let err = frontend.track(ObjectKind::Person, "12x").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation { status: Status::InvalidArgument, .. }));

        // a single timeout on a new call is retried, not fatal
        net.script(&[Scripted::Timeout]);
        assert_eq!(frontend.ping("fresh").await.unwrap(), "Hello fresh!");
        assert_eq!(net.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_pinned_reconnects_to_new_address() {
        let (net, naming, handlers) = setup(2);
        let frontend = frontend(&net, &naming, 2, Mode::Pinned(0));
        frontend.ping("x").await.unwrap();

        // replica 0 restarted on a new address
        net.add("r0-new", handlers[0].clone());
        naming.publish(0, "r0-new").unwrap();
        net.script(&[Scripted::Unavailable]);

        frontend.ping("x").await.unwrap();
        let addresses: Vec<String> = net.calls().into_iter().map(|(a, _)| a).collect();
        assert_eq!(addresses, vec!["r0", "r0", "r0-new"]);
        assert_eq!(frontend.target().await, Some(0));
    }

    #[tokio::test]
    async fn test_deadline_bounds_each_attempt() {
        let (net, naming, _handlers) = setup(1);
        let frontend = frontend(&net, &naming, 1, Mode::Pinned(0));

        net.script(&[Scripted::Hang]);
        let started = Instant::now();
        frontend.ping("x").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(net.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retried() {
        let (net, naming, _handlers) = setup(2);
        let frontend = frontend(&net, &naming, 2, Mode::Floating);

        let err = frontend.track(ObjectKind::Person, "12x").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation { status: Status::InvalidArgument, .. }));
        assert_eq!(net.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_report_requires_join() {
        let (net, naming, _handlers) = setup(1);
        let frontend = frontend(&net, &naming, 1, Mode::Floating);

        let result = frontend.report("Cam1", vec![entry(ObjectKind::Person, "1")]).await;
        assert!(matches!(result, Err(ClientError::Validation { .. })));
        assert!(net.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retransmitted_report_is_applied_once() {
        let (net, naming, handlers) = setup(2);
        let frontend = frontend(&net, &naming, 2, Mode::Pinned(0));
        frontend.register_camera(Camera::new("Cam1", 1.0, 1.0)).await.unwrap();

        net.script(&[Scripted::LoseResponse]);
        frontend.report("Cam1", vec![entry(ObjectKind::Person, "5")]).await.unwrap();

        let opcodes: Vec<u16> = net.calls().into_iter().map(|(_, op)| op).collect();
        assert_eq!(opcodes, vec![OP_REGISTER_CAMERA, OP_REPORT, OP_REPORT]);

        let engine = handlers[0].engine();
        let object = engine
            .store()
            .find_exact(&ObjectKey::new(ObjectKind::Person, "5"))
            .await
            .unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(engine.clock().await.as_slice(), &[2, 0]);
        assert_eq!(frontend.clock().await.as_slice(), &[2, 0]);
    }

    #[tokio::test]
    async fn test_report_reregisters_after_failover() {
        let (net, naming, handlers) = setup(2);
        let frontend = frontend(&net, &naming, 2, Mode::Floating);
        frontend.register_camera(Camera::new("Cam1", 1.0, 1.0)).await.unwrap();
        let first = frontend.target().await.unwrap();

        net.script(&[Scripted::Unavailable]);
        frontend.report("Cam1", vec![entry(ObjectKind::Car, "AB12CD")]).await.unwrap();
        let second = frontend.target().await.unwrap();
        assert_ne!(first, second);

        let calls = net.calls();
        assert_eq!(calls[1], (address(first), OP_REPORT));
        assert_eq!(calls[2], (address(second), OP_REGISTER_CAMERA));
        assert_eq!(calls[3], (address(second), OP_REPORT));

        let key = ObjectKey::new(ObjectKind::Car, "AB12CD");
        assert!(handlers[second].engine().store().has_camera("Cam1").await);
        assert_eq!(handlers[second].engine().store().find_exact(&key).await.unwrap().len(), 1);
        assert!(handlers[first].engine().store().find_exact(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_replica_answer_is_masked_by_cache() {
        let (net, naming, _handlers) = setup(2);
        let frontend = frontend(&net, &naming, 2, Mode::Floating);
        frontend.register_camera(Camera::new("Cam1", 1.0, 1.0)).await.unwrap();
        frontend.report("Cam1", vec![entry(ObjectKind::Person, "9")]).await.unwrap();
        let first = frontend.target().await.unwrap();

        let fresh = frontend.track(ObjectKind::Person, "9").await.unwrap();
        assert!(fresh.is_some());
        let seen = frontend.clock().await;

        // move to the other replica, which has not gossiped yet
        net.script(&[Scripted::Unavailable]);
        let masked = frontend.track(ObjectKind::Person, "9").await.unwrap();
        assert_ne!(frontend.target().await.unwrap(), first);
        assert_eq!(masked, fresh);
        assert_eq!(frontend.clock().await, seen);

        // nothing cached for this query: the replica's answer is returned
        assert_eq!(frontend.trace(ObjectKind::Person, "9").await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn test_camera_info_round_trip() {
        let (net, naming, _handlers) = setup(1);
        let frontend = frontend(&net, &naming, 1, Mode::Floating);
        frontend.register_camera(Camera::new("Cam1", 12.5, -7.25)).await.unwrap();

        let camera = frontend.camera_info("Cam1").await.unwrap();
        assert_eq!((camera.latitude, camera.longitude), (12.5, -7.25));

        let err = frontend.camera_info("Nope").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation { status: Status::NotFound, .. }));
    }
}
