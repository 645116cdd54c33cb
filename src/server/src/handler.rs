use std::sync::Arc;
use log::{debug, info, warn};
use cluster::{group_observations, ReplicationEngine};
use storage::{current_timestamp_ms, Camera, ObjectKey, ObjectKind, Observation, Sighting, StoreError, TrackedObject};

use crate::error::RpcError;
use crate::message::{ReportEntry, Request, Response};

/// Serves the replica RPC surface on top of a replication engine.
#[derive(Clone)]
pub struct RequestHandler {
    engine: Arc<ReplicationEngine>,
}

fn check_identifier(kind: ObjectKind, id: &str) -> Result<ObjectKey, RpcError> {
    kind.validate_id(id)?;
    Ok(ObjectKey::new(kind, id))
}

fn latest_sighting(object: &TrackedObject) -> Option<Sighting> {
    object.latest().map(|observation| Sighting {
        key: object.key.clone(),
        observation: observation.clone(),
    })
}

impl RequestHandler {
    pub fn new(engine: Arc<ReplicationEngine>) -> Self {
        RequestHandler { engine }
    }

    pub fn engine(&self) -> &Arc<ReplicationEngine> {
        &self.engine
    }

    pub async fn handle(&self, request: Request) -> Result<Response, RpcError> {
        let result = match request {
            Request::Ping { message } => self.ping(message),
            Request::Reset => self.reset().await,
            Request::Seed { camera, kind, id, timestamp } => self.seed(camera, kind, id, timestamp).await,
            Request::RegisterCamera { camera, clock } => {
                debug!("Join from client at {}", clock);
                self.register_camera(camera).await
            }
            Request::CameraInfo { name, .. } => self.camera_info(name).await,
            Request::Report { camera_name, entries, session_id, client_seq, .. } => {
                self.report(camera_name, entries, session_id, client_seq).await
            }
            Request::TrackExact { kind, id, .. } => self.track(kind, id).await,
            Request::TraceAll { kind, id, .. } => self.trace(kind, id).await,
            Request::TrackPattern { kind, pattern, .. } => self.track_match(kind, pattern).await,
            Request::GossipPull { clock } => {
                let updates = self.engine.pull_missing(&clock).await?;
                debug!("Sending {} updates to peer at {}", updates.len(), clock);
                Ok(Response::Updates { updates })
            }
        };

        if let Err(e) = &result {
            warn!("ERR {}", e);
        }
        result
    }

    fn ping(&self, message: String) -> Result<Response, RpcError> {
        if message.trim().is_empty() {
            return Err(RpcError::invalid("Message cannot be empty!"));
        }
        Ok(Response::Pong {
            message: format!("Hello {}!", message),
        })
    }

    async fn reset(&self) -> Result<Response, RpcError> {
        self.engine.reset().await;
        info!("OK RESET");
        Ok(Response::Ack {
            clock: self.engine.clock().await,
        })
    }

    async fn seed(&self, camera: Camera, kind: ObjectKind, id: String, timestamp: u64) -> Result<Response, RpcError> {
        let key = check_identifier(kind, &id)?;
        info!("OK SEED {} at {}", key, camera);
        self.engine.seed(camera, key, timestamp).await;
        Ok(Response::Ack {
            clock: self.engine.clock().await,
        })
    }

    async fn register_camera(&self, camera: Camera) -> Result<Response, RpcError> {
        let description = camera.to_string();
        let joined = self.engine.register_camera(camera).await?;
        info!("OK JOIN {} session {:#x}", description, joined.session_id);
        Ok(Response::Registered {
            session_id: joined.session_id,
            clock: joined.clock,
        })
    }

    async fn camera_info(&self, name: String) -> Result<Response, RpcError> {
        if name.trim().is_empty() {
            return Err(RpcError::invalid("Camera name cannot be empty!"));
        }
        let view = self.engine.read_view().await;
        let camera = view.store().get_camera(&name).await?;
        Ok(Response::CameraInfo {
            camera: (*camera).clone(),
            clock: view.clock(),
        })
    }

    async fn report(
        &self,
        camera_name: String,
        entries: Vec<ReportEntry>,
        session_id: u64,
        client_seq: u64,
    ) -> Result<Response, RpcError> {
        if camera_name.trim().is_empty() {
            return Err(RpcError::invalid("Name cannot be empty!"));
        }
        let camera = match self.engine.store().get_camera(&camera_name).await {
            Ok(camera) => camera,
            Err(StoreError::NotFound(_)) => {
                return Err(RpcError::invalid(format!("Camera {} does not exist", camera_name)));
            }
            Err(e) => return Err(e.into()),
        };
        if entries.is_empty() {
            debug!("Empty report from {}", camera_name);
            return Ok(Response::Ack {
                clock: self.engine.clock().await,
            });
        }

        let timestamp = current_timestamp_ms();
        let mut stamped = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = check_identifier(entry.kind, &entry.id)?;
            stamped.push((key, Observation::new(timestamp, camera.clone())));
        }
        let count = stamped.len();

        let outcome = self
            .engine
            .apply_local(session_id, client_seq, group_observations(stamped))
            .await?;
        info!("OK REPORT {} observations from {} (seq {})", count, camera_name, client_seq);

        Ok(Response::Ack {
            clock: outcome.into_clock(),
        })
    }

    async fn track(&self, kind: ObjectKind, id: String) -> Result<Response, RpcError> {
        let key = check_identifier(kind, &id)?;
        let view = self.engine.read_view().await;
        let sighting = view
            .store()
            .find_exact(&key)
            .await
            .and_then(|object| latest_sighting(&object));
        Ok(Response::Track {
            sighting,
            clock: view.clock(),
        })
    }

    async fn trace(&self, kind: ObjectKind, id: String) -> Result<Response, RpcError> {
        let key = check_identifier(kind, &id)?;
        let view = self.engine.read_view().await;
        let sightings = match view.store().find_exact(&key).await {
            Some(object) => object
                .history()
                .into_iter()
                .map(|observation| Sighting {
                    key: key.clone(),
                    observation,
                })
                .collect(),
            None => Vec::new(),
        };
        Ok(Response::Trace {
            sightings,
            clock: view.clock(),
        })
    }

    async fn track_match(&self, kind: ObjectKind, pattern: String) -> Result<Response, RpcError> {
        if pattern.trim().is_empty() {
            return Err(RpcError::invalid("Identifier cannot be null or empty"));
        }
        let view = self.engine.read_view().await;
        let sightings = view
            .store()
            .find_matching(kind, &pattern)
            .await
            .iter()
            .filter_map(latest_sighting)
            .collect();
        Ok(Response::Trace {
            sightings,
            clock: view.clock(),
        })
    }
}
