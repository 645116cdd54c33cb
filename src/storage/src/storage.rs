use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use log::{debug, info};

use crate::error::StoreError;
use crate::types::{Camera, ObjectKey, ObjectKind, Observation, TrackedObject};

/// Outcome of a camera registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// Same name and same coordinates: idempotent re-join.
    AlreadyExists,
    /// Same name, different coordinates. The stored camera is left untouched.
    Conflict,
}

/// In-memory store of cameras and tracked objects held by one replica.
///
/// The camera table and the object index each sit behind an
/// `Arc<RwLock<...>>`. Every tracked object additionally owns its own lock, so
/// concurrent reports for different objects never contend, and two reports
/// for the same object are serialized and both retained.
///
/// Readers clone an object under its read lock, so they observe either the
/// list before or after an append, never a partially extended one.
#[derive(Clone, Default)]
pub struct ReplicaStore {
    cameras: Arc<RwLock<HashMap<String, Arc<Camera>>>>,
    objects: Arc<RwLock<HashMap<ObjectKey, Arc<RwLock<TrackedObject>>>>>,
}

impl ReplicaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        info!("Initializing in-memory replica store");
        ReplicaStore::default()
    }

    /// Register a camera.
    ///
    /// Does not validate the camera; callers validate first.
    pub async fn register_camera(&self, camera: Camera) -> Registration {
        let mut cameras = self.cameras.write().await;
        match cameras.get(&camera.name) {
            Some(existing) if existing.same_coordinates(&camera) => Registration::AlreadyExists,
            Some(_) => Registration::Conflict,
            None => {
                debug!("Registered camera {}", camera);
                cameras.insert(camera.name.clone(), Arc::new(camera));
                Registration::Created
            }
        }
    }

    /// Insert or overwrite a camera without any conflict check.
    pub async fn insert_camera_unchecked(&self, camera: Camera) -> Arc<Camera> {
        let camera = Arc::new(camera);
        let mut cameras = self.cameras.write().await;
        cameras.insert(camera.name.clone(), camera.clone());
        camera
    }

    /// Return the stored camera with this name, inserting `camera` if absent.
    pub async fn ensure_camera(&self, camera: &Camera) -> Arc<Camera> {
        if let Some(existing) = self.cameras.read().await.get(&camera.name) {
            return existing.clone();
        }
        let mut cameras = self.cameras.write().await;
        cameras
            .entry(camera.name.clone())
            .or_insert_with(|| Arc::new(camera.clone()))
            .clone()
    }

    /// Look up a camera by name.
    pub async fn get_camera(&self, name: &str) -> Result<Arc<Camera>, StoreError> {
        self.cameras
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("Camera not found with name {}.", name)))
    }

    pub async fn has_camera(&self, name: &str) -> bool {
        self.cameras.read().await.contains_key(name)
    }

    /// Append observations to the object at `key`, creating it if absent.
    ///
    /// This is a pure append. Replayed updates are filtered before they get
    /// here, by the replication engine.
    pub async fn apply_observations(&self, key: ObjectKey, observations: Vec<Observation>) {
        let entry = self.object_entry(key).await;
        let mut object = entry.write().await;
        object.add_observations(observations);
    }

    async fn object_entry(&self, key: ObjectKey) -> Arc<RwLock<TrackedObject>> {
        if let Some(entry) = self.objects.read().await.get(&key) {
            return entry.clone();
        }
        let mut objects = self.objects.write().await;
        objects
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(TrackedObject::new(key))))
            .clone()
    }

    /// Snapshot of the object with exactly this kind and id.
    pub async fn find_exact(&self, key: &ObjectKey) -> Option<TrackedObject> {
        let entry = self.objects.read().await.get(key).cloned()?;
        let object = entry.read().await;
        Some(object.clone())
    }

    /// Snapshots of every object of `kind` whose id matches `pattern`.
    ///
    /// `*` matches zero or more characters. Results are ordered by id.
    pub async fn find_matching(&self, kind: ObjectKind, pattern: &str) -> Vec<TrackedObject> {
        let regex_pattern = pattern.replace('*', ".*");

        let re = match regex::Regex::new(&format!("^{}$", regex_pattern)) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };

        let entries: Vec<Arc<RwLock<TrackedObject>>> = {
            let objects = self.objects.read().await;
            objects
                .iter()
                .filter(|(key, _)| key.kind == kind && re.is_match(&key.id))
                .map(|(_, entry)| entry.clone())
                .collect()
        };

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            results.push(entry.read().await.clone());
        }
        results.sort_by(|a, b| a.key.id.cmp(&b.key.id));
        results
    }

    /// Drop all cameras and objects.
    pub async fn clear(&self) {
        let mut objects = self.objects.write().await;
        let mut cameras = self.cameras.write().await;
        objects.clear();
        cameras.clear();
        info!("Replica store cleared");
    }

    pub async fn cameras_count(&self) -> usize {
        self.cameras.read().await.len()
    }

    pub async fn objects_count(&self) -> usize {
        self.objects.read().await.len()
    }
}
