use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const CAMERA_NAME_MIN_LEN: usize = 3;
pub const CAMERA_NAME_MAX_LEN: usize = 15;

/// Letter/digit shapes accepted for car plates ('A' = letter, '0' = digit).
const CAR_ID_SHAPES: [&str; 6] = ["AA00AA", "AAAA00", "00AAAA", "00AA00", "AA0000", "0000AA"];

/// A registered camera. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Camera {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Camera {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    /// Validate name length and coordinate ranges.
    pub fn validate(&self) -> Result<(), StoreError> {
        let len = self.name.chars().count();
        if self.name.trim().is_empty() || !(CAMERA_NAME_MIN_LEN..=CAMERA_NAME_MAX_LEN).contains(&len) {
            return Err(StoreError::invalid(format!(
                "{} is not a valid name format for a camera.",
                self.name
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(StoreError::invalid("Invalid latitude format."));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(StoreError::invalid("Invalid longitude format."));
        }
        Ok(())
    }

    pub fn same_coordinates(&self, other: &Camera) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.name, self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Person,
    Car,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Person => "PERSON",
            ObjectKind::Car => "CAR",
        }
    }

    /// Check that `id` is a well-formed identifier for this kind.
    pub fn validate_id(&self, id: &str) -> Result<(), StoreError> {
        if id.trim().is_empty() {
            return Err(StoreError::invalid("Identifier cannot be null or empty"));
        }
        match self {
            ObjectKind::Person => id
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| StoreError::invalid(format!("Id {} is not a valid id format for a person.", id))),
            ObjectKind::Car => {
                if car_id_shape(id).is_some_and(|shape| CAR_ID_SHAPES.contains(&shape.as_str())) {
                    Ok(())
                } else {
                    Err(StoreError::invalid(format!("Id {} is not a valid id format for a car.", id)))
                }
            }
        }
    }
}

fn car_id_shape(id: &str) -> Option<String> {
    if id.len() != 6 {
        return None;
    }
    id.chars()
        .map(|c| match c {
            'A'..='Z' => Some('A'),
            '0'..='9' => Some('0'),
            _ => None,
        })
        .collect()
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "person" => Ok(ObjectKind::Person),
            "car" => Ok(ObjectKind::Car),
            _ => Err(StoreError::invalid(format!("Type {} is not a valid type.", s))),
        }
    }
}

/// Identity of a tracked object: two objects are the same iff kind and id match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub id: String,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, id: impl Into<String>) -> Self {
        ObjectKey { kind, id: id.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// A single sighting. The camera is shared with the store's camera table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unix milliseconds
    pub timestamp: u64,
    pub camera: Arc<Camera>,
}

impl Observation {
    pub fn new(timestamp: u64, camera: Arc<Camera>) -> Self {
        Observation { timestamp, camera }
    }
}

/// Sort most recent first.
pub fn sort_most_recent_first(observations: &mut [Observation]) {
    observations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// An observation together with what was observed, as returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub key: ObjectKey,
    pub observation: Observation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedObject {
    pub key: ObjectKey,
    observations: Vec<Observation>,
}

impl TrackedObject {
    pub fn new(key: ObjectKey) -> Self {
        TrackedObject {
            key,
            observations: Vec::new(),
        }
    }

    /// Pure append: duplicates by value are retained.
    pub fn add_observations<I: IntoIterator<Item = Observation>>(&mut self, observations: I) {
        self.observations.extend(observations);
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.observations.iter().max_by_key(|o| o.timestamp)
    }

    /// Full history, most recent first.
    pub fn history(&self) -> Vec<Observation> {
        let mut history = self.observations.clone();
        sort_most_recent_first(&mut history);
        history
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl PartialEq for TrackedObject {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TrackedObject {}

/// Get current timestamp in milliseconds
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
