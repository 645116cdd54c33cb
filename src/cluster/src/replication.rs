use serde::{Deserialize, Serialize};
use storage::{Camera, ObjectKey, Observation};

use crate::error::EngineError;

/// Observations to append to one tracked object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDelta {
    pub key: ObjectKey,
    pub observations: Vec<Observation>,
}

/// What a single applied write changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdatePayload {
    Camera(Camera),
    /// Observations from one report, grouped per object. Each observation
    /// carries its camera so a peer can apply it without a prior join.
    Observations(Vec<ObjectDelta>),
}

/// Replication entry: one update, tagged with where it was first applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// Replica that originated the update
    pub origin: usize,
    /// 1-based position in the origin's log
    pub seq: u64,
    pub payload: UpdatePayload,
}

/// Per-origin append-only logs of applied updates.
///
/// `log(r)[k]` is the update with sequence number `k + 1` from replica `r`.
/// The log for `r` always holds exactly as many records as the owning
/// replica's clock entry for `r`.
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    logs: Vec<Vec<UpdateRecord>>,
}

impl OperationLog {
    pub fn new(replicas: usize) -> Self {
        OperationLog {
            logs: vec![Vec::new(); replicas],
        }
    }

    /// Number of records held for `origin`.
    pub fn len(&self, origin: usize) -> usize {
        self.logs.get(origin).map_or(0, Vec::len)
    }

    /// Append `record` to its origin's log. Its sequence number must be the
    /// next free position.
    pub fn append(&mut self, record: UpdateRecord) -> Result<(), EngineError> {
        let log = self
            .logs
            .get_mut(record.origin)
            .ok_or(EngineError::UnknownReplica(record.origin))?;
        let expected = log.len() as u64 + 1;
        if record.seq != expected {
            return Err(EngineError::ClockMismatch {
                expected: expected as usize,
                actual: record.seq as usize,
            });
        }
        log.push(record);
        Ok(())
    }

    /// Records from `origin` with `after < seq <= upto`, ascending.
    pub fn range(&self, origin: usize, after: u64, upto: u64) -> &[UpdateRecord] {
        let Some(log) = self.logs.get(origin) else {
            return &[];
        };
        let end = (upto as usize).min(log.len());
        let start = (after as usize).min(end);
        &log[start..end]
    }
}
