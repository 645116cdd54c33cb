//! Vector clocks for causal bookkeeping between replicas and clients.
//!
//! Index `i` holds the number of updates originated at replica `i` that the
//! holder has applied. Like a G-Counter, entries only grow and merging takes
//! the per-index maximum.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock {
    counts: Vec<u64>,
}

impl VectorClock {
    /// A zeroed clock for `replicas` replicas.
    pub fn new(replicas: usize) -> Self {
        VectorClock {
            counts: vec![0; replicas],
        }
    }

    pub fn from_counts(counts: Vec<u64>) -> Self {
        VectorClock { counts }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count for replica `idx`; 0 when out of range.
    pub fn get(&self, idx: usize) -> u64 {
        self.counts.get(idx).copied().unwrap_or(0)
    }

    /// Raise entry `idx` to `value`. Never lowers it.
    pub fn advance(&mut self, idx: usize, value: u64) {
        if let Some(current) = self.counts.get_mut(idx) {
            *current = (*current).max(value);
        }
    }

    /// Bump the entry for `replica` and return the new value.
    pub fn increment(&mut self, replica: usize) -> u64 {
        match self.counts.get_mut(replica) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => 0,
        }
    }

    /// Merge `other` into this clock (per-index max).
    ///
    /// Returns true iff `other` is at least as new as `self` at every index,
    /// i.e. a response carrying `other` can be trusted as the newest answer.
    /// Entries missing from `other` count as 0.
    pub fn merge(&mut self, other: &VectorClock) -> bool {
        let mut caught_up = true;
        for (idx, current) in self.counts.iter_mut().enumerate() {
            let incoming = other.get(idx);
            if incoming >= *current {
                *current = incoming;
            } else {
                caught_up = false;
            }
        }
        caught_up
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.counts
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.counts)
    }
}
