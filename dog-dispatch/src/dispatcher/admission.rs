use std::collections::{BTreeMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::{JobId, TenantKey};
use super::lanes::LaneSlot;

/// Outcome of handing a job to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    /// Job entered its tenant lane; `evicted` names the job sacrificed to make room
    Queued { job_id: JobId, evicted: Option<JobId> },

    /// Same idempotency key already queued or running; job was discarded
    Deduplicated { job_id: JobId },
}

impl Admission {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Queued { job_id, .. } | Self::Deduplicated { job_id } => job_id,
        }
    }
}

/// Idempotency keys of every job that is queued, running or waiting to retry
#[derive(Debug, Default)]
pub(crate) struct IdempotencyIndex {
    in_flight: HashSet<String>,
}

impl IdempotencyIndex {
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    /// Reserve a key; returns false if it was already held
    pub(crate) fn reserve(&mut self, key: &str) -> bool {
        self.in_flight.insert(key.to_string())
    }

    pub(crate) fn release(&mut self, key: Option<&str>) {
        if let Some(key) = key {
            self.in_flight.remove(key);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.in_flight.len()
    }
}

/// Global admission-order index over all pending jobs, used to find the
/// eviction victim independently of tenant
#[derive(Debug, Default)]
pub(crate) struct PendingIndex {
    by_seq: BTreeMap<u64, (TenantKey, LaneSlot)>,
}

impl PendingIndex {
    pub(crate) fn insert(&mut self, seq: u64, tenant: TenantKey, slot: LaneSlot) {
        self.by_seq.insert(seq, (tenant, slot));
    }

    pub(crate) fn remove(&mut self, seq: u64) {
        self.by_seq.remove(&seq);
    }

    /// Take the globally-oldest pending entry out of the index
    pub(crate) fn pop_oldest(&mut self) -> Option<(TenantKey, LaneSlot)> {
        self.by_seq.pop_first().map(|(_, entry)| entry)
    }

    pub(crate) fn clear(&mut self) {
        self.by_seq.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_seq.len()
    }
}
