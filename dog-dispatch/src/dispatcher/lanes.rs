use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::{Job, JobPriority, TenantKey};

/// Position of a pending job inside its lane: priority first, then admission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LaneSlot {
    priority: Reverse<JobPriority>,
    seq: u64,
}

impl LaneSlot {
    pub(crate) fn new(priority: JobPriority, seq: u64) -> Self {
        Self {
            priority: Reverse(priority),
            seq,
        }
    }
}

/// A job waiting in a tenant lane
#[derive(Debug)]
pub(crate) struct PendingJob {
    pub job: Job,
    /// Attempts already made (0 for a fresh admission)
    pub attempt: u32,
    /// Global admission sequence, the eviction tie-break
    pub seq: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingJob {
    pub(crate) fn slot(&self) -> LaneSlot {
        LaneSlot::new(self.job.priority, self.seq)
    }
}

/// One tenant's priority-ordered pending jobs and its running count
#[derive(Debug, Default)]
pub(crate) struct TenantLane {
    pending: BTreeMap<LaneSlot, PendingJob>,
    pub(crate) active: usize,
}

impl TenantLane {
    pub(crate) fn push(&mut self, job: PendingJob) {
        self.pending.insert(job.slot(), job);
    }

    /// Remove the highest-priority, earliest-admitted job
    pub(crate) fn pop_head(&mut self) -> Option<PendingJob> {
        self.pending.pop_first().map(|(_, job)| job)
    }

    pub(crate) fn remove(&mut self, slot: &LaneSlot) -> Option<PendingJob> {
        self.pending.remove(slot)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = PendingJob> + '_ {
        std::mem::take(&mut self.pending).into_values()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Admission time of the longest-waiting job in the lane
    pub(crate) fn oldest_enqueued_at(&self) -> Option<DateTime<Utc>> {
        self.pending.values().map(|job| job.enqueued_at).min()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn is_eligible(&self, per_tenant_limit: usize) -> bool {
        !self.is_empty() && self.active < per_tenant_limit
    }
}

/// All tenant lanes plus the round-robin rotation over them
///
/// Lanes are created on first admission and kept for the registry's lifetime;
/// the rotation order is the order tenants were first seen.
#[derive(Debug, Default)]
pub(crate) struct LaneRegistry {
    lanes: HashMap<TenantKey, TenantLane>,
    rotation: Vec<TenantKey>,
    cursor: usize,
}

impl LaneRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Get the lane for a tenant, creating it at the end of the rotation if new
    pub(crate) fn lane_mut(&mut self, tenant: &TenantKey) -> &mut TenantLane {
        if !self.lanes.contains_key(tenant) {
            self.rotation.push(tenant.clone());
        }
        self.lanes.entry(tenant.clone()).or_default()
    }

    pub(crate) fn get_mut(&mut self, tenant: &TenantKey) -> Option<&mut TenantLane> {
        self.lanes.get_mut(tenant)
    }

    /// Pop the next job in fair order, charging it to its lane's active count
    ///
    /// Scans from the cursor, wrapping once, for the first non-empty lane under
    /// `per_tenant_limit`. The cursor then moves past the chosen tenant so the
    /// following pick starts with someone else.
    pub(crate) fn select(&mut self, per_tenant_limit: usize) -> Option<PendingJob> {
        let len = self.rotation.len();
        if len == 0 {
            return None;
        }

        let start = self.cursor % len;
        let index = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| {
                self.lanes
                    .get(&self.rotation[i])
                    .is_some_and(|lane| lane.is_eligible(per_tenant_limit))
            })?;

        let lane = self.lanes.get_mut(&self.rotation[index])?;
        let job = lane.pop_head()?;
        lane.active += 1;
        self.cursor = (index + 1) % len;
        Some(job)
    }

    /// Give back a running slot for `tenant`
    pub(crate) fn release(&mut self, tenant: &TenantKey) {
        if let Some(lane) = self.lanes.get_mut(tenant) {
            lane.active = lane.active.saturating_sub(1);
        }
    }

    /// Lanes in rotation order
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&TenantKey, &TenantLane)> {
        self.rotation
            .iter()
            .filter_map(|tenant| self.lanes.get(tenant).map(|lane| (tenant, lane)))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut TenantLane> {
        self.lanes.values_mut()
    }

    pub(crate) fn total_pending(&self) -> usize {
        self.lanes.values().map(TenantLane::len).sum()
    }
}
