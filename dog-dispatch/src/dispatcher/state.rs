use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    DropReason, Job, JobError, JobId, TenantKey,
    config::{ConcurrencyLimits, DispatcherConfig},
    observability::ObservabilityLayer,
};
use super::admission::{Admission, IdempotencyIndex, PendingIndex};
use super::lanes::{LaneRegistry, PendingJob};

/// A job handed to the executor
#[derive(Debug)]
pub(crate) struct ActiveJob {
    pub job: Job,
    /// 1-based number of the attempt about to run
    pub attempt: u32,
}

/// Counters the idle coordinator watches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Load {
    pub pending: usize,
    pub active: usize,
    /// Jobs waiting out a retry backoff
    pub delayed: usize,
}

impl Load {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.active == 0 && self.delayed == 0
    }
}

/// Per-lane view for [`DispatcherStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStats {
    pub tenant: TenantKey,
    pub pending: usize,
    pub active: usize,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of the dispatcher counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub load: Load,
    pub limits: ConcurrencyLimits,
    pub max_queue_length: usize,
    pub idempotency_keys: usize,
    /// Lanes in rotation order
    pub lanes: Vec<LaneStats>,
}

/// All mutable dispatcher state; every method runs inside the dispatcher's
/// single critical section and never awaits
pub(crate) struct DispatcherState {
    limits: ConcurrencyLimits,
    max_queue_length: usize,
    lanes: LaneRegistry,
    pending_index: PendingIndex,
    idempotency: IdempotencyIndex,
    pending: usize,
    active: usize,
    delayed: usize,
    next_seq: u64,
    closed: bool,
}

impl DispatcherState {
    pub(crate) fn new(config: &DispatcherConfig) -> Self {
        Self {
            limits: config.limits,
            max_queue_length: config.max_queue_length,
            lanes: LaneRegistry::new(),
            pending_index: PendingIndex::default(),
            idempotency: IdempotencyIndex::default(),
            pending: 0,
            active: 0,
            delayed: 0,
            next_seq: 0,
            closed: false,
        }
    }

    pub(crate) fn set_limits(&mut self, limits: ConcurrencyLimits) {
        self.limits = limits;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn load(&self) -> Load {
        Load {
            pending: self.pending,
            active: self.active,
            delayed: self.delayed,
        }
    }

    /// Admission control for a fresh job: dedup, capacity guard, then insert
    pub(crate) fn admit(&mut self, job: Job, obs: &ObservabilityLayer) -> Admission {
        let job_id = job.meta.id.clone();

        if let Some(key) = job.idempotency_key.as_deref() {
            if self.idempotency.contains(key) {
                obs.job_deduplicated(&job);
                return Admission::Deduplicated { job_id };
            }
        }

        let evicted = self.make_room(obs);

        if let Some(key) = job.idempotency_key.as_deref() {
            self.idempotency.reserve(key);
        }
        obs.job_queued(&job, self.pending + 1);
        self.insert_pending(job, 0);

        Admission::Queued { job_id, evicted }
    }

    /// Put a job that waited out its backoff back into its lane
    ///
    /// Keeps its idempotency key and priority; takes a fresh admission
    /// sequence. Goes through the capacity guard like any admission.
    /// The fresh sequence makes it the newest pending job, so eviction reaches
    /// it last.
    pub(crate) fn readmit(&mut self, job: Job, attempt: u32, obs: &ObservabilityLayer) {
        self.delayed = self.delayed.saturating_sub(1);

        if self.closed {
            self.idempotency.release(job.idempotency_key.as_deref());
            obs.job_dropped(&job, DropReason::Shutdown, self.pending);
            return;
        }

        self.make_room(obs);
        obs.job_requeued(&job, attempt, self.pending + 1);
        self.insert_pending(job, attempt);
    }

    /// Pick the next job in fair order, or `None` when caps are saturated or
    /// every eligible lane is empty
    pub(crate) fn select_next(&mut self, obs: &ObservabilityLayer) -> Option<ActiveJob> {
        if self.active >= self.limits.concurrency {
            return None;
        }

        let pending = self.lanes.select(self.limits.per_tenant_limit)?;
        self.pending_index.remove(pending.seq);
        self.pending -= 1;
        self.active += 1;

        let attempt = pending.attempt + 1;
        obs.job_started(&pending.job, attempt, self.pending, self.active);

        Some(ActiveJob {
            job: pending.job,
            attempt,
        })
    }

    /// Select until nothing more can start
    pub(crate) fn drain_ready(&mut self, obs: &ObservabilityLayer) -> Vec<ActiveJob> {
        if self.closed {
            return Vec::new();
        }
        std::iter::from_fn(|| self.select_next(obs)).collect()
    }

    pub(crate) fn complete(&mut self, active: &ActiveJob, obs: &ObservabilityLayer) {
        self.release_slot(&active.job.tenant);
        self.idempotency.release(active.job.idempotency_key.as_deref());
        obs.job_completed(&active.job, active.attempt, self.active);
    }

    /// Free the running slot and park the job until its backoff elapses
    pub(crate) fn schedule_retry(
        &mut self,
        active: &ActiveJob,
        delay: std::time::Duration,
        err: &JobError,
        obs: &ObservabilityLayer,
    ) {
        self.release_slot(&active.job.tenant);
        self.delayed += 1;
        obs.retry_scheduled(&active.job, active.attempt, delay, err, self.active);
    }

    pub(crate) fn fail(&mut self, active: &ActiveJob, err: &JobError, obs: &ObservabilityLayer) {
        self.release_slot(&active.job.tenant);
        self.idempotency.release(active.job.idempotency_key.as_deref());
        obs.job_failed(&active.job, active.attempt, err, self.active);
    }

    /// Stop admitting and drop everything still pending
    pub(crate) fn close(&mut self, obs: &ObservabilityLayer) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;

        let mut drained: Vec<PendingJob> = Vec::with_capacity(self.pending);
        for lane in self.lanes.iter_mut() {
            drained.extend(lane.drain());
        }
        self.pending_index.clear();

        drained.sort_by_key(|pending| pending.seq);
        for pending in &drained {
            self.pending -= 1;
            self.idempotency.release(pending.job.idempotency_key.as_deref());
            obs.job_dropped(&pending.job, DropReason::Shutdown, self.pending);
        }
        drained.len()
    }

    pub(crate) fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            load: self.load(),
            limits: self.limits,
            max_queue_length: self.max_queue_length,
            idempotency_keys: self.idempotency.len(),
            lanes: self
                .lanes
                .iter()
                .map(|(tenant, lane)| LaneStats {
                    tenant: tenant.clone(),
                    pending: lane.len(),
                    active: lane.active,
                    oldest_enqueued_at: lane.oldest_enqueued_at(),
                })
                .collect(),
        }
    }

    /// Capacity guard: evict globally-oldest pending jobs until one more fits
    fn make_room(&mut self, obs: &ObservabilityLayer) -> Option<JobId> {
        let mut evicted = None;

        while self.pending >= self.max_queue_length {
            let Some((tenant, slot)) = self.pending_index.pop_oldest() else {
                break;
            };
            let Some(victim) = self.lanes.get_mut(&tenant).and_then(|lane| lane.remove(&slot)) else {
                continue;
            };

            self.pending -= 1;
            self.idempotency.release(victim.job.idempotency_key.as_deref());
            obs.job_dropped(&victim.job, DropReason::Capacity, self.pending);
            evicted = Some(victim.job.meta.id);
        }

        evicted
    }

    fn insert_pending(&mut self, job: Job, attempt: u32) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let pending = PendingJob {
            job,
            attempt,
            seq,
            enqueued_at: Utc::now(),
        };
        let tenant = pending.job.tenant.clone();
        self.pending_index.insert(seq, tenant.clone(), pending.slot());
        self.lanes.lane_mut(&tenant).push(pending);
        self.pending += 1;
        debug_assert_eq!(self.pending, self.pending_index.len());
        debug_assert_eq!(self.pending, self.lanes.total_pending());
    }

    fn release_slot(&mut self, tenant: &TenantKey) {
        self.active = self.active.saturating_sub(1);
        self.lanes.release(tenant);
    }
}
