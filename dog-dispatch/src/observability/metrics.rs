use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::DropReason;
use super::MetricsSink;

/// In-process metrics sink backed by atomic counters
pub struct LiveMetrics {
    jobs_queued: AtomicU64,
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    retries_scheduled: AtomicU64,
    jobs_deduplicated: AtomicU64,
    jobs_dropped: AtomicU64,

    queue_depth: AtomicUsize,
    active_jobs: AtomicUsize,

    // Per-job-type metrics
    job_type_metrics: RwLock<HashMap<String, JobTypeMetrics>>,

    // Drops by reason
    drop_reasons: RwLock<HashMap<DropReason, u64>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self {
            jobs_queued: AtomicU64::new(0),
            jobs_processed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            retries_scheduled: AtomicU64::new(0),
            jobs_deduplicated: AtomicU64::new(0),
            jobs_dropped: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
            active_jobs: AtomicUsize::new(0),
            job_type_metrics: RwLock::new(HashMap::new()),
            drop_reasons: RwLock::new(HashMap::new()),
        }
    }

    // Getters for global metrics
    pub fn jobs_queued(&self) -> u64 {
        self.jobs_queued.load(Ordering::Relaxed)
    }

    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_retried(&self) -> u64 {
        self.jobs_retried.load(Ordering::Relaxed)
    }

    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::Relaxed)
    }

    pub fn jobs_deduplicated(&self) -> u64 {
        self.jobs_deduplicated.load(Ordering::Relaxed)
    }

    pub fn jobs_dropped(&self) -> u64 {
        self.jobs_dropped.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Relaxed)
    }

    /// Drops recorded for one reason
    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        self.drop_reasons.read().get(&reason).copied().unwrap_or(0)
    }

    /// Get metrics for a specific job type
    pub fn job_type_metrics(&self, job_type: &str) -> Option<JobTypeMetrics> {
        self.job_type_metrics.read().get(job_type).cloned()
    }

    /// Collect current snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            jobs_queued: self.jobs_queued(),
            jobs_processed: self.jobs_processed(),
            jobs_failed: self.jobs_failed(),
            jobs_retried: self.jobs_retried(),
            retries_scheduled: self.retries_scheduled(),
            jobs_deduplicated: self.jobs_deduplicated(),
            jobs_dropped: self.jobs_dropped(),
            queue_depth: self.queue_depth(),
            active_jobs: self.active_jobs(),
            job_types: self.job_type_metrics.read().clone(),
        }
    }

    fn with_job_type(&self, job_type: &str, update: impl FnOnce(&mut JobTypeMetrics)) {
        let mut metrics = self.job_type_metrics.write();
        update(metrics.entry(job_type.to_string()).or_default());
    }
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for LiveMetrics {
    fn record_queued(&self) {
        self.jobs_queued.fetch_add(1, Ordering::Relaxed);
    }

    fn record_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    fn record_deduplicated(&self, job_type: &str) {
        self.jobs_deduplicated.fetch_add(1, Ordering::Relaxed);
        self.with_job_type(job_type, |m| m.deduplicated += 1);
    }

    fn record_dropped(&self, reason: DropReason, job_type: &str) {
        self.jobs_dropped.fetch_add(1, Ordering::Relaxed);
        *self.drop_reasons.write().entry(reason).or_insert(0) += 1;
        self.with_job_type(job_type, |m| m.dropped += 1);
    }

    fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    fn update_active_jobs(&self, active: usize) {
        self.active_jobs.store(active, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.jobs_queued,
            &self.jobs_processed,
            &self.jobs_failed,
            &self.jobs_retried,
            &self.retries_scheduled,
            &self.jobs_deduplicated,
            &self.jobs_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.queue_depth.store(0, Ordering::Relaxed);
        self.active_jobs.store(0, Ordering::Relaxed);
        self.job_type_metrics.write().clear();
        self.drop_reasons.write().clear();
    }

    fn log_snapshot(&self) {
        let snapshot = self.snapshot();
        info!(
            queued = snapshot.jobs_queued,
            processed = snapshot.jobs_processed,
            failed = snapshot.jobs_failed,
            retried = snapshot.jobs_retried,
            deduplicated = snapshot.jobs_deduplicated,
            dropped = snapshot.jobs_dropped,
            queue_depth = snapshot.queue_depth,
            active_jobs = snapshot.active_jobs,
            success_rate = snapshot.success_rate(),
            "Dispatcher metrics snapshot"
        );
    }
}

/// Metrics for a specific job type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTypeMetrics {
    pub deduplicated: u64,
    pub dropped: u64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub jobs_queued: u64,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub retries_scheduled: u64,
    pub jobs_deduplicated: u64,
    pub jobs_dropped: u64,
    pub queue_depth: usize,
    pub active_jobs: usize,
    pub job_types: HashMap<String, JobTypeMetrics>,
}

impl MetricsSnapshot {
    /// Calculate overall success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total_processed = self.jobs_processed + self.jobs_failed;
        if total_processed == 0 {
            100.0
        } else {
            (self.jobs_processed as f64 / total_processed as f64) * 100.0
        }
    }

    /// Calculate retry rate as percentage of queued jobs
    pub fn retry_rate(&self) -> f64 {
        if self.jobs_queued == 0 {
            0.0
        } else {
            (self.jobs_retried as f64 / self.jobs_queued as f64) * 100.0
        }
    }

    /// Queued jobs that have not reached a terminal state yet
    pub fn jobs_in_flight(&self) -> u64 {
        self.jobs_queued
            .saturating_sub(self.jobs_processed + self.jobs_failed + self.jobs_dropped)
    }

    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
