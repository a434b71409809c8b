use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::{DispatchEvent, DropReason, Job, JobError};
use super::MetricsSink;

/// Fans every state transition out to the metrics sink, the log stream and
/// the event broadcast
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<DispatchEvent>,
    metrics: Arc<dyn MetricsSink>,
}

impl ObservabilityLayer {
    /// Create new observability layer
    pub fn new(metrics: Arc<dyn MetricsSink>, event_capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(event_capacity);

        Self {
            event_broadcaster,
            metrics,
        }
    }

    /// Fresh job admitted into its lane
    pub(crate) fn job_queued(&self, job: &Job, queue_depth: usize) {
        self.metrics.record_queued();
        self.metrics.update_queue_depth(queue_depth);

        self.emit(DispatchEvent::Queued {
            job_id: job.meta.id.clone(),
            tenant: job.tenant.clone(),
            job_type: job.meta.job_type.clone(),
            at: Utc::now(),
        });
        debug!(job_id = %job.meta.id, job_type = %job.meta.job_type, tenant = %job.tenant, priority = %job.priority, "Job queued");
    }

    /// Retried job re-entered its lane
    pub(crate) fn job_requeued(&self, job: &Job, attempt: u32, queue_depth: usize) {
        self.metrics.record_retry();
        self.metrics.update_queue_depth(queue_depth);
        debug!(job_id = %job.meta.id, job_type = %job.meta.job_type, tenant = %job.tenant, attempt, "Job re-queued for retry");
    }

    pub(crate) fn job_deduplicated(&self, job: &Job) {
        self.metrics.record_deduplicated(&job.meta.job_type);

        self.emit(DispatchEvent::Deduplicated {
            job_id: job.meta.id.clone(),
            job_type: job.meta.job_type.clone(),
            at: Utc::now(),
        });
        debug!(
            job_id = %job.meta.id,
            job_type = %job.meta.job_type,
            idempotency_key = job.idempotency_key.as_deref().unwrap_or_default(),
            "Duplicate job skipped"
        );
    }

    pub(crate) fn job_dropped(&self, job: &Job, reason: DropReason, queue_depth: usize) {
        self.metrics.record_dropped(reason, &job.meta.job_type);
        self.metrics.update_queue_depth(queue_depth);

        self.emit(DispatchEvent::Dropped {
            job_id: job.meta.id.clone(),
            job_type: job.meta.job_type.clone(),
            reason,
            at: Utc::now(),
        });
        warn!(job_id = %job.meta.id, job_type = %job.meta.job_type, tenant = %job.tenant, reason = %reason, "Dropped pending job");
    }

    pub(crate) fn job_started(&self, job: &Job, attempt: u32, queue_depth: usize, active_jobs: usize) {
        self.metrics.update_queue_depth(queue_depth);
        self.metrics.update_active_jobs(active_jobs);

        self.emit(DispatchEvent::Started {
            job_id: job.meta.id.clone(),
            tenant: job.tenant.clone(),
            attempt,
            at: Utc::now(),
        });
        debug!(job_id = %job.meta.id, job_type = %job.meta.job_type, tenant = %job.tenant, attempt, "Job started");
    }

    pub(crate) fn job_completed(&self, job: &Job, attempt: u32, active_jobs: usize) {
        self.metrics.record_processed();
        self.metrics.update_active_jobs(active_jobs);

        self.emit(DispatchEvent::Completed {
            job_id: job.meta.id.clone(),
            attempt,
            at: Utc::now(),
        });
        debug!(job_id = %job.meta.id, job_type = %job.meta.job_type, attempt, "Job completed");
    }

    pub(crate) fn retry_scheduled(&self, job: &Job, attempt: u32, delay: Duration, err: &JobError, active_jobs: usize) {
        self.metrics.record_retry_scheduled();
        self.metrics.update_active_jobs(active_jobs);

        let retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        self.emit(DispatchEvent::Retrying {
            job_id: job.meta.id.clone(),
            attempt,
            retry_at,
            error: err.to_string(),
            at: Utc::now(),
        });
        warn!(job_id = %job.meta.id, job_type = %job.meta.job_type, attempt, ?delay, error = %err, "Job failed, will retry");
    }

    pub(crate) fn job_failed(&self, job: &Job, attempt: u32, err: &JobError, active_jobs: usize) {
        self.metrics.record_failed();
        self.metrics.update_active_jobs(active_jobs);

        self.emit(DispatchEvent::Failed {
            job_id: job.meta.id.clone(),
            attempt,
            error: err.to_string(),
            at: Utc::now(),
        });
        error!(job_id = %job.meta.id, job_type = %job.meta.job_type, tenant = %job.tenant, attempt, error = %err, "Job failed permanently");
    }

    fn emit(&self, event: DispatchEvent) {
        let _ = self.event_broadcaster.send(event);
    }

    /// Get event stream
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Get the metrics sink
    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }
}
