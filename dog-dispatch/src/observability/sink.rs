use crate::DropReason;

/// Metrics collaborator invoked on every dispatcher state transition
///
/// Implementations must be cheap and non-blocking: they are called while the
/// dispatcher holds its state lock.
pub trait MetricsSink: Send + Sync {
    /// A job entered a tenant lane for the first time
    fn record_queued(&self);

    /// A job completed successfully
    fn record_processed(&self);

    /// A job failed permanently
    fn record_failed(&self);

    /// A failed job re-entered its lane after its backoff
    fn record_retry(&self);

    /// A failed job was given a backoff before its next attempt
    fn record_retry_scheduled(&self);

    /// A job was rejected because its idempotency key was in flight
    fn record_deduplicated(&self, job_type: &str);

    /// A pending job was removed without running
    fn record_dropped(&self, reason: DropReason, job_type: &str);

    /// Current number of pending jobs
    fn update_queue_depth(&self, depth: usize);

    /// Current number of running jobs
    fn update_active_jobs(&self, active: usize);

    /// Zero all counters and gauges
    fn reset(&self);

    /// Emit the current values to the log stream
    fn log_snapshot(&self);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_queued(&self) {}
    fn record_processed(&self) {}
    fn record_failed(&self) {}
    fn record_retry(&self) {}
    fn record_retry_scheduled(&self) {}
    fn record_deduplicated(&self, _job_type: &str) {}
    fn record_dropped(&self, _reason: DropReason, _job_type: &str) {}
    fn update_queue_depth(&self, _depth: usize) {}
    fn update_active_jobs(&self, _active: usize) {}
    fn reset(&self) {}
    fn log_snapshot(&self) {}
}
