use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::info;

use crate::{DispatchError, DispatchResult, DropReason};
use super::MetricsSink;

impl From<prometheus::Error> for DispatchError {
    fn from(err: prometheus::Error) -> Self {
        Self::Internal(format!("Prometheus error: {}", err))
    }
}

/// Metrics sink exporting to a Prometheus registry
pub struct PrometheusMetrics {
    registry: Registry,
    queued: IntCounter,
    processed: IntCounter,
    failed: IntCounter,
    retried: IntCounter,
    retries_scheduled: IntCounter,
    deduplicated: IntCounterVec,
    dropped: IntCounterVec,
    queue_depth: IntGauge,
    active_jobs: IntGauge,
}

impl PrometheusMetrics {
    /// Create and register all collectors under `namespace` in a fresh registry
    pub fn new(namespace: &str) -> DispatchResult<Self> {
        Self::with_registry(namespace, Registry::new())
    }

    /// Register all collectors in an existing registry
    pub fn with_registry(namespace: &str, registry: Registry) -> DispatchResult<Self> {
        let opts = |name: &str, help: &str| Opts::new(name, help).namespace(namespace);

        let queued = IntCounter::with_opts(opts("jobs_queued_total", "Jobs admitted into a tenant lane"))?;
        let processed = IntCounter::with_opts(opts("jobs_processed_total", "Jobs completed successfully"))?;
        let failed = IntCounter::with_opts(opts("jobs_failed_total", "Jobs failed permanently"))?;
        let retried = IntCounter::with_opts(opts("jobs_retried_total", "Jobs re-queued after a failed attempt"))?;
        let retries_scheduled = IntCounter::with_opts(opts("retries_scheduled_total", "Retry backoffs armed"))?;
        let deduplicated = IntCounterVec::new(
            opts("jobs_deduplicated_total", "Jobs rejected by idempotency key"),
            &["job_type"],
        )?;
        let dropped = IntCounterVec::new(
            opts("jobs_dropped_total", "Pending jobs removed without running"),
            &["reason", "job_type"],
        )?;
        let queue_depth = IntGauge::with_opts(opts("queue_depth", "Pending jobs across all tenants"))?;
        let active_jobs = IntGauge::with_opts(opts("active_jobs", "Running jobs across all tenants"))?;

        registry.register(Box::new(queued.clone()))?;
        registry.register(Box::new(processed.clone()))?;
        registry.register(Box::new(failed.clone()))?;
        registry.register(Box::new(retried.clone()))?;
        registry.register(Box::new(retries_scheduled.clone()))?;
        registry.register(Box::new(deduplicated.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(active_jobs.clone()))?;

        Ok(Self {
            registry,
            queued,
            processed,
            failed,
            retried,
            retries_scheduled,
            deduplicated,
            dropped,
            queue_depth,
            active_jobs,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn gather_text(&self) -> DispatchResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| DispatchError::Internal(e.to_string()))
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_queued(&self) {
        self.queued.inc();
    }

    fn record_processed(&self) {
        self.processed.inc();
    }

    fn record_failed(&self) {
        self.failed.inc();
    }

    fn record_retry(&self) {
        self.retried.inc();
    }

    fn record_retry_scheduled(&self) {
        self.retries_scheduled.inc();
    }

    fn record_deduplicated(&self, job_type: &str) {
        self.deduplicated.with_label_values(&[job_type]).inc();
    }

    fn record_dropped(&self, reason: DropReason, job_type: &str) {
        self.dropped.with_label_values(&[reason.as_str(), job_type]).inc();
    }

    fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    fn update_active_jobs(&self, active: usize) {
        self.active_jobs.set(active as i64);
    }

    fn reset(&self) {
        self.queued.reset();
        self.processed.reset();
        self.failed.reset();
        self.retried.reset();
        self.retries_scheduled.reset();
        self.deduplicated.reset();
        self.dropped.reset();
        self.queue_depth.set(0);
        self.active_jobs.set(0);
    }

    fn log_snapshot(&self) {
        info!(
            queued = self.queued.get(),
            processed = self.processed.get(),
            failed = self.failed.get(),
            retried = self.retried.get(),
            queue_depth = self.queue_depth.get(),
            active_jobs = self.active_jobs.get(),
            "Dispatcher metrics snapshot"
        );
    }
}
