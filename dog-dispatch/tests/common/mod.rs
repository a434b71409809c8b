#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use dog_dispatch::{
    DispatcherConfig, DropReason, Job, JobContext, JobError, JobMeta, MetricsSink,
    RetryPolicy,
};

/// Every call a dispatcher made on its metrics sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricCall {
    Queued,
    Processed,
    Failed,
    Retry,
    RetryScheduled,
    Deduplicated(String),
    Dropped(DropReason, String),
    QueueDepth(usize),
    ActiveJobs(usize),
}

/// Metrics sink that keeps the full call log for exact assertions
#[derive(Default)]
pub struct RecordingMetrics {
    calls: Mutex<Vec<MetricCall>>,
}

impl RecordingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<MetricCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &MetricCall) -> usize {
        self.calls.lock().iter().filter(|recorded| *recorded == call).count()
    }

    pub fn last_queue_depth(&self) -> Option<usize> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            MetricCall::QueueDepth(depth) => Some(*depth),
            _ => None,
        })
    }

    pub fn last_active_jobs(&self) -> Option<usize> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            MetricCall::ActiveJobs(active) => Some(*active),
            _ => None,
        })
    }

    fn push(&self, call: MetricCall) {
        self.calls.lock().push(call);
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_queued(&self) {
        self.push(MetricCall::Queued);
    }

    fn record_processed(&self) {
        self.push(MetricCall::Processed);
    }

    fn record_failed(&self) {
        self.push(MetricCall::Failed);
    }

    fn record_retry(&self) {
        self.push(MetricCall::Retry);
    }

    fn record_retry_scheduled(&self) {
        self.push(MetricCall::RetryScheduled);
    }

    fn record_deduplicated(&self, job_type: &str) {
        self.push(MetricCall::Deduplicated(job_type.to_string()));
    }

    fn record_dropped(&self, reason: DropReason, job_type: &str) {
        self.push(MetricCall::Dropped(reason, job_type.to_string()));
    }

    fn update_queue_depth(&self, depth: usize) {
        self.push(MetricCall::QueueDepth(depth));
    }

    fn update_active_jobs(&self, active: usize) {
        self.push(MetricCall::ActiveJobs(active));
    }

    fn reset(&self) {
        self.calls.lock().clear();
    }

    fn log_snapshot(&self) {}
}

/// Names of executed jobs in the order their operations started
#[derive(Clone, Default)]
pub struct ExecutionLog {
    started: Arc<Mutex<Vec<String>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    /// Job that logs its name, then holds its slot for `hold`
    pub fn job(&self, name: &str, job_type: &str, hold: Duration) -> Job {
        let started = self.started.clone();
        let name = name.to_string();
        Job::from_fn(JobMeta::new(job_type).with_id(name.as_str()), move |_ctx| {
            let started = started.clone();
            let name = name.clone();
            async move {
                started.lock().push(name);
                tokio::time::sleep(hold).await;
                Ok(())
            }
        })
    }
}

/// Job failing with `error` until `succeed_on` (1-based), counting attempts
pub fn flaky_job(
    job_type: &str,
    attempts: Arc<AtomicU32>,
    succeed_on: Option<u32>,
    error: JobError,
) -> Job {
    Job::from_fn(JobMeta::new(job_type), move |ctx: JobContext| {
        let attempts = attempts.clone();
        let error = error.clone();
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            match succeed_on {
                Some(n) if ctx.attempt >= n => Ok(()),
                _ => Err(error),
            }
        }
    })
}

pub fn config(concurrency: usize, per_tenant_limit: usize) -> DispatcherConfig {
    DispatcherConfig::default()
        .with_limits(concurrency, per_tenant_limit)
        .with_retry(RetryPolicy::fixed(3, Duration::from_secs(1)))
}

pub const HOLD: Duration = Duration::from_millis(5);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);
