use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::{Job, JobContext, JobError, config::RetryPolicy};
use super::{Inner, state::ActiveJob};

/// What to do with a job after one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settlement {
    Completed,
    Retry { delay: Duration, error: JobError },
    Failed { error: JobError },
}

/// Decide the follow-up for an attempt's result
///
/// `attempt` is 1-based; a retryable error is retried while
/// `attempt <= max_retries`.
pub(crate) fn settle(
    result: Result<(), JobError>,
    attempt: u32,
    max_retries: u32,
    policy: &RetryPolicy,
) -> Settlement {
    match result {
        Ok(()) => Settlement::Completed,
        Err(error) if error.is_retryable() && attempt <= max_retries => Settlement::Retry {
            delay: policy.backoff(attempt),
            error,
        },
        Err(error) => Settlement::Failed { error },
    }
}

/// Run the operation once, turning a panic into a retryable error
pub(crate) async fn run_attempt(job: &Job, attempt: u32) -> Result<(), JobError> {
    let ctx = JobContext {
        job_id: job.meta.id.clone(),
        job_type: job.meta.job_type.clone(),
        tenant: job.tenant.clone(),
        attempt,
    };

    match AssertUnwindSafe(job.operation.execute(ctx)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(JobError::retryable(format!("Job panicked: {}", panic_message(&*panic)))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Execution task for one dispatched job: run, settle, and on retry wait out
/// the backoff before re-admitting
pub(super) async fn execute(inner: Arc<Inner>, active: ActiveJob) {
    let result = run_attempt(&active.job, active.attempt).await;
    let max_retries = active.job.max_retries.unwrap_or(inner.retry.max_retries);

    match settle(result, active.attempt, max_retries, &inner.retry) {
        Settlement::Completed => {
            inner.with_state(|state, obs| state.complete(&active, obs));
        }
        Settlement::Failed { error } => {
            inner.with_state(|state, obs| state.fail(&active, &error, obs));
        }
        Settlement::Retry { delay, error } => {
            inner.with_state(|state, obs| state.schedule_retry(&active, delay, &error, obs));
            inner.request_tick();

            let mut closed = inner.closed.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = closed.wait_for(|closed| *closed) => {}
            }

            let ActiveJob { job, attempt } = active;
            inner.with_state(|state, obs| state.readmit(job, attempt, obs));
        }
    }

    inner.request_tick();
}
