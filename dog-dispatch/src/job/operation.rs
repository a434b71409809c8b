use std::future::Future;
use async_trait::async_trait;

use crate::{JobError, JobId, TenantKey};

/// The unit of work behind a job
///
/// Operations are invoked once per attempt, so they must be safe to run again
/// after a retryable failure.
#[async_trait]
pub trait JobOperation: Send + Sync + 'static {
    /// Run one attempt of the job
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError>;
}

/// Per-attempt execution context handed to an operation
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job identifier
    pub job_id: JobId,

    /// Caller-supplied classification
    pub job_type: String,

    /// Tenant the job runs for
    pub tenant: TenantKey,

    /// Execution attempt number (1 for the first run)
    pub attempt: u32,
}

/// Adapter turning an async closure into a [`JobOperation`]
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> JobOperation for FnOperation<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}
