pub mod operation;

pub use operation::{JobOperation, JobContext, FnOperation};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::{DispatchError, DispatchResult, JobError, JobId, JobPriority, TenantKey};

/// Caller-supplied labels for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    /// Identifier used in logs and events
    pub id: JobId,

    /// Classification used as the metrics label
    pub job_type: String,
}

impl JobMeta {
    /// Create metadata with a freshly generated id
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            id: JobId::generate(),
            job_type: job_type.into(),
        }
    }

    /// Use a caller-chosen id
    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }
}

/// An opaque unit of work submitted to the dispatcher
#[derive(Clone)]
pub struct Job {
    pub(crate) meta: JobMeta,
    pub(crate) tenant: TenantKey,
    pub(crate) priority: JobPriority,
    pub(crate) idempotency_key: Option<String>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) operation: Arc<dyn JobOperation>,
}

impl Job {
    /// Create a job for the implicit tenant with default priority
    pub fn new(meta: JobMeta, operation: impl JobOperation) -> Self {
        Self {
            meta,
            tenant: TenantKey::implicit(),
            priority: JobPriority::default(),
            idempotency_key: None,
            max_retries: None,
            operation: Arc::new(operation),
        }
    }

    /// Create a job from an async closure
    pub fn from_fn<F, Fut>(meta: JobMeta, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        Self::new(meta, FnOperation::new(f))
    }

    /// Set the tenant lane
    pub fn with_tenant(mut self, tenant: impl Into<TenantKey>) -> Self {
        self.tenant = tenant.into();
        self
    }

    /// Set the job priority
    pub fn with_priority(mut self, priority: impl Into<JobPriority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Set the idempotency key
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Override the dispatcher-wide retry budget for this job
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn id(&self) -> &JobId {
        &self.meta.id
    }

    pub fn job_type(&self) -> &str {
        &self.meta.job_type
    }

    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    pub fn priority(&self) -> JobPriority {
        self.priority
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    /// Check the job shape at the admission boundary
    pub(crate) fn validate(&self) -> DispatchResult<()> {
        if self.meta.job_type.trim().is_empty() {
            return Err(DispatchError::InvalidJob(format!(
                "job {} has an empty job type",
                self.meta.id
            )));
        }
        if matches!(self.idempotency_key.as_deref(), Some(key) if key.is_empty()) {
            return Err(DispatchError::InvalidJob(format!(
                "job {} has an empty idempotency key",
                self.meta.id
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("meta", &self.meta)
            .field("tenant", &self.tenant)
            .field("priority", &self.priority)
            .field("idempotency_key", &self.idempotency_key)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
