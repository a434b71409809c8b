//! # dog-dispatch: Fair In-Process Notification Dispatch
//!
//! **Multi-tenant, priority-aware, deduplicating job dispatcher**
//!
//! dog-dispatch runs outbound notification work (emails, pushes, SMS) inside
//! the host process while keeping one noisy tenant from starving the rest:
//!
//! ## Features
//!
//! - **Tenant Fairness**: Round-robin selection across tenant lanes with a per-tenant concurrency cap
//! - **Priorities**: Higher priority first within a lane, FIFO among equals
//! - **Idempotency**: A key already queued, running or retrying rejects the duplicate
//! - **Bounded Memory**: A global queue cap evicts the oldest pending job, whatever its tenant
//! - **Retries**: Exponential backoff with jitter; permanent errors fail at once
//! - **Observability**: Pluggable metrics sink, `tracing` events and a lifecycle event stream
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dog_dispatch::prelude::*;
//! use std::time::Duration;
//!
//! let dispatcher = Dispatcher::new(DispatcherConfig::from_env()?)?;
//!
//! let digest = Job::from_fn(JobMeta::new("digest"), |ctx| async move {
//!     mailer::send_digest(ctx.tenant.as_str()).await
//!         .map_err(|e| JobError::retryable(e.to_string()))
//! })
//! .with_tenant("tenant-z")
//! .with_priority(JobPriority::HIGH)
//! .with_idempotency_key("notif::tenant-z::digest");
//!
//! match dispatcher.enqueue(digest)? {
//!     Admission::Queued { evicted, .. } => { /* evicted: job dropped to make room */ }
//!     Admission::Deduplicated { .. } => { /* already in flight */ }
//! }
//!
//! dispatcher.await_idle(Duration::from_secs(30)).await?;
//! dispatcher.metrics().log_snapshot();
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod observability;
pub mod types;

// Core API exports
pub use dispatcher::{Admission, BoxStream, Dispatcher, DispatcherStats, LaneStats, Load};
pub use config::{ConcurrencyLimits, DispatcherConfig, RetryPolicy};
pub use types::{DispatchEvent, DropReason, JobId, JobPriority, JobState, TenantKey};
pub use error::{DispatchError, DispatchResult, JobError};
pub use job::{FnOperation, Job, JobContext, JobMeta, JobOperation};

// Observability exports
pub use observability::{LiveMetrics, MetricsSink, MetricsSnapshot, NoopMetrics, ObservabilityLayer};

#[cfg(feature = "metrics")]
pub use observability::PrometheusMetrics;

#[cfg(feature = "tracing-basic")]
pub use observability::{init_tracing, LogFormat};

/// Everything needed to build and submit jobs
pub mod prelude {
    pub use crate::{Admission, Dispatcher, DispatcherConfig, ConcurrencyLimits, RetryPolicy};

    pub use crate::{
        Job, JobMeta, JobContext, JobOperation, JobId, JobPriority, TenantKey,
        JobError, DispatchError, DispatchResult,
    };

    pub use crate::{DispatchEvent, MetricsSink, LiveMetrics};

    pub use async_trait::async_trait;
}
