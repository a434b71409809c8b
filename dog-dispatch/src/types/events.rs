use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DropReason, JobId, JobState, TenantKey};

/// Lifecycle events broadcast by the dispatcher for structured observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// Job was admitted into its tenant lane
    Queued {
        job_id: JobId,
        tenant: TenantKey,
        job_type: String,
        at: DateTime<Utc>,
    },

    /// Job was rejected because its idempotency key was in flight
    Deduplicated {
        job_id: JobId,
        job_type: String,
        at: DateTime<Utc>,
    },

    /// Pending job was removed without running
    Dropped {
        job_id: JobId,
        job_type: String,
        reason: DropReason,
        at: DateTime<Utc>,
    },

    /// Job was selected and its operation started
    Started {
        job_id: JobId,
        tenant: TenantKey,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Job failed an attempt and will be re-admitted after `retry_at`
    Retrying {
        job_id: JobId,
        attempt: u32,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job completed successfully
    Completed {
        job_id: JobId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Job failed permanently
    Failed {
        job_id: JobId,
        attempt: u32,
        error: String,
        at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "queued",
            Self::Deduplicated { .. } => "deduplicated",
            Self::Dropped { .. } => "dropped",
            Self::Started { .. } => "started",
            Self::Retrying { .. } => "retrying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// State the job entered with this event
    pub fn state(&self) -> JobState {
        match self {
            Self::Queued { .. } => JobState::Queued,
            Self::Deduplicated { .. } => JobState::Deduplicated,
            Self::Dropped { .. } => JobState::Dropped,
            Self::Started { .. } => JobState::Active,
            Self::Retrying { .. } => JobState::Retrying,
            Self::Completed { .. } => JobState::Completed,
            Self::Failed { .. } => JobState::Failed,
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Queued { job_id, .. }
            | Self::Deduplicated { job_id, .. }
            | Self::Dropped { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Queued { at, .. }
            | Self::Deduplicated { at, .. }
            | Self::Dropped { at, .. }
            | Self::Started { at, .. }
            | Self::Retrying { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. } => at,
        }
    }
}
