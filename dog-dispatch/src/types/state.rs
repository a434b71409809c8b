use serde::{Deserialize, Serialize};

/// Job lifecycle as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting in its tenant lane
    Queued,

    /// Operation is running
    Active,

    /// Failed an attempt and waiting out its backoff
    Retrying,

    /// Operation succeeded
    Completed,

    /// Retry budget exhausted or permanent error
    Failed,

    /// Removed before running (capacity eviction or shutdown)
    Dropped,

    /// Rejected at admission because its idempotency key was in flight
    Deduplicated,
}

impl JobState {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Dropped | Self::Deduplicated
        )
    }

    /// Get the state name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
            Self::Deduplicated => "deduplicated",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a pending job left the dispatcher without running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// Evicted as the globally-oldest pending job to respect the queue bound
    Capacity,

    /// Dispatcher shut down while the job was pending or waiting to retry
    Shutdown,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capacity => "capacity",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
