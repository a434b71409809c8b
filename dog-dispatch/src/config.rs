//! Dispatcher configuration.
//!
//! Everything the dispatcher needs is carried in an explicit
//! [`DispatcherConfig`]. The environment is consulted only by
//! [`DispatcherConfig::from_env`], which bootstrap code calls once:
//!
//! ```bash
//! export NOTIFICATION_MAX_QUEUE_LENGTH=5000
//! export NOTIFICATION_TICK_DEBOUNCE_MS=2
//! ```

use std::time::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{DispatchError, DispatchResult};

/// Environment variable holding the global pending-queue cap
pub const MAX_QUEUE_LENGTH_ENV: &str = "NOTIFICATION_MAX_QUEUE_LENGTH";

/// Pending-queue cap used when the environment does not set one
pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 10_000;

/// Environment variable holding the dispatch tick debounce, in milliseconds
pub const TICK_DEBOUNCE_ENV: &str = "NOTIFICATION_TICK_DEBOUNCE_MS";

/// Quiet period the scheduler waits for before selecting
pub const DEFAULT_TICK_DEBOUNCE: Duration = Duration::from_millis(1);

/// Concurrency caps, adjustable at runtime through `Dispatcher::configure`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    /// Maximum jobs running at once across all tenants
    pub concurrency: usize,
    /// Maximum jobs running at once for a single tenant
    pub per_tenant_limit: usize,
}

impl ConcurrencyLimits {
    pub fn new(concurrency: usize, per_tenant_limit: usize) -> Self {
        Self { concurrency, per_tenant_limit }
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.concurrency == 0 {
            return Err(DispatchError::InvalidConfig("concurrency must be greater than 0".to_string()));
        }
        if self.per_tenant_limit == 0 {
            return Err(DispatchError::InvalidConfig("per_tenant_limit must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            concurrency: 10,
            per_tenant_limit: 2,
        }
    }
}

/// Retry budget and backoff curve for failed attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry
    pub base_backoff: Duration,
    /// Upper bound for the exponential backoff
    pub max_backoff: Duration,
    /// Uniform random delay added on top of the backoff
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300), // 5 minutes
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Policy that fails a job on its first error
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Policy with a fixed delay between attempts and no jitter
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_backoff: delay,
            max_backoff: delay,
            jitter: Duration::ZERO,
        }
    }

    /// Exponential backoff for the retry following `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = std::cmp::min(self.base_backoff.saturating_mul(factor), self.max_backoff);

        if self.jitter.is_zero() {
            return backoff;
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        backoff + Duration::from_millis(jitter_ms)
    }
}

/// Configuration for a dispatcher instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Global and per-tenant concurrency caps
    pub limits: ConcurrencyLimits,
    /// Global cap on pending jobs; the oldest is evicted beyond it
    pub max_queue_length: usize,
    /// Retry budget and backoff
    pub retry: RetryPolicy,
    /// Buffer size of the lifecycle event channel
    pub event_capacity: usize,
    /// Quiet period after a tick request before the scheduler selects
    ///
    /// Admissions landing inside the window are selected together. Zero
    /// coalesces over a single task yield instead.
    pub tick_debounce: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            limits: ConcurrencyLimits::default(),
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
            retry: RetryPolicy::default(),
            event_capacity: 1000,
            tick_debounce: DEFAULT_TICK_DEBOUNCE,
        }
    }
}

impl DispatcherConfig {
    /// Load overrides from the process environment
    pub fn from_env() -> DispatchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> DispatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_QUEUE_LENGTH_ENV) {
            config.max_queue_length = raw.trim().parse::<usize>().map_err(|e| {
                DispatchError::InvalidConfig(format!("{}={:?}: {}", MAX_QUEUE_LENGTH_ENV, raw, e))
            })?;
        }

        if let Some(raw) = lookup(TICK_DEBOUNCE_ENV) {
            let millis = raw.trim().parse::<u64>().map_err(|e| {
                DispatchError::InvalidConfig(format!("{}={:?}: {}", TICK_DEBOUNCE_ENV, raw, e))
            })?;
            config.tick_debounce = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the concurrency caps
    pub fn with_limits(mut self, concurrency: usize, per_tenant_limit: usize) -> Self {
        self.limits = ConcurrencyLimits::new(concurrency, per_tenant_limit);
        self
    }

    /// Set the pending-queue cap
    pub fn with_max_queue_length(mut self, max_queue_length: usize) -> Self {
        self.max_queue_length = max_queue_length;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the tick debounce window
    pub fn with_tick_debounce(mut self, tick_debounce: Duration) -> Self {
        self.tick_debounce = tick_debounce;
        self
    }

    pub fn validate(&self) -> DispatchResult<()> {
        self.limits.validate()?;
        if self.max_queue_length == 0 {
            return Err(DispatchError::InvalidConfig("max_queue_length must be greater than 0".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(DispatchError::InvalidConfig("event_capacity must be greater than 0".to_string()));
        }
        Ok(())
    }
}
