//! The dispatcher: admission, fair selection and execution of jobs.
//!
//! A [`Dispatcher`] owns one scheduler task. Admission is synchronous and only
//! requests a tick. The scheduler debounces those requests: it selects only
//! once a full `tick_debounce` window passes with no new request, so a burst
//! of `enqueue` calls is admitted in full before the first selection on any
//! runtime flavour. It then drains every job the concurrency caps allow,
//! spawning one task per execution. All counters live behind a single lock
//! that is never held across an `.await`.

pub mod admission;
mod executor;
mod idle;
mod lanes;
mod state;

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, Instrument};

use crate::{
    DispatchError, DispatchEvent, DispatchResult, Job,
    config::{ConcurrencyLimits, DispatcherConfig, RetryPolicy},
    observability::{LiveMetrics, MetricsSink, ObservabilityLayer},
};
use idle::IdleCoordinator;
use state::DispatcherState;

pub use admission::Admission;
pub use state::{DispatcherStats, LaneStats, Load};

/// Boxed stream of lifecycle events
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Debounce windows a tick may be deferred by before selection is forced
const MAX_COALESCE_ROUNDS: usize = 8;

/// State shared between the handle, the scheduler and execution tasks
struct Inner {
    state: Mutex<DispatcherState>,
    obs: ObservabilityLayer,
    retry: RetryPolicy,
    tick: Notify,
    tick_requests: AtomicU64,
    tick_debounce: Duration,
    idle: IdleCoordinator,
    closed: watch::Sender<bool>,
}

impl Inner {
    /// Run `f` inside the critical section and publish the resulting load
    fn with_state<R>(&self, f: impl FnOnce(&mut DispatcherState, &ObservabilityLayer) -> R) -> R {
        let mut state = self.state.lock();
        let out = f(&mut state, &self.obs);
        self.idle.publish(state.load());
        out
    }

    /// Ask the scheduler for a selection pass; repeated requests collapse
    fn request_tick(&self) {
        self.tick_requests.fetch_add(1, Ordering::AcqRel);
        self.tick.notify_one();
    }

    fn dispatch_tick(self: &Arc<Self>) {
        let ready = self.with_state(|state, obs| state.drain_ready(obs));
        if !ready.is_empty() {
            debug!(started = ready.len(), "Dispatch tick");
        }

        for active in ready {
            tokio::spawn(executor::execute(Arc::clone(self), active).in_current_span());
        }
    }

    fn close(&self) -> usize {
        let dropped = self.with_state(|state, obs| state.close(obs));
        if !self.closed.send_replace(true) {
            info!(dropped, "Dispatcher shut down");
        }
        dropped
    }
}

/// Closes the dispatcher when the last [`Dispatcher`] handle goes away
struct Lifecycle {
    inner: Arc<Inner>,
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Selection loop; one per dispatcher
struct Scheduler {
    inner: Arc<Inner>,
    closed: watch::Receiver<bool>,
}

impl Scheduler {
    async fn run(mut self) {
        debug!("Scheduler started");

        loop {
            tokio::select! {
                _ = async { let _ = self.closed.wait_for(|closed| *closed).await; } => {
                    break;
                }
                _ = self.inner.tick.notified() => {
                    self.coalesce().await;
                    self.inner.dispatch_tick();
                }
            }
        }

        debug!("Scheduler stopped");
    }

    /// Wait until a debounce window passes without a new tick request
    ///
    /// Bounded by `MAX_COALESCE_ROUNDS` so a steady stream of admissions
    /// cannot hold selection off indefinitely.
    async fn coalesce(&self) {
        let debounce = self.inner.tick_debounce;

        for _ in 0..MAX_COALESCE_ROUNDS {
            let seen = self.inner.tick_requests.load(Ordering::Acquire);

            if debounce.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(debounce).await;
            }

            if self.inner.tick_requests.load(Ordering::Acquire) == seen {
                return;
            }
        }
    }
}

/// Multi-tenant, priority-aware job dispatcher
///
/// Cheap to clone; all clones drive the same queues. Dropping the last clone
/// shuts the dispatcher down, which drops any job still pending.
///
/// ```rust,ignore
/// let dispatcher = Dispatcher::new(DispatcherConfig::from_env()?)?;
///
/// dispatcher.enqueue(
///     Job::from_fn(JobMeta::new("welcome-email"), |ctx| async move {
///         send_welcome(ctx.tenant).await.map_err(|e| JobError::retryable(e.to_string()))
///     })
///     .with_tenant("acme")
///     .with_idempotency_key("welcome::acme::42"),
/// )?;
///
/// dispatcher.await_idle(Duration::from_secs(30)).await?;
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
    _lifecycle: Arc<Lifecycle>,
}

impl Dispatcher {
    /// Create a dispatcher recording into a fresh [`LiveMetrics`]
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        Self::with_metrics(config, Arc::new(LiveMetrics::new()))
    }

    /// Create a dispatcher recording into the given sink
    pub fn with_metrics(config: DispatcherConfig, metrics: Arc<dyn MetricsSink>) -> DispatchResult<Self> {
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DispatchError::Internal(format!("Dispatcher requires a tokio runtime: {}", e)))?;

        let (closed, closed_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            state: Mutex::new(DispatcherState::new(&config)),
            obs: ObservabilityLayer::new(metrics, config.event_capacity),
            retry: config.retry.clone(),
            tick: Notify::new(),
            tick_requests: AtomicU64::new(0),
            tick_debounce: config.tick_debounce,
            idle: IdleCoordinator::new(),
            closed,
        });

        runtime.spawn(
            Scheduler {
                inner: Arc::clone(&inner),
                closed: closed_rx,
            }
            .run()
            .in_current_span(),
        );

        info!(
            concurrency = config.limits.concurrency,
            per_tenant_limit = config.limits.per_tenant_limit,
            max_queue_length = config.max_queue_length,
            max_retries = config.retry.max_retries,
            tick_debounce_ms = config.tick_debounce.as_millis() as u64,
            "Dispatcher started"
        );

        Ok(Self {
            _lifecycle: Arc::new(Lifecycle { inner: Arc::clone(&inner) }),
            inner,
        })
    }

    /// Replace the concurrency caps; running jobs are never preempted
    pub fn configure(&self, limits: ConcurrencyLimits) -> DispatchResult<()> {
        limits.validate()?;

        self.inner.with_state(|state, _| state.set_limits(limits));
        info!(
            concurrency = limits.concurrency,
            per_tenant_limit = limits.per_tenant_limit,
            "Concurrency limits updated"
        );

        self.inner.request_tick();
        Ok(())
    }

    /// Admit one job
    ///
    /// Never runs the job inline. Selection happens on the next debounced
    /// scheduler tick, so jobs enqueued back to back are considered together.
    pub fn enqueue(&self, job: Job) -> DispatchResult<Admission> {
        job.validate()?;

        let admission = self.inner.with_state(|state, obs| {
            if state.is_closed() {
                return Err(DispatchError::ShutDown);
            }
            Ok(state.admit(job, obs))
        })?;

        if admission.is_queued() {
            self.inner.request_tick();
        }
        Ok(admission)
    }

    /// Admit several jobs in one critical section
    ///
    /// The whole batch is rejected if any job is malformed.
    pub fn enqueue_batch(&self, jobs: impl IntoIterator<Item = Job>) -> DispatchResult<Vec<Admission>> {
        let jobs: Vec<Job> = jobs.into_iter().collect();
        jobs.iter().try_for_each(Job::validate)?;

        let admissions = self.inner.with_state(|state, obs| {
            if state.is_closed() {
                return Err(DispatchError::ShutDown);
            }
            Ok(jobs.into_iter().map(|job| state.admit(job, obs)).collect::<Vec<_>>())
        })?;

        if admissions.iter().any(Admission::is_queued) {
            self.inner.request_tick();
        }
        Ok(admissions)
    }

    /// Wait until nothing is pending, running or waiting to retry
    pub async fn await_idle(&self, timeout: Duration) -> DispatchResult<()> {
        self.inner.idle.wait(timeout).await
    }

    /// Current pending, active and delayed counts
    pub fn load(&self) -> Load {
        self.inner.idle.current()
    }

    pub fn stats(&self) -> DispatcherStats {
        self.inner.state.lock().stats()
    }

    /// Stream of lifecycle events from now on; lagging subscribers skip events
    pub fn event_stream(&self) -> BoxStream<DispatchEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let stream = BroadcastStream::new(self.inner.obs.subscribe()).filter_map(|result| result.ok());
        Box::pin(stream)
    }

    /// Get the metrics sink
    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        self.inner.obs.metrics()
    }

    /// Stop dispatching and drop every pending job
    ///
    /// Running jobs finish normally; jobs waiting out a retry backoff are
    /// dropped when they wake. Returns the number of pending jobs dropped.
    pub fn shutdown(&self) -> usize {
        self.inner.close()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.closed.borrow()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("load", &self.load())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
