//! Runs a small mixed notification load through a dispatcher.
//!
//! ```bash
//! RUST_LOG=dog_dispatch=debug NOTIFICATION_MAX_QUEUE_LENGTH=50 \
//!     cargo run --bin dispatch-demo --features tracing-basic
//! ```

use std::time::Duration;

use dog_dispatch::prelude::*;
use dog_dispatch::{init_tracing, LogFormat};

#[tokio::main]
async fn main() -> DispatchResult<()> {
    let format = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    init_tracing(format)?;

    let config = DispatcherConfig::from_env()?
        .with_limits(4, 2)
        .with_retry(RetryPolicy::fixed(2, Duration::from_millis(200)));
    let dispatcher = Dispatcher::new(config)?;

    // One bulk tenant and two small ones
    for n in 0..20 {
        dispatcher.enqueue(send("newsletter", "bulk-co", n, 0))?;
    }
    for tenant in ["acme", "globex"] {
        for n in 0..3 {
            dispatcher.enqueue(send("password-reset", tenant, n, JobPriority::HIGH.value()))?;
        }
    }

    // Same digest twice: second one is skipped
    for _ in 0..2 {
        let digest = send("digest", "acme", 99, 0).with_idempotency_key("notif::acme::digest");
        if let Admission::Deduplicated { job_id } = dispatcher.enqueue(digest)? {
            tracing::info!(%job_id, "Digest already in flight");
        }
    }

    dispatcher.await_idle(Duration::from_secs(30)).await?;
    dispatcher.metrics().log_snapshot();
    Ok(())
}

/// Fake delivery: takes a few milliseconds, every seventh first attempt fails
fn send(job_type: &str, tenant: &str, n: u32, priority: i32) -> Job {
    Job::from_fn(JobMeta::new(job_type), move |ctx: JobContext| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if n % 7 == 3 && ctx.attempt == 1 {
            return Err(JobError::retryable("provider returned 503"));
        }
        Ok(())
    })
    .with_tenant(tenant)
    .with_priority(priority)
}
