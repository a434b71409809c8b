mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tracing_test::traced_test;

use common::{config, ExecutionLog, MetricCall, RecordingMetrics, HOLD, IDLE_TIMEOUT};
use dog_dispatch::{
    Admission, ConcurrencyLimits, DispatchError, DispatchEvent, Dispatcher, DropReason, Job, JobMeta, JobState,
    NoopMetrics,
};

fn dispatcher(concurrency: usize, per_tenant_limit: usize) -> (Dispatcher, Arc<RecordingMetrics>) {
    let metrics = RecordingMetrics::new();
    let dispatcher = Dispatcher::with_metrics(config(concurrency, per_tenant_limit), metrics.clone()).unwrap();
    (dispatcher, metrics)
}

/// Let the debounced scheduler tick and any runnable execution task run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// A1. Tenants Take Turns
#[tokio::test(start_paused = true)]
async fn test_tenants_take_turns() {
    let (dispatcher, _) = dispatcher(2, 1);
    let log = ExecutionLog::new();

    // Arrange: tenant-a floods before tenant-b arrives
    dispatcher.enqueue(log.job("A1", "email", HOLD).with_tenant("tenant-a")).unwrap();
    dispatcher.enqueue(log.job("A2", "email", HOLD).with_tenant("tenant-a")).unwrap();
    dispatcher.enqueue(log.job("B1", "email", HOLD).with_tenant("tenant-b")).unwrap();

    // Act
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    // Assert: B1 is not stuck behind A2
    assert_eq!(log.order(), vec!["A1", "B1", "A2"]);
}

/// A2. Higher Priority Runs First
#[tokio::test(start_paused = true)]
async fn test_higher_priority_runs_first() {
    let (dispatcher, _) = dispatcher(1, 1);
    let log = ExecutionLog::new();

    // Arrange: low admitted before high, same tenant
    dispatcher.enqueue(log.job("low", "email", HOLD).with_tenant("t").with_priority(0)).unwrap();
    dispatcher.enqueue(log.job("high", "email", HOLD).with_tenant("t").with_priority(10)).unwrap();

    // Act
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    // Assert
    assert_eq!(log.order(), vec!["high", "low"]);
}

/// A3. Equal Priority Is FIFO
#[tokio::test(start_paused = true)]
async fn test_equal_priority_is_fifo() {
    let (dispatcher, _) = dispatcher(1, 1);
    let log = ExecutionLog::new();

    for name in ["first", "second", "third"] {
        dispatcher.enqueue(log.job(name, "sms", HOLD).with_tenant("t").with_priority(5)).unwrap();
    }
    dispatcher.enqueue(log.job("urgent", "sms", HOLD).with_tenant("t").with_priority(6)).unwrap();

    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    assert_eq!(log.order(), vec!["urgent", "first", "second", "third"]);
}

/// A4. Duplicate Idempotency Key Runs Once
#[tokio::test(start_paused = true)]
async fn test_duplicate_key_runs_once() {
    let (dispatcher, metrics) = dispatcher(10, 2);
    let log = ExecutionLog::new();
    let key = "notif::tenant-z::digest";

    // Act: same key submitted twice before either runs
    let first = dispatcher
        .enqueue(log.job("digest-1", "digest", HOLD).with_tenant("tenant-z").with_idempotency_key(key))
        .unwrap();
    let second = dispatcher
        .enqueue(log.job("digest-2", "digest", HOLD).with_tenant("tenant-z").with_idempotency_key(key))
        .unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    // Assert
    assert!(first.is_queued());
    assert!(matches!(second, Admission::Deduplicated { .. }));
    assert_eq!(log.order(), vec!["digest-1"]);
    assert_eq!(metrics.count(&MetricCall::Deduplicated("digest".to_string())), 1);
    assert_eq!(metrics.count(&MetricCall::Queued), 1);
    assert_eq!(metrics.count(&MetricCall::Processed), 1);
}

/// A5. Key Is Free Again After Completion
#[tokio::test(start_paused = true)]
async fn test_key_reusable_after_completion() {
    let (dispatcher, _) = dispatcher(10, 2);
    let log = ExecutionLog::new();

    dispatcher.enqueue(log.job("one", "digest", HOLD).with_idempotency_key("daily")).unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    let again = dispatcher.enqueue(log.job("two", "digest", HOLD).with_idempotency_key("daily")).unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    assert!(again.is_queued());
    assert_eq!(log.order(), vec!["one", "two"]);
}

/// A6. Capacity Guard Evicts The Oldest Pending Job
#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_capacity_guard_evicts_oldest() {
    let metrics = RecordingMetrics::new();
    let dispatcher =
        Dispatcher::with_metrics(config(1, 1).with_max_queue_length(2), metrics.clone()).unwrap();
    let log = ExecutionLog::new();

    // Arrange: three jobs on the implicit lane, cap of two
    dispatcher.enqueue(log.job("alpha", "alpha", HOLD)).unwrap();
    dispatcher.enqueue(log.job("beta", "beta", HOLD)).unwrap();

    // Act
    let admission = dispatcher.enqueue(log.job("gamma", "gamma", HOLD)).unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    // Assert
    assert_eq!(
        admission,
        Admission::Queued { job_id: "gamma".into(), evicted: Some("alpha".into()) }
    );
    assert_eq!(log.order(), vec!["beta", "gamma"]);
    assert_eq!(metrics.count(&MetricCall::Dropped(DropReason::Capacity, "alpha".to_string())), 1);
    assert_eq!(metrics.count(&MetricCall::Queued), 3);
    assert!(logs_contain("Dropped pending job"));
}

/// A7. Eviction Ignores Tenant And Priority
#[tokio::test(start_paused = true)]
async fn test_eviction_crosses_tenants() {
    let metrics = RecordingMetrics::new();
    let dispatcher =
        Dispatcher::with_metrics(config(1, 1).with_max_queue_length(2), metrics.clone()).unwrap();
    let log = ExecutionLog::new();

    dispatcher.enqueue(log.job("vip", "vip", HOLD).with_tenant("a").with_priority(100)).unwrap();
    dispatcher.enqueue(log.job("b1", "bulk", HOLD).with_tenant("b")).unwrap();
    dispatcher.enqueue(log.job("c1", "bulk", HOLD).with_tenant("c")).unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    assert_eq!(log.order(), vec!["b1", "c1"]);
    assert_eq!(metrics.count(&MetricCall::Dropped(DropReason::Capacity, "vip".to_string())), 1);
}

/// A8. Every Admitted Job Is Accounted For
#[tokio::test(start_paused = true)]
async fn test_admitted_jobs_are_conserved() {
    let metrics = RecordingMetrics::new();
    let dispatcher =
        Dispatcher::with_metrics(config(2, 1).with_max_queue_length(10), metrics.clone()).unwrap();
    let log = ExecutionLog::new();

    // Arrange: 40 submissions over three tenants with overlapping keys
    let mut queued = 0;
    let mut deduplicated = 0;
    for n in 0..40 {
        let job = log
            .job(&format!("job-{}", n), "notify", HOLD)
            .with_tenant(format!("tenant-{}", n % 3))
            .with_priority((n % 4) as i32);
        let job = if n % 5 == 0 { job.with_idempotency_key(format!("key-{}", n % 15)) } else { job };

        match dispatcher.enqueue(job).unwrap() {
            Admission::Queued { .. } => queued += 1,
            Admission::Deduplicated { .. } => deduplicated += 1,
        }
    }

    // Act
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    // Assert: queued = completed + evicted, nothing left behind
    let processed = metrics.count(&MetricCall::Processed);
    let evicted = metrics
        .calls()
        .iter()
        .filter(|call| matches!(call, MetricCall::Dropped(DropReason::Capacity, _)))
        .count();
    assert_eq!(queued, processed + evicted);
    assert_eq!(log.order().len(), processed);
    assert_eq!(metrics.count(&MetricCall::Queued), queued);
    assert_eq!(
        metrics.calls().iter().filter(|call| matches!(call, MetricCall::Deduplicated(_))).count(),
        deduplicated
    );
    assert_eq!(metrics.last_queue_depth(), Some(0));
    assert_eq!(metrics.last_active_jobs(), Some(0));
}

/// A9. Caps Hold While Work Is Running
#[tokio::test(start_paused = true)]
async fn test_caps_hold_while_running() {
    let (dispatcher, _) = dispatcher(3, 2);
    let log = ExecutionLog::new();

    for n in 0..4 {
        dispatcher.enqueue(log.job(&format!("a{}", n), "email", Duration::from_secs(1)).with_tenant("a")).unwrap();
        dispatcher.enqueue(log.job(&format!("b{}", n), "email", Duration::from_secs(1)).with_tenant("b")).unwrap();
    }
    settle().await;

    let stats = dispatcher.stats();
    assert_eq!(stats.load.active, 3);
    assert_eq!(stats.load.pending, 5);
    assert!(stats.lanes.iter().all(|lane| lane.active <= 2));
    assert_eq!(log.order(), vec!["a0", "b0", "a1"]);

    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();
    assert_eq!(log.order().len(), 8);
}

/// A10. Implicit Lane Shares The Rotation
#[tokio::test(start_paused = true)]
async fn test_implicit_lane_in_rotation() {
    let (dispatcher, _) = dispatcher(1, 1);
    let log = ExecutionLog::new();

    dispatcher.enqueue(log.job("n1", "email", HOLD)).unwrap();
    dispatcher.enqueue(log.job("n2", "email", HOLD)).unwrap();
    dispatcher.enqueue(log.job("t1", "email", HOLD).with_tenant("t")).unwrap();

    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    assert_eq!(log.order(), vec!["n1", "t1", "n2"]);
}

/// A11. Batch Admission On A Multi-Threaded Runtime
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_admission_is_atomic() {
    let dispatcher = Dispatcher::with_metrics(config(1, 1), Arc::new(NoopMetrics)).unwrap();
    let log = ExecutionLog::new();

    let admissions = dispatcher
        .enqueue_batch([
            log.job("A1", "email", HOLD).with_tenant("tenant-a"),
            log.job("A2", "email", HOLD).with_tenant("tenant-a"),
            log.job("B1", "email", HOLD).with_tenant("tenant-b"),
        ])
        .unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    assert!(admissions.iter().all(Admission::is_queued));
    assert_eq!(log.order(), vec!["A1", "B1", "A2"]);
}

/// A12. Separate Enqueues Are Admitted Before Selection On A Multi-Threaded Runtime
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_enqueue_burst_admitted_before_selection_multi_thread() {
    for round in 0..50 {
        let dispatcher = Dispatcher::with_metrics(config(1, 1), Arc::new(NoopMetrics)).unwrap();
        let log = ExecutionLog::new();

        // Arrange: low admitted before high, same tenant, two separate calls
        dispatcher.enqueue(log.job("low", "email", HOLD).with_tenant("x").with_priority(0)).unwrap();
        dispatcher.enqueue(log.job("high", "email", HOLD).with_tenant("x").with_priority(10)).unwrap();

        // Act
        dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

        // Assert
        assert_eq!(log.order(), vec!["high", "low"], "round {}", round);
    }
}

/// A13. A Zero Debounce Still Coalesces Back To Back Enqueues
#[tokio::test(start_paused = true)]
async fn test_zero_debounce_coalesces_over_a_yield() {
    let dispatcher =
        Dispatcher::with_metrics(config(1, 1).with_tick_debounce(Duration::ZERO), Arc::new(NoopMetrics)).unwrap();
    let log = ExecutionLog::new();

    dispatcher.enqueue(log.job("low", "email", HOLD).with_tenant("t").with_priority(1)).unwrap();
    dispatcher.enqueue(log.job("high", "email", HOLD).with_tenant("t").with_priority(9)).unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    assert_eq!(log.order(), vec!["high", "low"]);
}

/// A14. Malformed Jobs Are Rejected Without Side Effects
#[tokio::test]
async fn test_malformed_job_rejected() {
    let (dispatcher, metrics) = dispatcher(1, 1);
    let log = ExecutionLog::new();

    let err = dispatcher.enqueue(log.job("blank", "   ", HOLD)).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidJob(_)));

    let batch = dispatcher.enqueue_batch([
        log.job("ok", "email", HOLD),
        log.job("bad-key", "email", HOLD).with_idempotency_key(""),
    ]);
    assert!(matches!(batch, Err(DispatchError::InvalidJob(_))));

    assert!(metrics.calls().is_empty());
    assert!(dispatcher.load().is_idle());
}

/// A15. Event Stream Follows The Job Lifecycle
#[tokio::test(start_paused = true)]
async fn test_event_stream_lifecycle() {
    let (dispatcher, _) = dispatcher(1, 1);
    let log = ExecutionLog::new();
    let mut events = dispatcher.event_stream();

    dispatcher.enqueue(log.job("only", "push", HOLD).with_tenant("acme")).unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    let mut states = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), events.next()).await {
        assert_eq!(event.job_id().as_str(), "only");
        if let DispatchEvent::Started { attempt, .. } = &event {
            assert_eq!(*attempt, 1);
        }
        states.push(event.state());
    }

    assert_eq!(states, vec![JobState::Queued, JobState::Active, JobState::Completed]);
}

/// A16. Raising Limits Wakes The Scheduler
#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_configure_applies_to_future_selections() {
    let (dispatcher, _) = dispatcher(1, 1);
    let log = ExecutionLog::new();
    for tenant in ["a", "b", "c"] {
        dispatcher.enqueue(log.job(tenant, "email", Duration::from_secs(1)).with_tenant(tenant)).unwrap();
    }
    settle().await;
    assert_eq!(dispatcher.load().active, 1);

    // Zero is rejected and changes nothing
    let err = dispatcher.configure(ConcurrencyLimits::new(0, 1)).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidConfig(_)));
    assert!(dispatcher.configure(ConcurrencyLimits::new(3, 0)).is_err());

    dispatcher.configure(ConcurrencyLimits::new(3, 1)).unwrap();
    settle().await;

    assert_eq!(dispatcher.load().active, 3);
    assert_eq!(dispatcher.stats().limits, ConcurrencyLimits::new(3, 1));
    assert!(logs_contain("Concurrency limits updated"));
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();
}

/// A17. Dropping The Last Handle Drops Pending Work
#[tokio::test(start_paused = true)]
async fn test_last_handle_drop_shuts_down() {
    let (dispatcher, metrics) = dispatcher(1, 1);
    let log = ExecutionLog::new();
    let clone = dispatcher.clone();

    for name in ["running", "waiting-1", "waiting-2"] {
        dispatcher.enqueue(log.job(name, "email", Duration::from_secs(60))).unwrap();
    }
    settle().await;

    drop(dispatcher);
    assert!(!clone.is_shut_down());
    assert_eq!(metrics.count(&MetricCall::Dropped(DropReason::Shutdown, "email".to_string())), 0);

    drop(clone);
    assert_eq!(metrics.count(&MetricCall::Dropped(DropReason::Shutdown, "email".to_string())), 2);
}

/// A18. Shutdown Refuses New Work
#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_shutdown_refuses_new_work() {
    let (dispatcher, metrics) = dispatcher(1, 1);
    let log = ExecutionLog::new();

    dispatcher.enqueue(log.job("running", "email", Duration::from_secs(1))).unwrap();
    dispatcher.enqueue(log.job("pending", "email", HOLD)).unwrap();
    settle().await;

    // Act
    let dropped = dispatcher.shutdown();

    // Assert: running job finishes, pending one never runs
    assert_eq!(dropped, 1);
    assert!(dispatcher.is_shut_down());
    assert_eq!(dispatcher.enqueue(log.job("late", "email", HOLD)).unwrap_err(), DispatchError::ShutDown);

    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();
    assert_eq!(log.order(), vec!["running"]);
    assert_eq!(metrics.count(&MetricCall::Processed), 1);
    assert!(logs_contain("Dispatcher shut down"));
}

/// A19. Construction Validates Configuration
#[tokio::test]
async fn test_construction_validates_config() {
    let err = Dispatcher::new(config(0, 1)).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidConfig(_)));

    let err = Dispatcher::new(config(1, 1).with_max_queue_length(0)).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidConfig(_)));
}

/// A20. Construction Requires A Runtime
#[test]
fn test_construction_outside_runtime_fails() {
    let err = Dispatcher::new(config(1, 1)).unwrap_err();
    assert!(matches!(err, DispatchError::Internal(_)));
}

/// A21. Operations Receive Their Context
#[tokio::test]
async fn test_operation_receives_context() {
    let (dispatcher, metrics) = dispatcher(1, 1);
    let seen = Arc::new(parking_lot::Mutex::new(None));

    let job = {
        let seen = seen.clone();
        Job::from_fn(JobMeta::new("webhook").with_id("hook-7"), move |ctx| {
            let seen = seen.clone();
            async move {
                *seen.lock() = Some((ctx.job_id.to_string(), ctx.job_type, ctx.tenant.to_string(), ctx.attempt));
                Ok(())
            }
        })
        .with_tenant("acme")
    };

    dispatcher.enqueue(job).unwrap();
    dispatcher.await_idle(IDLE_TIMEOUT).await.unwrap();

    assert_eq!(
        seen.lock().clone(),
        Some(("hook-7".to_string(), "webhook".to_string(), "acme".to_string(), 1))
    );
    assert_eq!(metrics.count(&MetricCall::Processed), 1);
}
