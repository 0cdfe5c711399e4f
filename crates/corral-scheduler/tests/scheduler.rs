//! Behavioral tests for the scheduler that need no Redis: timer
//! cadence, failure containment, manual triggering, override merging,
//! build-time validation, and shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use corral_scheduler::{
    ExecutionMode, JobDefinition, JobListener, JobOutcome, JobScheduler, Schedule, SchedulerError,
    SchedulerOverrides, job_fn,
};

/// Listener counting notifications per kind.
#[derive(Default)]
struct CountingListener {
    started: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

#[async_trait]
impl JobListener for CountingListener {
    async fn on_start(&self, _job_id: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    async fn on_success(&self, _job_id: &str, _duration: Duration) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }
    async fn on_failure(&self, _job_id: &str, _error: &anyhow::Error, _duration: Duration) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    async fn on_skipped(&self, _job_id: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_job(counter: &Arc<AtomicUsize>) -> Arc<dyn corral_scheduler::Job> {
    let counter = Arc::clone(counter);
    job_fn(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test]
async fn fixed_rate_job_fires_repeatedly() {
    let runs = Arc::new(AtomicUsize::new(0));
    let listener = Arc::new(CountingListener::default());

    let scheduler = JobScheduler::builder()
        .job(JobDefinition::new(
            "ticker",
            Schedule::fixed(Duration::from_millis(50), Duration::ZERO),
            counting_job(&runs),
        ))
        .listener(listener.clone())
        .build()
        .unwrap();

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(320)).await;
    scheduler.shutdown(Duration::from_secs(1)).await;

    let total = runs.load(Ordering::SeqCst);
    assert!(total >= 3, "expected several firings, got {total}");
    assert_eq!(listener.succeeded.load(Ordering::SeqCst), total);
    assert_eq!(listener.failed.load(Ordering::SeqCst), 0);

    let statuses = scheduler.snapshot();
    assert_eq!(statuses.len(), 1);
    let status = &statuses[0];
    assert_eq!(status.id, "ticker");
    assert_eq!(status.run_count, total as u64);
    assert_eq!(status.fail_count, 0);
    assert_eq!(status.last_outcome, Some(JobOutcome::Success));
    assert!(status.last_fired.is_some());
    assert!(status.next_fire.is_some());
}

#[tokio::test]
async fn failing_job_is_counted_and_contained() {
    let healthy_runs = Arc::new(AtomicUsize::new(0));

    let scheduler = JobScheduler::builder()
        .job(JobDefinition::new(
            "doomed",
            Schedule::fixed(Duration::from_millis(50), Duration::ZERO),
            job_fn(|| async { Err(anyhow::anyhow!("boom")) }),
        ))
        .job(JobDefinition::new(
            "healthy",
            Schedule::fixed(Duration::from_millis(50), Duration::ZERO),
            counting_job(&healthy_runs),
        ))
        .build()
        .unwrap();

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(250)).await;
    scheduler.shutdown(Duration::from_secs(1)).await;

    let statuses = scheduler.snapshot();
    let doomed = statuses.iter().find(|s| s.id == "doomed").unwrap();
    assert!(doomed.fail_count >= 1);
    assert_eq!(doomed.fail_count, doomed.run_count);
    assert_eq!(doomed.last_outcome, Some(JobOutcome::Failed));

    // A broken neighbor never stops a healthy job.
    assert!(healthy_runs.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn panicking_job_is_captured_as_failure() {
    let scheduler = JobScheduler::builder()
        .job(JobDefinition::new(
            "panicky",
            Schedule::fixed(Duration::from_millis(50), Duration::ZERO),
            job_fn(|| async { panic!("unhinged") }),
        ))
        .build()
        .unwrap();

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.shutdown(Duration::from_secs(1)).await;

    let statuses = scheduler.snapshot();
    assert!(statuses[0].fail_count >= 1);
    assert_eq!(statuses[0].last_outcome, Some(JobOutcome::Failed));
}

#[tokio::test]
async fn trigger_runs_disabled_job_once() {
    let runs = Arc::new(AtomicUsize::new(0));

    let scheduler = JobScheduler::builder()
        .job(
            JobDefinition::new(
                "manual",
                Schedule::fixed(Duration::from_secs(3600), Duration::from_secs(3600)),
                counting_job(&runs),
            )
            .with_enabled(false),
        )
        .build()
        .unwrap();

    scheduler.start();
    scheduler.trigger("manual").await.unwrap();
    scheduler.shutdown(Duration::from_secs(1)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let statuses = scheduler.snapshot();
    assert_eq!(statuses[0].run_count, 1);
    assert_eq!(statuses[0].last_outcome, Some(JobOutcome::Success));
}

#[tokio::test]
async fn trigger_unknown_job_fails() {
    let scheduler = JobScheduler::builder().build().unwrap();
    match scheduler.trigger("ghost").await {
        Err(SchedulerError::UnknownJob(id)) => assert_eq!(id, "ghost"),
        other => panic!("expected UnknownJob, got {other:?}"),
    }
}

#[tokio::test]
async fn build_rejects_enabled_single_node_job_without_lock_manager() {
    let result = JobScheduler::builder()
        .job(
            JobDefinition::new(
                "cluster-wide",
                Schedule::fixed(Duration::from_secs(60), Duration::ZERO),
                job_fn(|| async { Ok(()) }),
            )
            .with_mode(ExecutionMode::SingleNode),
        )
        .build();

    match result {
        Err(SchedulerError::MissingLockManager(id)) => assert_eq!(id, "cluster-wide"),
        other => panic!("expected MissingLockManager, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn build_allows_disabled_single_node_job_without_lock_manager() {
    JobScheduler::builder()
        .job(
            JobDefinition::new(
                "dormant",
                Schedule::fixed(Duration::from_secs(60), Duration::ZERO),
                job_fn(|| async { Ok(()) }),
            )
            .with_mode(ExecutionMode::SingleNode)
            .with_enabled(false),
        )
        .build()
        .unwrap();
}

#[tokio::test]
async fn build_rejects_duplicate_job_ids() {
    let result = JobScheduler::builder()
        .job(JobDefinition::new(
            "twin",
            Schedule::fixed(Duration::from_secs(60), Duration::ZERO),
            job_fn(|| async { Ok(()) }),
        ))
        .job(JobDefinition::new(
            "twin",
            Schedule::fixed(Duration::from_secs(60), Duration::ZERO),
            job_fn(|| async { Ok(()) }),
        ))
        .build();

    match result {
        Err(SchedulerError::DuplicateJob(id)) => assert_eq!(id, "twin"),
        other => panic!("expected DuplicateJob, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn cron_override_replaces_compiled_in_fixed_rate() {
    let overrides: SchedulerOverrides = serde_json::from_str(
        r#"{"jobs": [{"id": "x", "cron": "0 * * * *"}]}"#,
    )
    .unwrap();

    let scheduler = JobScheduler::builder()
        .job(JobDefinition::new(
            "x",
            Schedule::fixed(Duration::from_millis(1000), Duration::ZERO),
            job_fn(|| async { Ok(()) }),
        ))
        .overrides(overrides)
        .build()
        .unwrap();

    let statuses = scheduler.snapshot();
    assert_eq!(statuses[0].schedule, "cron(0 * * * *)");
}

#[tokio::test]
async fn globally_disabled_scheduler_runs_nothing() {
    let runs = Arc::new(AtomicUsize::new(0));
    let overrides: SchedulerOverrides = serde_json::from_str(r#"{"enabled": false}"#).unwrap();

    let scheduler = JobScheduler::builder()
        .job(JobDefinition::new(
            "idle",
            Schedule::fixed(Duration::from_millis(30), Duration::ZERO),
            counting_job(&runs),
        ))
        .overrides(overrides)
        .build()
        .unwrap();

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.shutdown(Duration::from_secs(1)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn shutdown_aborts_jobs_that_outlive_the_grace_period() {
    let scheduler = JobScheduler::builder()
        .job(JobDefinition::new(
            "sleeper",
            Schedule::fixed(Duration::from_millis(10), Duration::ZERO),
            job_fn(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }),
        ))
        .build()
        .unwrap();

    scheduler.start();
    // Let the first firing get stuck in its sleep.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    scheduler.shutdown(Duration::from_millis(200)).await;
    assert!(started.elapsed() < Duration::from_secs(5));
}
