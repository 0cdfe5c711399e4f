//! The job scheduler: one recurring timer task per registered job.
//!
//! Each enabled job gets an independent tokio task that sleeps until
//! the schedule's next fire time, fires, and repeats. Single-node jobs
//! wrap the firing in a zero-wait distributed lock attempt: losing the
//! race means the firing is skipped on this node and recorded as such,
//! because some other cluster member is running it.
//!
//! Job bodies can fail or panic freely; both are captured per-firing,
//! reported through the listener, and counted; they never take down the
//! timer task or any other job.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use corral_lock::LockManager;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SchedulerOverrides;
use crate::error::SchedulerError;
use crate::job::{ExecutionMode, JobDefinition, JobListener, JobOutcome, JobStatus, LogListener};

/// Poll interval passed to `try_lock`; irrelevant for the zero-wait
/// attempts the scheduler makes, but required by the signature.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

struct JobEntry {
    definition: JobDefinition,
    status: Mutex<JobStatus>,
}

struct SchedulerInner {
    jobs: HashMap<String, Arc<JobEntry>>,
    lock_manager: Option<Arc<LockManager>>,
    listener: Arc<dyn JobListener>,
    enabled: bool,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

/// Builder for [`JobScheduler`]. Jobs are registered programmatically;
/// overrides from external configuration are applied at build time.
pub struct JobSchedulerBuilder {
    jobs: Vec<JobDefinition>,
    lock_manager: Option<Arc<LockManager>>,
    listener: Option<Arc<dyn JobListener>>,
    overrides: SchedulerOverrides,
}

impl JobSchedulerBuilder {
    pub fn job(mut self, definition: JobDefinition) -> Self {
        self.jobs.push(definition);
        self
    }

    pub fn lock_manager(mut self, lock_manager: Arc<LockManager>) -> Self {
        self.lock_manager = Some(lock_manager);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn overrides(mut self, overrides: SchedulerOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Validate and assemble the scheduler.
    ///
    /// Fails fast on duplicate job ids, on invalid override cron
    /// expressions, and on any enabled single-node job when no lock
    /// manager was supplied, since silently degrading to per-node execution
    /// would break the single-execution guarantee.
    pub fn build(self) -> Result<JobScheduler, SchedulerError> {
        let overrides_by_id: HashMap<&str, &crate::config::JobOverride> = self
            .overrides
            .jobs
            .iter()
            .map(|o| (o.id.as_str(), o))
            .collect();

        let mut jobs: HashMap<String, Arc<JobEntry>> = HashMap::new();
        for definition in self.jobs {
            let definition = match overrides_by_id.get(definition.id.as_str()) {
                Some(over) => over.apply(definition)?,
                None => definition,
            };

            if self.overrides.enabled
                && definition.enabled
                && definition.mode == ExecutionMode::SingleNode
                && self.lock_manager.is_none()
            {
                return Err(SchedulerError::MissingLockManager(definition.id));
            }

            let status = Mutex::new(JobStatus::new(&definition));
            let id = definition.id.clone();
            if jobs
                .insert(id.clone(), Arc::new(JobEntry { definition, status }))
                .is_some()
            {
                return Err(SchedulerError::DuplicateJob(id));
            }
        }

        let (shutdown, _) = watch::channel(false);
        Ok(JobScheduler {
            inner: Arc::new(SchedulerInner {
                jobs,
                lock_manager: self.lock_manager,
                listener: self
                    .listener
                    .unwrap_or_else(|| Arc::new(LogListener)),
                enabled: self.overrides.enabled,
                shutdown,
                tasks: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        })
    }
}

/// Drives registered jobs on their schedules.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    pub fn builder() -> JobSchedulerBuilder {
        JobSchedulerBuilder {
            jobs: Vec::new(),
            lock_manager: None,
            listener: None,
            overrides: SchedulerOverrides::default(),
        }
    }

    /// Spawn one timer task per enabled job. Idempotent; only the
    /// first call starts anything.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("scheduler already started");
            return;
        }

        if !self.inner.enabled {
            tracing::info!("scheduler disabled by configuration; no jobs will run");
            return;
        }

        let mut tasks = self.inner.tasks.lock();
        for entry in self.inner.jobs.values() {
            if !entry.definition.enabled {
                tracing::debug!(job_id = %entry.definition.id, "job disabled, no timer");
                continue;
            }

            let inner = Arc::clone(&self.inner);
            let entry = Arc::clone(entry);
            let shutdown = self.inner.shutdown.subscribe();
            tasks.push(tokio::spawn(run_loop(inner, entry, shutdown)));
        }

        tracing::info!(jobs = tasks.len(), "scheduler started");
    }

    /// Fire a job immediately, out of band.
    ///
    /// Ignores the job's `enabled` flag but still honors single-node
    /// lock coordination. The firing runs on the caller's task.
    pub async fn trigger(&self, job_id: &str) -> Result<(), SchedulerError> {
        let entry = self
            .inner
            .jobs
            .get(job_id)
            .ok_or_else(|| SchedulerError::UnknownJob(job_id.to_string()))?;

        tracing::debug!(job_id = %job_id, "manual trigger");
        fire(&self.inner, entry).await;
        Ok(())
    }

    /// Stop scheduling and wind down.
    ///
    /// New firings stop immediately. In-flight executions get `grace`
    /// to finish; whatever is still running afterwards is aborted.
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!(grace_ms = grace.as_millis() as u64, "scheduler shutting down");
        let _ = self.inner.shutdown.send(true);

        let handles: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        let abort_handles: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        if tokio::time::timeout(grace, futures_util::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!("grace period elapsed; aborting in-flight jobs");
            for handle in abort_handles {
                handle.abort();
            }
        }
    }

    /// Immutable snapshot of every job's status, sorted by id.
    pub fn snapshot(&self) -> Vec<JobStatus> {
        let mut statuses: Vec<JobStatus> = self
            .inner
            .jobs
            .values()
            .map(|entry| entry.status.lock().clone())
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }
}

/// Timer loop for one job: sleep until the next fire time, fire, repeat.
async fn run_loop(
    inner: Arc<SchedulerInner>,
    entry: Arc<JobEntry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let job_id = entry.definition.id.clone();
    let mut last_planned: Option<DateTime<Utc>> = None;

    tracing::debug!(job_id = %job_id, schedule = %entry.definition.schedule, "job timer started");

    loop {
        let now = Utc::now();
        let Some(next) = entry.definition.schedule.next_fire(now, last_planned) else {
            tracing::warn!(job_id = %job_id, "schedule yields no further fire times; timer stopping");
            break;
        };

        entry.status.lock().next_fire = Some(next);
        let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!(job_id = %job_id, "job timer stopped");
                    break;
                }
            }
            _ = tokio::time::sleep(delay) => {
                last_planned = Some(next);
                fire(&inner, &entry).await;
            }
        }
    }
}

/// One firing: resolve the execution mode, run or skip, record.
async fn fire(inner: &Arc<SchedulerInner>, entry: &Arc<JobEntry>) {
    let definition = &entry.definition;
    let fired_at = Utc::now();

    match definition.mode {
        ExecutionMode::EveryNode => {
            execute_and_record(inner, entry, fired_at).await;
        }
        ExecutionMode::SingleNode => {
            let Some(lock_manager) = &inner.lock_manager else {
                // Only reachable through `trigger` on a disabled job;
                // enabled single-node jobs cannot be built without a
                // lock manager.
                record_failure_without_run(
                    inner,
                    entry,
                    fired_at,
                    anyhow::anyhow!("no lock manager configured"),
                )
                .await;
                return;
            };

            let lock_key = format!("job:{}", definition.id);
            match lock_manager
                .try_lock(&lock_key, definition.lock_ttl, Duration::ZERO, LOCK_RETRY_INTERVAL)
                .await
            {
                Ok(Some(lock)) => {
                    execute_and_record(inner, entry, fired_at).await;
                    if let Err(e) = lock.release().await {
                        tracing::warn!(job_id = %definition.id, error = %e, "failed to release job lock");
                    }
                }
                Ok(None) => {
                    tracing::debug!(job_id = %definition.id, "firing skipped; lock held elsewhere");
                    {
                        let mut status = entry.status.lock();
                        status.last_fired = Some(fired_at);
                        status.last_outcome = Some(JobOutcome::Skipped);
                    }
                    inner.listener.on_skipped(&definition.id).await;
                }
                Err(e) => {
                    record_failure_without_run(inner, entry, fired_at, anyhow::Error::new(e)).await;
                }
            }
        }
    }
}

/// Run the body, capturing `Err` and panics alike, and record the outcome.
async fn execute_and_record(
    inner: &Arc<SchedulerInner>,
    entry: &Arc<JobEntry>,
    fired_at: DateTime<Utc>,
) {
    let definition = &entry.definition;
    inner.listener.on_start(&definition.id).await;

    let started = Instant::now();
    let result = AssertUnwindSafe(definition.job.run()).catch_unwind().await;
    let duration = started.elapsed();

    let result = match result {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "job panicked: {}",
            panic_message(panic.as_ref())
        )),
    };

    let outcome = if result.is_ok() {
        JobOutcome::Success
    } else {
        JobOutcome::Failed
    };

    {
        let mut status = entry.status.lock();
        status.last_fired = Some(fired_at);
        status.last_duration_ms = Some(duration.as_millis() as u64);
        status.last_outcome = Some(outcome);
        status.run_count += 1;
        if outcome == JobOutcome::Failed {
            status.fail_count += 1;
        }
    }

    match result {
        Ok(()) => {
            inner.listener.on_success(&definition.id, duration).await;
        }
        Err(error) => {
            tracing::error!(job_id = %definition.id, error = %error, "job execution failed");
            inner.listener.on_failure(&definition.id, &error, duration).await;
        }
    }
}

/// Record a firing that failed before the body could run (lock
/// infrastructure trouble, missing lock manager).
async fn record_failure_without_run(
    inner: &Arc<SchedulerInner>,
    entry: &Arc<JobEntry>,
    fired_at: DateTime<Utc>,
    error: anyhow::Error,
) {
    tracing::error!(job_id = %entry.definition.id, error = %error, "firing failed before execution");
    {
        let mut status = entry.status.lock();
        status.last_fired = Some(fired_at);
        status.last_outcome = Some(JobOutcome::Failed);
        status.fail_count += 1;
    }
    inner
        .listener
        .on_failure(&entry.definition.id, &error, Duration::ZERO)
        .await;
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
