//! Job definitions, execution outcomes, and observer hooks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::Schedule;

/// An executable job body.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

struct FnJob<F>(F);

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

/// Wrap a closure as a [`Job`]. The closure is invoked once per firing.
pub fn job_fn<F, Fut>(f: F) -> Arc<dyn Job>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnJob(f))
}

/// Where a scheduled firing executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Every cluster member runs the firing.
    EveryNode,
    /// At most one cluster member runs the firing, enforced via the
    /// distributed lock.
    SingleNode,
}

const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);

/// A registered job: identity, schedule, execution policy, and body.
#[derive(Clone)]
pub struct JobDefinition {
    pub id: String,
    pub schedule: Schedule,
    pub mode: ExecutionMode,
    /// TTL for the single-node lock. Only meaningful in
    /// [`ExecutionMode::SingleNode`]; must exceed the expected run time.
    pub lock_ttl: Duration,
    pub enabled: bool,
    pub(crate) job: Arc<dyn Job>,
}

impl JobDefinition {
    /// A new enabled, every-node job.
    pub fn new(id: impl Into<String>, schedule: Schedule, job: Arc<dyn Job>) -> Self {
        Self {
            id: id.into(),
            schedule,
            mode: ExecutionMode::EveryNode,
            lock_ttl: DEFAULT_LOCK_TTL,
            enabled: true,
            job,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDefinition")
            .field("id", &self.id)
            .field("schedule", &self.schedule)
            .field("mode", &self.mode)
            .field("lock_ttl", &self.lock_ttl)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// How the last firing of a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Failed,
    /// A single-node firing that lost the lock race.
    Skipped,
}

/// Observable snapshot of one job's state. Mutated only by the
/// scheduler after each firing; read-only to everyone else.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub enabled: bool,
    pub schedule: String,
    pub mode: ExecutionMode,
    pub last_fired: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_outcome: Option<JobOutcome>,
    pub next_fire: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub fail_count: u64,
}

impl JobStatus {
    pub(crate) fn new(definition: &JobDefinition) -> Self {
        Self {
            id: definition.id.clone(),
            enabled: definition.enabled,
            schedule: definition.schedule.to_string(),
            mode: definition.mode,
            last_fired: None,
            last_duration_ms: None,
            last_outcome: None,
            next_fire: None,
            run_count: 0,
            fail_count: 0,
        }
    }
}

/// Hooks invoked around each firing.
///
/// All methods default to no-ops; implement the ones you care about.
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn on_start(&self, _job_id: &str) {}
    async fn on_success(&self, _job_id: &str, _duration: Duration) {}
    async fn on_failure(&self, _job_id: &str, _error: &anyhow::Error, _duration: Duration) {}
    /// A single-node firing was skipped because another node holds the
    /// lock.
    async fn on_skipped(&self, _job_id: &str) {}
}

/// Default listener: structured log lines per firing.
pub struct LogListener;

#[async_trait]
impl JobListener for LogListener {
    async fn on_start(&self, job_id: &str) {
        tracing::debug!(job_id = %job_id, "job starting");
    }

    async fn on_success(&self, job_id: &str, duration: Duration) {
        tracing::info!(
            job_id = %job_id,
            duration_ms = duration.as_millis() as u64,
            "job completed"
        );
    }

    async fn on_failure(&self, job_id: &str, error: &anyhow::Error, duration: Duration) {
        tracing::error!(
            job_id = %job_id,
            error = %error,
            duration_ms = duration.as_millis() as u64,
            "job failed"
        );
    }

    async fn on_skipped(&self, job_id: &str) {
        tracing::debug!(job_id = %job_id, "job skipped; lock held by another node");
    }
}
