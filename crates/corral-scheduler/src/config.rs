//! Load-time overrides applied to compiled-in job definitions.
//!
//! Deployments tune jobs without recompiling: an external configuration
//! map keyed by job id can replace a job's schedule, execution mode,
//! lock TTL, or enabled flag. Unset fields keep the compiled-in value;
//! a cron override beats a fixed-rate override when both are present.

use std::time::Duration;

use serde::Deserialize;

use crate::error::SchedulerError;
use crate::job::{ExecutionMode, JobDefinition};
use crate::schedule::Schedule;

/// Scheduler-wide settings plus per-job overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerOverrides {
    /// Master switch; `false` disables every job.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub jobs: Vec<JobOverride>,
}

fn default_enabled() -> bool {
    true
}

impl Default for SchedulerOverrides {
    fn default() -> Self {
        Self {
            enabled: true,
            jobs: Vec::new(),
        }
    }
}

/// Overrides for one job, matched by id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobOverride {
    pub id: String,

    /// Replacement cron expression. Wins over `fixed_rate_ms`.
    #[serde(default)]
    pub cron: Option<String>,

    /// Replacement fixed-rate interval in milliseconds.
    #[serde(default)]
    pub fixed_rate_ms: Option<u64>,

    /// Initial delay for a fixed-rate override, in milliseconds.
    #[serde(default)]
    pub initial_delay_ms: Option<u64>,

    #[serde(default)]
    pub mode: Option<ExecutionMode>,

    #[serde(default)]
    pub lock_ttl_ms: Option<u64>,

    #[serde(default)]
    pub enabled: Option<bool>,
}

impl JobOverride {
    /// Apply this override to a compiled-in definition.
    pub(crate) fn apply(&self, mut definition: JobDefinition) -> Result<JobDefinition, SchedulerError> {
        if let Some(expression) = &self.cron {
            definition.schedule = Schedule::cron(expression)?;
        } else if let Some(rate_ms) = self.fixed_rate_ms {
            definition.schedule = Schedule::fixed(
                Duration::from_millis(rate_ms),
                Duration::from_millis(self.initial_delay_ms.unwrap_or(0)),
            );
        }

        if let Some(mode) = self.mode {
            definition.mode = mode;
        }
        if let Some(lock_ttl_ms) = self.lock_ttl_ms {
            definition.lock_ttl = Duration::from_millis(lock_ttl_ms);
        }
        if let Some(enabled) = self.enabled {
            definition.enabled = enabled;
        }

        Ok(definition)
    }
}
