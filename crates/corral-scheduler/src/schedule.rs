//! Fire-time computation for job schedules.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use croner::Cron;

use crate::error::SchedulerError;

/// When a job fires: a standard 5-field cron expression, or a fixed
/// interval after an initial delay. Exactly one of the two.
#[derive(Clone)]
pub enum Schedule {
    Cron { cron: Cron, expression: String },
    Fixed {
        interval: Duration,
        initial_delay: Duration,
    },
}

impl Schedule {
    /// Parse a standard 5-field cron expression (minute granularity).
    pub fn cron(expression: &str) -> Result<Self, SchedulerError> {
        let cron = Cron::new(expression)
            .parse()
            .map_err(|e| SchedulerError::InvalidCron {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;
        Ok(Schedule::Cron {
            cron,
            expression: expression.to_string(),
        })
    }

    /// Fire every `interval`, the first time after `initial_delay`.
    pub fn fixed(interval: Duration, initial_delay: Duration) -> Self {
        Schedule::Fixed {
            interval,
            initial_delay,
        }
    }

    /// Compute the next fire time.
    ///
    /// Cron schedules return the next matching minute boundary strictly
    /// after `now`. Fixed schedules advance from the previous planned
    /// fire (`last`), which keeps the cadence steady even when a run
    /// overshoots its slot; the very first fire is `now + initial_delay`.
    pub fn next_fire(
        &self,
        now: DateTime<Utc>,
        last: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Cron { cron, .. } => cron.find_next_occurrence(&now, false).ok(),
            Schedule::Fixed {
                interval,
                initial_delay,
            } => {
                let step = |d: Duration| chrono::Duration::from_std(d).ok();
                match last {
                    Some(last) => Some(last + step(*interval)?),
                    None => Some(now + step(*initial_delay)?),
                }
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Cron { expression, .. } => write!(f, "cron({expression})"),
            Schedule::Fixed {
                interval,
                initial_delay,
            } => write!(
                f,
                "every {}ms after {}ms",
                interval.as_millis(),
                initial_delay.as_millis()
            ),
        }
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
