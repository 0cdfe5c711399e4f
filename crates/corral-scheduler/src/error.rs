use thiserror::Error;

/// Errors raised while building or driving the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Duplicate job id: {0}")]
    DuplicateJob(String),

    #[error("Invalid cron expression {expression:?}: {message}")]
    InvalidCron { expression: String, message: String },

    #[error(
        "Job {0} runs in single-node mode but no lock manager is configured; \
         refusing to start without the single-execution guarantee"
    )]
    MissingLockManager(String),
}
