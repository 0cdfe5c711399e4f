//! Recurring job scheduling with cluster-wide single-node execution.
//!
//! Jobs are registered programmatically with a cron or fixed-interval
//! schedule and run on independent timer tasks. A job in single-node
//! mode additionally coordinates through a [`corral_lock::LockManager`]:
//! every node's timer fires, but only the node that wins the zero-wait
//! lock attempt executes the body; the rest record a skip.
//!
//! ```text
//! idle → firing → (running | skipped) → idle          (per job, per node)
//!                     │
//!                     └─ single-node: SET NX on job:<id> decides who runs
//! ```
//!
//! Per-job-id overrides from external configuration (schedule, mode,
//! lock TTL, enabled) are applied at build time, and a scheduler built
//! with an enabled single-node job but no lock manager refuses to
//! build at all.

pub mod config;
pub mod error;
pub mod job;
pub mod schedule;
pub mod scheduler;

pub use config::{JobOverride, SchedulerOverrides};
pub use error::SchedulerError;
pub use job::{
    ExecutionMode, Job, JobDefinition, JobListener, JobOutcome, JobStatus, LogListener, job_fn,
};
pub use schedule::Schedule;
pub use scheduler::{JobScheduler, JobSchedulerBuilder};
