//! Shared Redis plumbing for the corral crates.
//!
//! Every corral subsystem (cache, lock, scheduler) talks to the same Redis
//! deployment through a [`deadpool_redis::Pool`]. This crate owns the
//! configuration surface and pool construction so the other crates only
//! deal with an already-built pool.

pub mod config;
pub mod error;

pub use config::{RedisConfig, create_pool};
pub use error::CoreError;
