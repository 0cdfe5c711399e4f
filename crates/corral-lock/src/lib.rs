//! Distributed mutual-exclusion locks over Redis.
//!
//! A lock is a Redis key created with `SET NX PX` and owned by whoever
//! holds its random token; release is a token-checked compare-and-delete
//! so stale holders cannot free a lock that was re-acquired after their
//! TTL lapsed. There is deliberately no lease renewal: the TTL bounds
//! the blast radius of a crashed holder, and choosing it larger than the
//! critical section is the caller's responsibility.

pub mod error;
pub mod manager;

pub use error::LockError;
pub use manager::{DEFAULT_LOCK_PREFIX, LockManager, RedisLock};
