//! Two-level caching with single-flight load collapsing.
//!
//! ## Architecture
//!
//! - **L1 (in-process)**: bounded map with per-entry TTL, microsecond reads
//! - **L2 (Redis)**: shared across instances, source of truth for the cache
//! - **Single-flight**: concurrent loads for one key collapse into one loader run
//! - **Pub/Sub**: cross-instance L1 eviction on delete
//!
//! ```text
//! get_or_put(key) → L1 → L2 (Redis) → loader (collapsed)
//!                    ↓        ↓            ↓
//!                  <1µs     ~5ms       whatever it costs, once
//! ```
//!
//! Caches are declared by name up front and obtained from the
//! [`CacheManager`]; each (name, value type) pairing gets one lazily
//! built [`TwoLevelCache`]. Values travel to Redis behind a tagged wire
//! header that distinguishes a cached "confirmed absent" from a cached
//! value and from bytes that were never ours; the latter two decode
//! failures degrade to misses rather than errors.

pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod manager;
pub mod pubsub;

mod l1;
mod l2;
mod wire;

pub use cache::{CacheStats, CacheValue, TwoLevelCache};
pub use config::{CacheConfig, CodecKind};
pub use error::CacheError;
pub use keys::{KeyPart, hashed_key};
pub use manager::{CacheManager, DEFAULT_KEY_PREFIX};
pub use pubsub::CacheInvalidationListener;
