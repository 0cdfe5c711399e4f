use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by cache operations.
///
/// The enum is `Clone` because a single failed load is shared with every
/// caller collapsed into the same single-flight slot. Redis errors are
/// carried as rendered strings for that reason; loader failures keep the
/// original error behind an `Arc` so callers can still walk the chain.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache not configured: {0}")]
    UnknownCache(String),

    #[error("Redis connection unavailable: {0}")]
    Pool(String),

    #[error("Redis command failed: {0}")]
    Redis(String),

    #[error("Failed to encode cache value: {0}")]
    Encode(String),

    #[error("Cache loader failed: {0}")]
    Loader(Arc<anyhow::Error>),
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        CacheError::Pool(e.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Redis(e.to_string())
    }
}
