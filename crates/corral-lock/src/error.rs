use thiserror::Error;

/// Errors raised by lock acquisition and release.
#[derive(Debug, Error)]
pub enum LockError {
    /// Someone else holds the lock. Distinct from infrastructure
    /// failures so callers can translate it into a conflict/busy
    /// response instead of a 500.
    #[error("Lock not acquired: {0}")]
    NotAcquired(String),

    #[error("Lock TTL must be positive")]
    InvalidTtl,

    #[error("Redis connection unavailable: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
}
