//! Redis connection configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::CoreError;

/// Redis connection settings shared by all corral subsystems.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Timeout for creating or waiting on a pooled connection, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Build a Redis connection pool from the given configuration.
///
/// The pool is safe for concurrent use from many tasks; corral never
/// holds a connection across an in-process critical section.
pub fn create_pool(config: &RedisConfig) -> Result<deadpool_redis::Pool, CoreError> {
    if config.pool_size == 0 {
        return Err(CoreError::InvalidConfig(
            "pool_size must be at least 1".to_string(),
        ));
    }

    tracing::info!(url = %config.url, pool_size = config.pool_size, "Creating Redis pool");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    let timeout = Duration::from_millis(config.timeout_ms);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    redis_config.pool = Some(pool_config);

    redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| CoreError::PoolCreation(e.to_string()))
}
