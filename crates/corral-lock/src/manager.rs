//! Distributed mutual-exclusion locks backed by Redis.
//!
//! Acquisition is a single `SET key token NX PX ttl`: the key comes
//! into existence only if nobody holds it, and it expires on its own if
//! the holder crashes. The TTL is the entire failure story; there is
//! no heartbeat or lease renewal. Release runs a token-checked
//! compare-and-delete script so a holder whose TTL silently lapsed (and
//! whose key was re-acquired by someone else) cannot delete the new
//! holder's lock.

use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::Pool;
use rand::RngCore;
use tokio::time::Instant;

use crate::error::LockError;

/// Compare-and-delete: remove the key only if it still stores our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Default Redis key prefix for lock entries.
pub const DEFAULT_LOCK_PREFIX: &str = "corral:lock:";

/// Acquires and releases distributed locks under a key prefix.
#[derive(Clone)]
pub struct LockManager {
    pool: Pool,
    prefix: String,
    release_script: Arc<redis::Script>,
}

impl LockManager {
    pub fn new(pool: Pool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            // The script SHA is cached after first load; on NOSCRIPT
            // (e.g. after a Redis restart) the full body is re-sent.
            release_script: Arc::new(redis::Script::new(RELEASE_SCRIPT)),
        }
    }

    /// Try to acquire the lock for `key`.
    ///
    /// Returns `Ok(None)` when the lock is held elsewhere and the
    /// `wait` budget ran out. With `wait == 0` a contended attempt
    /// returns immediately. A positive `wait` re-tries the conditional
    /// set every `retry_interval`, sleeping between attempts, until
    /// success or the deadline.
    ///
    /// `ttl` bounds how long a crashed holder can wedge the lock;
    /// callers must pick it safely above their critical-section
    /// duration.
    pub async fn try_lock(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
        retry_interval: Duration,
    ) -> Result<Option<RedisLock>, LockError> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }

        let full_key = format!("{}{}", self.prefix, key);
        let token = new_token();
        let deadline = Instant::now() + wait;

        loop {
            if self.acquire(&full_key, &token, ttl).await? {
                tracing::debug!(key = %full_key, "lock acquired");
                return Ok(Some(RedisLock {
                    pool: self.pool.clone(),
                    release_script: self.release_script.clone(),
                    key: full_key,
                    token,
                }));
            }

            if Instant::now() >= deadline {
                tracing::debug!(key = %full_key, "lock contended, giving up");
                return Ok(None);
            }

            tokio::time::sleep(retry_interval).await;
        }
    }

    /// Run `body` while holding the lock for `key`.
    ///
    /// Fails with [`LockError::NotAcquired`] when the lock cannot be
    /// obtained within `wait`. The lock is released after `body`
    /// settles, whatever it returns.
    pub async fn with_lock<T, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
        retry_interval: Duration,
        body: Fut,
    ) -> Result<T, LockError>
    where
        Fut: Future<Output = T>,
    {
        let lock = self
            .try_lock(key, ttl, wait, retry_interval)
            .await?
            .ok_or_else(|| LockError::NotAcquired(key.to_string()))?;

        let result = body.await;

        if let Err(e) = lock.release().await {
            tracing::warn!(key = %key, error = %e, "failed to release lock");
        }

        Ok(result)
    }

    async fn acquire(&self, full_key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.pool.get().await?;
        let response: Option<String> = redis::cmd("SET")
            .arg(full_key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut *conn)
            .await?;
        Ok(response.is_some())
    }
}

/// A held lock. Dropping it does **not** release the lock; the TTL
/// does that eventually; call [`release`](Self::release) when done.
#[derive(Debug)]
pub struct RedisLock {
    pool: Pool,
    release_script: Arc<redis::Script>,
    key: String,
    token: String,
}

impl RedisLock {
    /// The full namespaced Redis key of this lock.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock if we still own it.
    ///
    /// Returns `true` when the key was deleted, `false` when it had
    /// already expired or was re-acquired under a different token.
    pub async fn release(&self) -> Result<bool, LockError> {
        let mut conn = self.pool.get().await?;
        let deleted: i64 = self
            .release_script
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut *conn)
            .await?;

        if deleted == 1 {
            tracing::debug!(key = %self.key, "lock released");
        } else {
            tracing::debug!(key = %self.key, "lock not released; token no longer current");
        }
        Ok(deleted == 1)
    }
}

/// A fresh 16-byte token, hex-rendered. Never reused across
/// acquisitions; ownership of a lock is exactly equality with this
/// value.
fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
