//! L2 tier: thin adapter over the shared Redis pool.
//!
//! Keys are namespaced as `<prefix><cache-name>:<key>` so several caches
//! (and other corral subsystems) can share one Redis database. `clear()`
//! walks the namespace with cursor-based `SCAN` and deletes matches in
//! pipelined batches; the `KEYS`-based fast path blocks Redis on large
//! keyspaces and is only taken when the cache config opted in.

use std::time::Duration;

use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::CacheError;

const SCAN_BATCH: usize = 200;

pub(crate) struct L2Backing {
    pub(crate) pool: Pool,
    /// Full key prefix for this cache, e.g. `corral:users:`.
    pub(crate) namespace: String,
}

impl L2Backing {
    pub(crate) fn new(pool: Pool, prefix: &str, cache_name: &str) -> Self {
        Self {
            pool,
            namespace: format!("{prefix}{cache_name}:"),
        }
    }

    pub(crate) fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.pool.get().await?;
        let data: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
        Ok(data)
    }

    pub(crate) async fn set(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let ttl_ms = ttl.as_millis().max(1) as u64;
        conn.pset_ex::<_, _, ()>(self.full_key(key), bytes, ttl_ms)
            .await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(self.full_key(key)).await?;
        Ok(())
    }

    /// Remove every key under this cache's namespace.
    ///
    /// Returns the number of keys deleted.
    pub(crate) async fn clear(&self, allow_unscanned: bool) -> Result<u64, CacheError> {
        if allow_unscanned {
            self.clear_with_keys().await
        } else {
            self.clear_with_scan().await
        }
    }

    async fn clear_with_scan(&self) -> Result<u64, CacheError> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}*", self.namespace);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await?;

            if !keys.is_empty() {
                removed += keys.len() as u64;
                let mut pipe = redis::pipe();
                for key in &keys {
                    pipe.del(key).ignore();
                }
                pipe.query_async::<()>(&mut *conn).await?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        tracing::debug!(namespace = %self.namespace, removed, "cache cleared (scan)");
        Ok(removed)
    }

    async fn clear_with_keys(&self) -> Result<u64, CacheError> {
        tracing::warn!(
            namespace = %self.namespace,
            "clearing cache via full KEYS listing; this blocks Redis on large keyspaces"
        );

        let mut conn = self.pool.get().await?;
        let pattern = format!("{}*", self.namespace);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut *conn)
            .await?;

        let removed = keys.len() as u64;
        for chunk in keys.chunks(SCAN_BATCH) {
            let mut pipe = redis::pipe();
            for key in chunk {
                pipe.del(key).ignore();
            }
            pipe.query_async::<()>(&mut *conn).await?;
        }

        Ok(removed)
    }
}
