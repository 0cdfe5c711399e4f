//! Redis Pub/Sub for cross-instance L1 eviction.
//!
//! `delete()` publishes the full namespaced key on a shared channel;
//! every other instance's listener removes that key from its own L1 so
//! local tiers converge without waiting for TTL expiry.

use std::time::Duration;

use deadpool_redis::Pool;
use futures_util::StreamExt;
use redis::AsyncCommands;

use crate::error::CacheError;
use crate::manager::CacheManager;

pub(crate) const INVALIDATION_CHANNEL: &str = "corral:cache:invalidate";

/// Publish an invalidation for a full namespaced key.
pub(crate) async fn publish_invalidation(pool: &Pool, full_key: &str) -> Result<(), CacheError> {
    let mut conn = pool.get().await?;
    conn.publish::<_, _, ()>(INVALIDATION_CHANNEL, full_key)
        .await?;
    tracing::debug!(key = %full_key, "published cache invalidation");
    Ok(())
}

/// Background listener evicting L1 entries named by invalidation events.
///
/// Reconnects with exponential backoff if the Pub/Sub connection drops.
/// Pub/Sub needs a dedicated connection, so the listener takes the Redis
/// URL rather than the shared pool.
pub struct CacheInvalidationListener {
    pub redis_url: String,
    pub manager: CacheManager,
}

impl CacheInvalidationListener {
    /// Spawn the listener loop in a background task.
    pub fn start(self) {
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            const MAX_BACKOFF: Duration = Duration::from_secs(300);

            loop {
                match self.run().await {
                    Ok(()) => {
                        backoff = Duration::from_secs(1);
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "cache invalidation listener error, reconnecting..."
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        });
    }

    async fn run(&self) -> Result<(), String> {
        let client = redis::Client::open(self.redis_url.clone())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;

        pubsub
            .subscribe(INVALIDATION_CHANNEL)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = INVALIDATION_CHANNEL, "subscribed to cache invalidation");

        let mut stream = pubsub.on_message();
        loop {
            match stream.next().await {
                Some(msg) => {
                    if let Ok(full_key) = msg.get_payload::<String>() {
                        tracing::debug!(key = %full_key, "received cache invalidation");
                        self.manager.evict_local(&full_key);
                    } else {
                        tracing::warn!("failed to parse invalidation message payload");
                    }
                }
                None => {
                    return Err("pub/sub connection closed".to_string());
                }
            }
        }
    }
}
