//! Two-level cache orchestration and single-flight load collapsing.
//!
//! ## Read path
//!
//! ```text
//! get(key) → L1 → L2 (Redis) → miss
//!                  │
//!                  ├─ value   → promote to L1, return
//!                  ├─ null    → confirmed absent, L1 untouched
//!                  └─ invalid → dropped, treated as miss
//! ```
//!
//! ## Write path
//!
//! `put` writes L2 first, then L1: a reader must never observe a value
//! in L1 that failed to persist to Redis, and a `put` followed by a
//! `get` on the same key observes the written value.
//!
//! ## Single-flight
//!
//! `get_or_put` collapses concurrent loads for the same key into one
//! loader execution. The first caller to miss installs a shared future
//! in the flight map; everyone else arriving during the load awaits that
//! same future and receives the same result (or the same failure). The
//! slot is removed by a drop guard once the load settles, whatever the
//! exit path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::l1::L1Cache;
use crate::l2::L2Backing;
use crate::pubsub;
use crate::wire::{self, Unwrapped};

/// Bounds required of a cached value type.
pub trait CacheValue:
    Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> CacheValue for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

type Flight<V> = Shared<BoxFuture<'static, Result<Option<V>, CacheError>>>;

/// Outcome of consulting L1 and L2 for a key.
enum Lookup<V> {
    Hit(V),
    /// A decoded "confirmed absent" marker.
    Negative,
    Miss,
}

/// L1 entry counts for one cache, exposed for observability endpoints.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub name: String,
    pub l1_entries: usize,
}

pub(crate) struct CacheInner<V> {
    pub(crate) config: CacheConfig,
    pub(crate) l1: Option<L1Cache<V>>,
    pub(crate) l2: L2Backing,
    flights: DashMap<String, Flight<V>>,
}

/// A named cache backed by an in-process L1 tier and a Redis L2 tier.
///
/// Cloning is cheap and every clone shares the same tiers; instances are
/// obtained from [`CacheManager::cache`](crate::CacheManager::cache).
pub struct TwoLevelCache<V: CacheValue> {
    inner: Arc<CacheInner<V>>,
}

impl<V: CacheValue> Clone for TwoLevelCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Removes a single-flight slot when the leading caller exits,
/// regardless of success, failure, or cancellation.
struct FlightGuard<V: CacheValue> {
    inner: Arc<CacheInner<V>>,
    key: String,
}

impl<V: CacheValue> Drop for FlightGuard<V> {
    fn drop(&mut self) {
        self.inner.flights.remove(&self.key);
    }
}

impl<V: CacheValue> TwoLevelCache<V> {
    pub(crate) fn new(config: CacheConfig, l2: L2Backing) -> Self {
        let l1 = config
            .l1_enabled
            .then(|| L1Cache::new(config.max_l1_entries));
        Self {
            inner: Arc::new(CacheInner {
                config,
                l1,
                l2,
                flights: DashMap::new(),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<CacheInner<V>> {
        &self.inner
    }

    /// The cache's configured name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    async fn lookup(&self, key: &str) -> Result<Lookup<V>, CacheError> {
        if let Some(l1) = &self.inner.l1
            && let Some(value) = l1.get(key)
        {
            tracing::debug!(cache = %self.name(), key = %key, "cache hit (L1)");
            return Ok(Lookup::Hit(value));
        }

        let Some(bytes) = self.inner.l2.get(key).await? else {
            tracing::debug!(cache = %self.name(), key = %key, "cache miss");
            return Ok(Lookup::Miss);
        };

        match wire::unwrap(&bytes) {
            Unwrapped::Null => {
                tracing::debug!(cache = %self.name(), key = %key, "cache hit (L2, negative)");
                Ok(Lookup::Negative)
            }
            Unwrapped::Value(codec, payload) => match wire::decode::<V>(payload, codec) {
                Some(value) => {
                    tracing::debug!(cache = %self.name(), key = %key, "cache hit (L2)");
                    if let Some(l1) = &self.inner.l1 {
                        l1.put(key, value.clone(), self.inner.config.ttl());
                    }
                    Ok(Lookup::Hit(value))
                }
                None => {
                    tracing::warn!(
                        cache = %self.name(),
                        key = %key,
                        "cached payload failed to decode; dropping entry"
                    );
                    self.drop_corrupt(key).await;
                    Ok(Lookup::Miss)
                }
            },
            Unwrapped::Invalid => {
                tracing::warn!(
                    cache = %self.name(),
                    key = %key,
                    "cached bytes are not a corral wire value; dropping entry"
                );
                self.drop_corrupt(key).await;
                Ok(Lookup::Miss)
            }
        }
    }

    /// Best-effort removal of an undecodable entry.
    async fn drop_corrupt(&self, key: &str) {
        if let Err(e) = self.inner.l2.delete(key).await {
            tracing::warn!(cache = %self.name(), key = %key, error = %e, "failed to drop corrupt entry");
        }
    }

    /// Get a value. A cached "confirmed absent" marker returns `None`
    /// without touching L1.
    pub async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        match self.lookup(key).await? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::Negative | Lookup::Miss => Ok(None),
        }
    }

    /// Write a value through L2 and then L1.
    ///
    /// `ttl` overrides the configured default for this write only. The
    /// Redis write happens first and its failure aborts the operation,
    /// so L1 never holds a value that is missing from L2.
    pub async fn put(&self, key: &str, value: &V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or_else(|| self.inner.config.ttl());
        let bytes = wire::encode(value, self.inner.config.codec)?;
        self.inner.l2.set(key, bytes, ttl).await?;
        if let Some(l1) = &self.inner.l1 {
            l1.put(key, value.clone(), ttl);
        }
        tracing::debug!(cache = %self.name(), key = %key, ttl_ms = ttl.as_millis() as u64, "cache put");
        Ok(())
    }

    /// Delete a key from both tiers and notify other instances.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.l2.delete(key).await?;
        if let Some(l1) = &self.inner.l1 {
            l1.remove(key);
        }
        // Best-effort cross-instance L1 eviction.
        let full_key = self.inner.l2.full_key(key);
        if let Err(e) = pubsub::publish_invalidation(&self.inner.l2.pool, &full_key).await {
            tracing::warn!(cache = %self.name(), key = %key, error = %e, "failed to publish invalidation");
        }
        tracing::debug!(cache = %self.name(), key = %key, "cache delete");
        Ok(())
    }

    /// Remove every entry of this cache from both tiers.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let removed = self
            .inner
            .l2
            .clear(self.inner.config.allow_unscanned_clear)
            .await?;
        if let Some(l1) = &self.inner.l1 {
            l1.clear();
        }
        tracing::debug!(cache = %self.name(), removed, "cache cleared");
        Ok(())
    }

    /// Get a value, loading it on a miss with at most one concurrent
    /// loader execution per key.
    ///
    /// On a miss, exactly one caller runs `loader`; concurrent callers
    /// for the same key await the same in-flight result. A loader result
    /// of `Some` is written through as in [`put`](Self::put). A result of
    /// `None` stores a "confirmed absent" marker in L2 (never L1) when
    /// the cache has a `null_ttl` configured. A loader failure caches
    /// nothing and is propagated to every collapsed caller; retrying is
    /// the loader's business, not the cache's.
    pub async fn get_or_put<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<Option<V>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<V>>> + Send + 'static,
    {
        match self.lookup(key).await? {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Negative => return Ok(None),
            Lookup::Miss => {}
        }

        let (flight, guard) = match self.inner.flights.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!(cache = %self.name(), key = %key, "joining in-flight load");
                (entry.get().clone(), None)
            }
            Entry::Vacant(entry) => {
                let flight = Self::load(self.clone(), key.to_string(), ttl, loader())
                    .boxed()
                    .shared();
                entry.insert(flight.clone());
                let guard = FlightGuard {
                    inner: Arc::clone(&self.inner),
                    key: key.to_string(),
                };
                (flight, Some(guard))
            }
        };

        let result = flight.await;
        drop(guard);
        result
    }

    async fn load<Fut>(
        cache: TwoLevelCache<V>,
        key: String,
        ttl: Option<Duration>,
        loader: Fut,
    ) -> Result<Option<V>, CacheError>
    where
        Fut: Future<Output = anyhow::Result<Option<V>>> + Send + 'static,
    {
        match loader.await {
            Ok(Some(value)) => {
                cache.put(&key, &value, ttl).await?;
                Ok(Some(value))
            }
            Ok(None) => {
                if let Some(null_ttl) = cache.inner.config.null_ttl() {
                    cache.inner.l2.set(&key, wire::wrap_null(), null_ttl).await?;
                    tracing::debug!(
                        cache = %cache.name(),
                        key = %key,
                        null_ttl_ms = null_ttl.as_millis() as u64,
                        "stored negative marker"
                    );
                }
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(cache = %cache.name(), key = %key, error = %e, "cache loader failed");
                Err(CacheError::Loader(Arc::new(e)))
            }
        }
    }

    /// L1 entry count snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.inner.config.name.clone(),
            l1_entries: self.inner.l1.as_ref().map_or(0, L1Cache::len),
        }
    }
}

/// Non-generic view of a cache used by the invalidation listener to
/// evict L1 entries without knowing the value type.
pub(crate) trait LocalEvict: Send + Sync {
    fn namespace(&self) -> &str;
    fn evict(&self, key: &str);
}

impl<V: CacheValue> LocalEvict for CacheInner<V> {
    fn namespace(&self) -> &str {
        &self.l2.namespace
    }

    fn evict(&self, key: &str) {
        if let Some(l1) = &self.l1 {
            l1.remove(key);
        }
    }
}
