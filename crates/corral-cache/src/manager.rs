//! Registry mapping cache names to lazily-built cache instances.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use deadpool_redis::Pool;
use parking_lot::Mutex;

use crate::cache::{CacheValue, LocalEvict, TwoLevelCache};
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::l2::L2Backing;

/// Default Redis key prefix for cache entries.
pub const DEFAULT_KEY_PREFIX: &str = "corral:";

struct ManagerInner {
    pool: Pool,
    key_prefix: String,
    configs: HashMap<String, CacheConfig>,
    /// One instance per (name, value type); built on first request.
    instances: Mutex<HashMap<(String, TypeId), Box<dyn Any + Send + Sync>>>,
    /// Type-erased handles for the invalidation listener.
    evictors: Mutex<Vec<Arc<dyn LocalEvict>>>,
}

/// Registry of configured caches.
///
/// Cache configurations are registered up front; instances are
/// constructed lazily on first [`cache`](Self::cache) call, one per
/// (name, value type) pairing, under a mutex so concurrent first
/// accesses cannot race-construct duplicates. Requesting a name that
/// was never configured is a configuration error, not a miss.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<ManagerInner>,
}

impl CacheManager {
    pub fn new(
        pool: Pool,
        key_prefix: impl Into<String>,
        configs: impl IntoIterator<Item = CacheConfig>,
    ) -> Self {
        let configs: HashMap<String, CacheConfig> = configs
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();

        tracing::info!(caches = configs.len(), "cache manager initialized");

        Self {
            inner: Arc::new(ManagerInner {
                pool,
                key_prefix: key_prefix.into(),
                configs,
                instances: Mutex::new(HashMap::new()),
                evictors: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get (or lazily build) the cache registered under `name` for
    /// value type `V`.
    pub fn cache<V: CacheValue>(&self, name: &str) -> Result<TwoLevelCache<V>, CacheError> {
        let config = self
            .inner
            .configs
            .get(name)
            .ok_or_else(|| CacheError::UnknownCache(name.to_string()))?;

        let key = (name.to_string(), TypeId::of::<V>());
        let mut instances = self.inner.instances.lock();

        if let Some(existing) = instances.get(&key) {
            let cache = existing
                .downcast_ref::<TwoLevelCache<V>>()
                .expect("instance map entry matches its TypeId key");
            return Ok(cache.clone());
        }

        let l2 = L2Backing::new(self.inner.pool.clone(), &self.inner.key_prefix, name);
        let cache = TwoLevelCache::<V>::new(config.clone(), l2);
        self.inner
            .evictors
            .lock()
            .push(Arc::clone(cache.inner()) as Arc<dyn LocalEvict>);
        instances.insert(key, Box::new(cache.clone()));

        tracing::debug!(cache = %name, "cache instance created");
        Ok(cache)
    }

    /// Names of all configured caches, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.configs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Evict a full namespaced key from every matching local L1.
    pub(crate) fn evict_local(&self, full_key: &str) {
        for evictor in self.inner.evictors.lock().iter() {
            if let Some(key) = full_key.strip_prefix(evictor.namespace()) {
                evictor.evict(key);
            }
        }
    }
}
