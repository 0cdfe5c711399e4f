//! In-process L1 tier: a bounded map with per-entry TTL.
//!
//! Pure bookkeeping behind a single mutex; no operation here ever
//! touches the network. Expiry is lazy (checked on read) and eviction is
//! FIFO over insertion order, where re-inserting an existing key moves
//! it to the back, a cheap approximation of LRU that is good enough for
//! a hint cache sitting in front of Redis.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct L1Entry<V> {
    value: V,
    expires_at: Instant,
}

struct L1State<V> {
    map: HashMap<String, L1Entry<V>>,
    order: VecDeque<String>,
}

pub(crate) struct L1Cache<V> {
    inner: Mutex<L1State<V>>,
    capacity: Option<usize>,
}

impl<V: Clone> L1Cache<V> {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(L1State {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// Look up a key, removing it if its TTL has passed.
    pub(crate) fn get(&self, key: &str) -> Option<V> {
        let mut state = self.inner.lock();
        let expired = match state.map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            state.map.remove(key);
            state.order.retain(|k| k != key);
        }
        None
    }

    /// Insert a value, evicting the oldest-inserted key when at capacity.
    pub(crate) fn put(&self, key: &str, value: V, ttl: Duration) {
        let mut state = self.inner.lock();

        if state.map.contains_key(key) {
            // Re-insert moves the key to the back of the eviction order.
            state.order.retain(|k| k != key);
        } else if let Some(capacity) = self.capacity {
            while state.map.len() >= capacity {
                match state.order.pop_front() {
                    Some(oldest) => {
                        state.map.remove(&oldest);
                    }
                    None => break,
                }
            }
        }

        state.order.push_back(key.to_string());
        state.map.insert(
            key.to_string(),
            L1Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub(crate) fn remove(&self, key: &str) {
        let mut state = self.inner.lock();
        if state.map.remove(key).is_some() {
            state.order.retain(|k| k != key);
        }
    }

    pub(crate) fn clear(&self) {
        let mut state = self.inner.lock();
        state.map.clear();
        state.order.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn put_then_get_returns_value() {
        let cache = L1Cache::new(None);
        cache.put("a", 1_u32, TTL);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let cache = L1Cache::new(None);
        cache.put("a", 1_u32, Duration::from_millis(20));
        assert_eq!(cache.get("a"), Some(1));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn oldest_inserted_key_is_evicted_at_capacity() {
        let cache = L1Cache::new(Some(2));
        cache.put("a", 1_u32, TTL);
        cache.put("b", 2, TTL);
        cache.put("c", 3, TTL);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn reinsert_moves_key_to_back_of_eviction_order() {
        let cache = L1Cache::new(Some(2));
        cache.put("a", 1_u32, TTL);
        cache.put("b", 2, TTL);
        // Refresh "a" so "b" becomes the oldest.
        cache.put("a", 10, TTL);
        cache.put("c", 3, TTL);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn remove_and_clear() {
        let cache = L1Cache::new(None);
        cache.put("a", 1_u32, TTL);
        cache.put("b", 2, TTL);
        cache.remove("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
