//! Per-user read cache with a fixed time-to-live.
//!
//! Never authoritative: a miss always falls back to the store, and writes
//! for a user drop that user's entry. The least recently used entry is
//! evicted once the cache is full.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct TtlCache<K: Hash + Eq, V> {
    ttl: Duration,
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// A zero `max_entries` falls back to the default capacity.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(Self::DEFAULT_CAPACITY);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fresh value for `key`, evicting it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        let now = Instant::now();
        // LruCache::get is mutable, it bumps the entry to most recently used
        let lookup = entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
        match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key,
                CacheEntry {
                    value,
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_until_invalidated() {
        let cache = TtlCache::new(Duration::from_secs(300), 16);
        cache.insert("user-a", 7);
        assert_eq!(cache.get(&"user-a"), Some(7));
        cache.invalidate(&"user-a");
        assert_eq!(cache.get(&"user-a"), None);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = TtlCache::new(Duration::from_millis(1), 16);
        cache.insert(1u32, "stale");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = TtlCache::new(Duration::ZERO, 16);
        cache.insert(1u32, 1u32);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert(1u32, "a");
        cache.insert(2u32, "b");
        // touch 1 so 2 becomes the eviction candidate
        assert_eq!(cache.get(&1), Some("a"));
        cache.insert(3u32, "c");

        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&3), Some("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn expired_inserts_stay_within_capacity() {
        let cache = TtlCache::new(Duration::from_millis(1), 64);
        for key in 0..5_000u32 {
            cache.insert(key, key);
        }
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(u32::MAX, 0);
        assert_eq!(cache.len(), 64);
        assert_eq!(cache.get(&0), None);
    }

    #[test]
    fn zero_capacity_uses_default() {
        let cache = TtlCache::new(Duration::from_secs(60), 0);
        cache.insert(1u32, 1u32);
        assert_eq!(cache.get(&1), Some(1));
    }
}
