//! Fixed-capacity in-memory LRU tier.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Called with each entry pushed out by capacity pressure.
pub type EvictionCallback<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// LRU map with a fixed capacity and an eviction callback.
///
/// Replacing an existing key does not count as an eviction.
pub struct MemoryCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K: Hash + Eq, V: Clone> MemoryCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            on_evict: None,
        }
    }

    #[must_use]
    pub fn with_eviction_callback(mut self, callback: EvictionCallback<K, V>) -> Self {
        self.on_evict = Some(callback);
        self
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Whether `key` is resident, without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Insert `value` as most recently used, evicting the LRU entry when full.
    ///
    /// Returns the evicted key, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<K>
    where
        K: Clone,
    {
        let pushed = key.clone();
        match self.entries.push(key, value) {
            Some((old_key, old_value)) if old_key != pushed => {
                if let Some(cb) = &self.on_evict {
                    cb(&old_key, &old_value);
                }
                Some(old_key)
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn cache(capacity: usize) -> MemoryCache<String, u32> {
        MemoryCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = cache(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        // Touch "a" so "b" becomes LRU
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        let evicted = cache.insert("c".into(), 3);
        assert_eq!(evicted.as_deref(), Some("b"));
        assert!(cache.contains(&"a".to_string()));
        assert!(!cache.contains(&"b".to_string()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replace_is_not_eviction() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evictions);
        let mut cache = cache(2).with_eviction_callback(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        cache.insert("a".into(), 1);
        assert_eq!(cache.insert("a".into(), 2), None);
        assert_eq!(cache.get(&"a".to_string()), Some(2));
        assert_eq!(evictions.load(Ordering::SeqCst), 0);

        cache.insert("b".into(), 3);
        cache.insert("c".into(), 4);
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capacity_reported() {
        let cache = cache(25);
        assert_eq!(cache.capacity(), 25);
        assert!(cache.is_empty());
    }
}
