//! Bounded, mode-aware LRU cache of resolved routes.
//!
//! `get` refreshes recency, so even reads mutate the cache; the LRU lives
//! behind a `Mutex` and the cache is shared across concurrent requests.
//!
//! Storage is disabled entirely when the capacity is zero or the mode is
//! [`CacheMode::None`]. Otherwise [`CacheMode::Static`] skips entries for
//! templated routes and [`CacheMode::Dynamic`] skips the rest.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::CacheMode;

/// Cached value plus its static/dynamic class.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub is_dynamic: bool,
}

#[derive(Debug)]
pub struct ResolverCache<V> {
    inner: Option<Mutex<LruCache<String, CacheEntry<V>>>>,
    capacity: usize,
    mode: CacheMode,
}

impl<V: Clone> ResolverCache<V> {
    pub fn new(capacity: usize, mode: CacheMode) -> Self {
        let inner = match (NonZeroUsize::new(capacity), mode) {
            (Some(cap), mode) if mode != CacheMode::None => Some(Mutex::new(LruCache::new(cap))),
            _ => None,
        };
        Self {
            inner,
            capacity,
            mode,
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<String, CacheEntry<V>>>> {
        self.inner
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Store `value` unless the mode excludes its class. Updating an existing
    /// key never evicts another entry; a new key at full capacity evicts the
    /// least recently used one.
    pub fn put(&self, key: impl Into<String>, value: V, is_dynamic: bool) -> bool {
        if !self.mode.admits(is_dynamic) {
            return false;
        }
        match self.lock() {
            Some(mut cache) => {
                cache.put(key.into(), CacheEntry { value, is_dynamic });
                true
            }
            None => false,
        }
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock()?.get(key).cloned()
    }

    /// Look up `key` without touching recency.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock()?.peek(key).cloned()
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().and_then(|mut c| c.pop(key)).is_some()
    }

    pub fn clear(&self) {
        if let Some(mut cache) = self.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Whether anything can be stored at all.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction_respects_recency() {
        let cache = ResolverCache::new(2, CacheMode::All);
        cache.put("A", 1, false);
        cache.put("B", 2, false);
        assert_eq!(cache.get("A").map(|e| e.value), Some(1));
        cache.put("C", 3, false);
        assert!(cache.peek("B").is_none());
        assert!(cache.peek("A").is_some());
        assert!(cache.peek("C").is_some());
    }

    #[test]
    fn test_update_never_evicts() {
        let cache = ResolverCache::new(2, CacheMode::All);
        cache.put("A", 1, false);
        cache.put("B", 2, false);
        cache.put("A", 10, false);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("A").map(|e| e.value), Some(10));
        assert_eq!(cache.get("B").map(|e| e.value), Some(2));
    }

    #[test]
    fn test_mode_filters_classes() {
        let statics = ResolverCache::new(4, CacheMode::Static);
        assert!(statics.put("/a", 1, false));
        assert!(!statics.put("/users/1", 2, true));
        assert!(statics.get("/users/1").is_none());

        let dynamics = ResolverCache::new(4, CacheMode::Dynamic);
        assert!(!dynamics.put("/a", 1, false));
        assert!(dynamics.put("/users/1", 2, true));
        assert_eq!(dynamics.get("/users/1").map(|e| e.is_dynamic), Some(true));
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        for cache in [
            ResolverCache::new(0, CacheMode::All),
            ResolverCache::new(8, CacheMode::None),
        ] {
            assert!(!cache.is_enabled());
            assert!(!cache.put("/a", 1, false));
            assert!(cache.get("/a").is_none());
            assert_eq!(cache.len(), 0);
        }
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = ResolverCache::new(4, CacheMode::All);
        cache.put("/a", 1, false);
        cache.put("/b", 2, true);
        assert!(cache.delete("/a"));
        assert!(!cache.delete("/a"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 4);
    }
}
