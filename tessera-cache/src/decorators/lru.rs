//! Least-recently-used eviction.

use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::{CacheKey, CacheResult, CacheValue, DEFAULT_CAPACITY};

use crate::traits::{Cache, CacheStats};

/// Tracks access order over the delegate's keys and removes the least
/// recently used key from the delegate when a put overflows `capacity`.
///
/// Both reads and writes count as use. `remove` only touches the delegate;
/// the stale key ages out of the order tracker on its own.
pub struct LruCache {
    delegate: Arc<dyn Cache>,
    order: Mutex<::lru::LruCache<CacheKey, ()>>,
}

impl LruCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self::with_capacity(delegate, capacity)
    }

    pub fn with_capacity(delegate: Arc<dyn Cache>, capacity: NonZeroUsize) -> Self {
        Self {
            delegate,
            order: Mutex::new(::lru::LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.order.lock().cap().get()
    }

    /// Change the capacity. Shrinking evicts the surplus least recently used
    /// keys from the delegate immediately.
    pub fn set_capacity(&self, capacity: NonZeroUsize) -> CacheResult<()> {
        let surplus = {
            let mut order = self.order.lock();
            let mut surplus = Vec::new();
            while order.len() > capacity.get() {
                match order.pop_lru() {
                    Some((key, ())) => surplus.push(key),
                    None => break,
                }
            }
            order.resize(capacity);
            surplus
        };
        for key in &surplus {
            self.delegate.remove(key)?;
        }
        Ok(())
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        self.delegate.put(key.clone(), value)?;
        let evicted = match self.order.lock().push(key.clone(), ()) {
            // `push` hands back the old entry when the key was already present.
            Some((eldest, ())) if eldest != key => Some(eldest),
            _ => None,
        };
        if let Some(eldest) = evicted {
            tracing::trace!(cache_id = %self.id(), key = %eldest, "LRU eviction");
            self.delegate.remove(&eldest)?;
        }
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        // Touch for recency.
        self.order.lock().get(key);
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.delegate.remove(key)
    }

    fn clear(&self) -> CacheResult<()> {
        self.delegate.clear()?;
        self.order.lock().clear();
        Ok(())
    }

    fn size(&self) -> CacheResult<usize> {
        self.delegate.size()
    }

    fn release_lock(&self, key: &CacheKey) -> CacheResult<()> {
        self.delegate.release_lock(key)
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perpetual::PerpetualCache;
    use crate::test_support::{key, text};

    fn lru(capacity: usize) -> (Arc<PerpetualCache>, LruCache) {
        let base = Arc::new(PerpetualCache::new("lru"));
        let cache = LruCache::with_capacity(base.clone(), NonZeroUsize::new(capacity).unwrap());
        (base, cache)
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (base, cache) = lru(2);
        cache.put(key(1), Some(text("a"))).unwrap();
        cache.put(key(2), Some(text("b"))).unwrap();
        cache.put(key(3), Some(text("c"))).unwrap();

        assert!(!base.contains_key(&key(1)));
        assert!(cache.get(&key(2)).unwrap().is_some());
        assert!(cache.get(&key(3)).unwrap().is_some());
    }

    #[test]
    fn test_read_refreshes_recency() {
        let (base, cache) = lru(2);
        cache.put(key(1), Some(text("a"))).unwrap();
        cache.put(key(2), Some(text("b"))).unwrap();
        cache.get(&key(1)).unwrap();
        cache.put(key(3), Some(text("c"))).unwrap();

        assert!(base.contains_key(&key(1)));
        assert!(!base.contains_key(&key(2)));
        assert!(base.contains_key(&key(3)));
    }

    #[test]
    fn test_reput_does_not_evict_itself() {
        let (base, cache) = lru(2);
        cache.put(key(1), Some(text("a"))).unwrap();
        cache.put(key(1), Some(text("a2"))).unwrap();

        assert!(base.contains_key(&key(1)));
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn test_shrinking_capacity_evicts_surplus() {
        let (base, cache) = lru(3);
        for i in 1..=3 {
            cache.put(key(i), Some(text("v"))).unwrap();
        }
        cache.set_capacity(NonZeroUsize::new(1).unwrap()).unwrap();

        assert_eq!(cache.capacity(), 1);
        assert_eq!(base.size().unwrap(), 1);
        assert!(base.contains_key(&key(3)));
    }

    #[test]
    fn test_default_capacity() {
        let cache = LruCache::new(Arc::new(PerpetualCache::new("lru")));
        assert_eq!(cache.capacity(), 1024);
    }
}
