//! Whole-cache mutual exclusion.

use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::{CacheKey, CacheResult, CacheValue};

use crate::traits::{Cache, CacheStats};

/// Serializes every operation on the delegate behind one lock, making each
/// call atomic with respect to the others.
pub struct SynchronizedCache {
    delegate: Arc<dyn Cache>,
    guard: Mutex<()>,
}

impl SynchronizedCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            guard: Mutex::new(()),
        }
    }
}

impl Cache for SynchronizedCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        let _guard = self.guard.lock();
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        let _guard = self.guard.lock();
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        let _guard = self.guard.lock();
        self.delegate.remove(key)
    }

    fn clear(&self) -> CacheResult<()> {
        let _guard = self.guard.lock();
        self.delegate.clear()
    }

    fn size(&self) -> CacheResult<usize> {
        let _guard = self.guard.lock();
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
    use crate::decorators::FifoCache;
    use crate::perpetual::PerpetualCache;
    use crate::test_support::{key, text};
    use std::thread;

    #[test]
    fn test_concurrent_puts_respect_capacity() {
        let fifo = Arc::new(FifoCache::with_capacity(
            Arc::new(PerpetualCache::new("sync")),
            16,
        ));
        let cache = Arc::new(SynchronizedCache::new(fifo));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        cache.put(key(t * 1000 + i), Some(text("v"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.size().unwrap(), 16);
    }
}
