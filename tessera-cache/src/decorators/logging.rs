//! Hit-ratio statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tessera_core::{CacheKey, CacheResult, CacheValue};

use crate::traits::{Cache, CacheStats};

/// Counts lookups and hits and emits the running hit ratio at debug level
/// after every lookup. Stored absences count as misses.
pub struct LoggingCache {
    delegate: Arc<dyn Cache>,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl LoggingCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    fn snapshot(&self) -> CacheStats {
        let requests = self.requests.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed).min(requests);
        CacheStats {
            hits,
            misses: requests - hits,
        }
    }
}

impl Cache for LoggingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.delegate.get(key)?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            cache_id = %self.id(),
            hit_ratio = self.hit_ratio(),
            "Cache hit ratio"
        );
        Ok(value)
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.delegate.remove(key)
    }

    fn clear(&self) -> CacheResult<()> {
        self.delegate.clear()
    }

    fn size(&self) -> CacheResult<usize> {
        self.delegate.size()
    }

    fn release_lock(&self, key: &CacheKey) -> CacheResult<()> {
        self.delegate.release_lock(key)
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.snapshot())
    }
}
