//! Interval-based whole-cache clearing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tessera_core::{CacheKey, CacheResult, CacheValue, DEFAULT_CLEAR_INTERVAL};

use crate::traits::{Cache, CacheStats};

/// Clears the delegate lazily: the first access after `clear_interval` has
/// elapsed since the last clear wipes everything. There is no background
/// timer.
pub struct ScheduledCache {
    delegate: Arc<dyn Cache>,
    clear_interval: Duration,
    last_clear: Mutex<Instant>,
}

impl ScheduledCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self::with_interval(delegate, DEFAULT_CLEAR_INTERVAL)
    }

    pub fn with_interval(delegate: Arc<dyn Cache>, clear_interval: Duration) -> Self {
        Self {
            delegate,
            clear_interval,
            last_clear: Mutex::new(Instant::now()),
        }
    }

    pub fn clear_interval(&self) -> Duration {
        self.clear_interval
    }

    /// Returns true when this call performed a clear.
    fn clear_when_stale(&self) -> CacheResult<bool> {
        let mut last_clear = self.last_clear.lock();
        if last_clear.elapsed() > self.clear_interval {
            tracing::debug!(
                cache_id = %self.id(),
                interval_ms = self.clear_interval.as_millis() as u64,
                "Scheduled cache clear"
            );
            *last_clear = Instant::now();
            self.delegate.clear()?;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Cache for ScheduledCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        self.clear_when_stale()?;
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        if self.clear_when_stale()? {
            return Ok(None);
        }
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.clear_when_stale()?;
        self.delegate.remove(key)
    }

    fn clear(&self) -> CacheResult<()> {
        *self.last_clear.lock() = Instant::now();
        self.delegate.clear()
    }

    fn size(&self) -> CacheResult<usize> {
        self.clear_when_stale()?;
        self.delegate.size()
    }

    fn release_lock(&self, key: &CacheKey) -> CacheResult<()> {
        self.delegate.release_lock(key)
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}
