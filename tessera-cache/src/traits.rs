//! Cache trait and usage statistics.
//!
//! Every store and every decorator implements [`Cache`]. Decorators own an
//! `Arc<dyn Cache>` delegate and forward whatever they do not change, so a
//! configured namespace cache is a single `Arc<dyn Cache>` chain.

use tessera_core::{CacheKey, CacheResult, CacheValue};

// ============================================================================
// CACHE TRAIT
// ============================================================================

/// Shared, namespace-scoped key/value cache.
///
/// A `None` value is a legal entry meaning "known absent". Reading it back
/// yields `Ok(None)`, the same as a miss, but it still counts toward `size`.
///
/// Implementations must be safe to call from many threads. Whether a single
/// call is atomic with respect to others depends on the decorators in the
/// chain; the base store only guarantees memory safety.
pub trait Cache: Send + Sync {
    /// Namespace identifier. Stable for the lifetime of the cache.
    fn id(&self) -> &str;

    /// Store a value (or a stored absence) under `key`.
    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()>;

    /// Look up `key`. Misses and stored absences both return `Ok(None)`.
    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>>;

    /// Remove `key`, returning the previous value if there was one.
    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>>;

    fn clear(&self) -> CacheResult<()>;

    /// Number of stored entries, including stored absences.
    fn size(&self) -> CacheResult<usize>;

    /// Release any per-key lock the calling thread holds for `key`.
    ///
    /// Decorators must forward this to their delegate. Only the blocking
    /// decorator holds locks; for every other cache this is a no-op.
    fn release_lock(&self, _key: &CacheKey) -> CacheResult<()> {
        Ok(())
    }

    /// Hit/miss statistics, if a statistics layer is present in the chain.
    ///
    /// Decorators forward this so the statistics stay reachable from the
    /// outermost cache.
    fn stats(&self) -> Option<CacheStats> {
        None
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Read statistics collected by the logging decorator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups that found a value.
    pub hits: u64,
    /// Number of lookups that found nothing (or a stored absence).
    pub misses: u64,
}

impl CacheStats {
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
