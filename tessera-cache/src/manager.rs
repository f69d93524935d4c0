//! Routes one unit of work's cache operations to per-cache buffers.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{CacheKey, CacheResult, CacheValue};
use uuid::Uuid;

use crate::traits::Cache;
use crate::transactional::TransactionalCache;

/// Owns one [`TransactionalCache`] per shared cache touched during a unit of
/// work, keyed by cache id, and commits or rolls them back together.
#[derive(Debug)]
pub struct TransactionalCacheManager {
    unit_id: Uuid,
    transactional_caches: HashMap<String, TransactionalCache>,
}

impl Default for TransactionalCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionalCacheManager {
    pub fn new() -> Self {
        Self {
            unit_id: Uuid::now_v7(),
            transactional_caches: HashMap::new(),
        }
    }

    /// Identifier of the current unit of work. Renewed after every commit
    /// and rollback.
    pub fn unit_id(&self) -> Uuid {
        self.unit_id
    }

    /// Number of shared caches touched so far.
    pub fn tracked_caches(&self) -> usize {
        self.transactional_caches.len()
    }

    pub fn clear(&mut self, cache: &Arc<dyn Cache>) {
        self.transactional_cache(cache).clear();
    }

    pub fn get_object(
        &mut self,
        cache: &Arc<dyn Cache>,
        key: &CacheKey,
    ) -> CacheResult<Option<CacheValue>> {
        self.transactional_cache(cache).get(key)
    }

    pub fn put_object(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, value: Option<CacheValue>) {
        self.transactional_cache(cache).put(key, value);
    }

    /// Commit every buffer. Stops at the first failure.
    pub fn commit(&mut self) -> CacheResult<()> {
        tracing::debug!(
            unit_id = %self.unit_id,
            caches = self.transactional_caches.len(),
            "Committing unit of work caches"
        );
        for cache in self.transactional_caches.values_mut() {
            cache.commit()?;
        }
        self.unit_id = Uuid::now_v7();
        Ok(())
    }

    /// Roll back every buffer. Never fails.
    pub fn rollback(&mut self) {
        tracing::debug!(
            unit_id = %self.unit_id,
            caches = self.transactional_caches.len(),
            "Rolling back unit of work caches"
        );
        for cache in self.transactional_caches.values_mut() {
            cache.rollback();
        }
        self.unit_id = Uuid::now_v7();
    }

    fn transactional_cache(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
        self.transactional_caches
            .entry(cache.id().to_string())
            .or_insert_with(|| TransactionalCache::new(Arc::clone(cache)))
    }
}
