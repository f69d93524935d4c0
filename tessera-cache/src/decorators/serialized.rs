//! Copy-on-store / copy-on-read isolation for read-write caches.

use std::sync::Arc;

use tessera_core::{CacheError, CacheKey, CacheResult, CacheValue, Snapshot, SnapshotError};

use crate::traits::{Cache, CacheStats};

/// Stores an immutable byte snapshot of each value and materializes a fresh
/// copy on every read, so callers never share or mutate the cached state.
///
/// Only values built with [`CacheValue::serializable`] can be stored.
pub struct SerializedCache {
    delegate: Arc<dyn Cache>,
}

impl SerializedCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self { delegate }
    }

    fn map_snapshot_error(&self, error: SnapshotError) -> CacheError {
        let cache_id = self.id().to_string();
        match error {
            SnapshotError::NotSerializable { type_name } => CacheError::NotSerializable {
                cache_id,
                type_name: type_name.to_string(),
            },
            SnapshotError::Encode { .. } => CacheError::Serialization {
                cache_id,
                reason: error.to_string(),
            },
            SnapshotError::Decode { .. } => CacheError::Deserialization {
                cache_id,
                reason: error.to_string(),
            },
        }
    }

    fn materialize(&self, stored: Option<CacheValue>) -> CacheResult<Option<CacheValue>> {
        let Some(stored) = stored else {
            return Ok(None);
        };
        let snapshot = stored
            .downcast_ref::<Snapshot>()
            .ok_or_else(|| CacheError::UnexpectedValue {
                cache_id: self.id().to_string(),
                expected: "serialized snapshot",
            })?;
        snapshot
            .materialize()
            .map(Some)
            .map_err(|e| self.map_snapshot_error(e))
    }
}

impl Cache for SerializedCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        let stored = match value {
            Some(value) => {
                let snapshot = value.snapshot().map_err(|e| self.map_snapshot_error(e))?;
                Some(CacheValue::new(snapshot))
            }
            None => None,
        };
        self.delegate.put(key, stored)
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        let stored = self.delegate.get(key)?;
        self.materialize(stored)
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        let stored = self.delegate.remove(key)?;
        self.materialize(stored)
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
        self.delegate.stats()
    }
}
