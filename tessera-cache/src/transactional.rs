//! Per-unit-of-work write buffer over a shared cache.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tessera_core::{CacheKey, CacheResult, CacheValue};

use crate::traits::Cache;

/// Buffers one unit of work's writes to a shared cache until commit.
///
/// Reads go straight to the shared cache, so the unit never sees its own
/// uncommitted puts. A pending `clear` hides every shared entry from this
/// unit's reads until commit. Keys that missed are remembered: commit stores
/// a `None` for each miss that was not populated, and rollback releases any
/// per-key lock those misses acquired on a blocking cache.
///
/// Buffered writes are applied in first-put order.
///
/// Owned by exactly one unit of work and never shared across threads.
pub struct TransactionalCache {
    delegate: Arc<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add_on_commit: HashMap<CacheKey, Option<CacheValue>>,
    write_order: Vec<CacheKey>,
    entries_missed_in_cache: HashSet<CacheKey>,
}

impl TransactionalCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add_on_commit: HashMap::new(),
            write_order: Vec::new(),
            entries_missed_in_cache: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Size of the shared cache. Pending writes are not counted.
    pub fn size(&self) -> CacheResult<usize> {
        self.delegate.size()
    }

    pub fn is_clear_pending(&self) -> bool {
        self.clear_on_commit
    }

    pub fn pending_writes(&self) -> usize {
        self.entries_to_add_on_commit.len()
    }

    pub fn missed_keys(&self) -> usize {
        self.entries_missed_in_cache.len()
    }

    pub fn get(&mut self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        let value = self.delegate.get(key)?;
        if value.is_none() {
            self.entries_missed_in_cache.insert(key.clone());
        }
        if self.clear_on_commit {
            Ok(None)
        } else {
            Ok(value)
        }
    }

    /// Buffer a write. A later put for the same key replaces this one.
    pub fn put(&mut self, key: CacheKey, value: Option<CacheValue>) {
        if !self.entries_to_add_on_commit.contains_key(&key) {
            self.write_order.push(key.clone());
        }
        self.entries_to_add_on_commit.insert(key, value);
    }

    /// Schedule a clear of the shared cache and drop buffered writes.
    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add_on_commit.clear();
        self.write_order.clear();
    }

    /// Apply the buffered effects to the shared cache, then reset.
    ///
    /// Order: pending clear, then buffered writes, then a stored absence for
    /// every missed key that was not written. Stops at the first failing
    /// shared-cache call and leaves the buffer intact so the caller can
    /// still roll back.
    pub fn commit(&mut self) -> CacheResult<()> {
        tracing::debug!(
            cache_id = %self.id(),
            clear = self.clear_on_commit,
            writes = self.entries_to_add_on_commit.len(),
            misses = self.entries_missed_in_cache.len(),
            "Committing transactional cache"
        );
        if self.clear_on_commit {
            self.delegate.clear()?;
        }
        self.flush_pending_entries()?;
        self.reset();
        Ok(())
    }

    /// Discard buffered effects and release locks held for missed keys.
    ///
    /// Never fails: release errors are logged and skipped.
    pub fn rollback(&mut self) {
        self.unlock_missed_entries();
        self.reset();
    }

    fn flush_pending_entries(&self) -> CacheResult<()> {
        for key in &self.write_order {
            if let Some(value) = self.entries_to_add_on_commit.get(key) {
                self.delegate.put(key.clone(), value.clone())?;
            }
        }
        for key in &self.entries_missed_in_cache {
            if !self.entries_to_add_on_commit.contains_key(key) {
                self.delegate.put(key.clone(), None)?;
            }
        }
        Ok(())
    }

    fn unlock_missed_entries(&self) {
        for key in &self.entries_missed_in_cache {
            if let Err(e) = self.delegate.release_lock(key) {
                tracing::warn!(
                    cache_id = %self.id(),
                    key = %key,
                    error = %e,
                    "Failed to release key lock during rollback"
                );
            }
        }
    }

    /// Back to a fresh state: no pending clear, writes or misses.
    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add_on_commit.clear();
        self.write_order.clear();
        self.entries_missed_in_cache.clear();
    }
}

impl fmt::Debug for TransactionalCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalCache")
            .field("id", &self.id())
            .field("clear_on_commit", &self.clear_on_commit)
            .field("pending_writes", &self.entries_to_add_on_commit.len())
            .field("missed_keys", &self.entries_missed_in_cache.len())
            .finish()
    }
}
