//! First-in, first-out eviction.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::{CacheKey, CacheResult, CacheValue, DEFAULT_CAPACITY};

use crate::traits::{Cache, CacheStats};

struct InsertionOrder {
    keys: VecDeque<CacheKey>,
    capacity: usize,
}

/// Evicts the oldest inserted key once more than `capacity` puts are queued.
///
/// The queue records every put, so re-putting a key queues it twice.
/// Removing a key does not take it out of the queue.
pub struct FifoCache {
    delegate: Arc<dyn Cache>,
    order: Mutex<InsertionOrder>,
}

impl FifoCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self::with_capacity(delegate, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(delegate: Arc<dyn Cache>, capacity: usize) -> Self {
        Self {
            delegate,
            order: Mutex::new(InsertionOrder {
                keys: VecDeque::new(),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.order.lock().capacity
    }

    /// Change the capacity. Takes effect on the next put.
    pub fn set_capacity(&self, capacity: usize) {
        self.order.lock().capacity = capacity;
    }

    fn cycle_key_list(&self, key: &CacheKey) -> Option<CacheKey> {
        let mut order = self.order.lock();
        order.keys.push_back(key.clone());
        if order.keys.len() > order.capacity {
            order.keys.pop_front()
        } else {
            None
        }
    }
}

impl Cache for FifoCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        if let Some(oldest) = self.cycle_key_list(&key) {
            tracing::trace!(cache_id = %self.id(), key = %oldest, "FIFO eviction");
            self.delegate.remove(&oldest)?;
        }
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.delegate.remove(key)
    }

    fn clear(&self) -> CacheResult<()> {
        self.delegate.clear()?;
        self.order.lock().keys.clear();
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
