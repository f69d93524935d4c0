//! Reachability-based eviction (SOFT and WEAK policies).
//!
//! Values are stored in the delegate behind a [`ReferenceHandle`]. A weak
//! handle only keeps its value while some other owner (a caller, or the
//! hot-link ring below) holds a strong reference. A soft handle keeps its
//! value strongly until it has gone unread for `retention` generations, at
//! which point it is demoted to weak and behaves the same way.
//!
//! Every operation advances the generation counter. The handle registry
//! doubles as the reclamation queue: before each mutating operation and
//! before `size`, handles whose value has been reclaimed are dropped and
//! their keys removed from the delegate.
//!
//! Successful reads push the value onto a bounded ring of hard links, so
//! recently read values stay reachable even when no caller holds them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::{CacheError, CacheKey, CacheResult, CacheValue, WeakCacheValue, DEFAULT_HARD_LINKS};

use crate::traits::{Cache, CacheStats};

/// Generations a soft value may go unread before it becomes reclaimable.
pub const DEFAULT_SOFT_RETENTION: u64 = 1024;

/// How strongly the cache itself holds stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Weak,
    Soft { retention: u64 },
}

enum Target {
    Strong(CacheValue),
    Weak(WeakCacheValue),
}

/// Indirection stored in the delegate in place of the caller's value.
pub struct ReferenceHandle {
    target: Mutex<Target>,
    last_touched: AtomicU64,
}

impl ReferenceHandle {
    fn new(value: &CacheValue, reachability: Reachability, generation: u64) -> Self {
        let target = match reachability {
            Reachability::Weak => Target::Weak(value.downgrade()),
            Reachability::Soft { .. } => Target::Strong(value.clone()),
        };
        Self {
            target: Mutex::new(target),
            last_touched: AtomicU64::new(generation),
        }
    }

    fn value(&self) -> Option<CacheValue> {
        match &*self.target.lock() {
            Target::Strong(value) => Some(value.clone()),
            Target::Weak(weak) => weak.upgrade(),
        }
    }

    fn touch(&self, generation: u64) {
        self.last_touched.store(generation, Ordering::Relaxed);
    }

    fn demote(&self) {
        let mut target = self.target.lock();
        if let Target::Strong(value) = &*target {
            let weak = value.downgrade();
            *target = Target::Weak(weak);
        }
    }

    fn is_reclaimed(&self) -> bool {
        matches!(&*self.target.lock(), Target::Weak(weak) if weak.is_reclaimed())
    }
}

struct ReferenceState {
    hard_links: VecDeque<CacheValue>,
    hard_link_capacity: usize,
    handles: HashMap<CacheKey, Arc<ReferenceHandle>>,
}

/// SOFT/WEAK eviction decorator.
pub struct ReferenceCache {
    delegate: Arc<dyn Cache>,
    reachability: Reachability,
    state: Mutex<ReferenceState>,
    generation: AtomicU64,
}

impl ReferenceCache {
    pub fn new(delegate: Arc<dyn Cache>, reachability: Reachability) -> Self {
        Self {
            delegate,
            reachability,
            state: Mutex::new(ReferenceState {
                hard_links: VecDeque::new(),
                hard_link_capacity: DEFAULT_HARD_LINKS,
                handles: HashMap::new(),
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn weak(delegate: Arc<dyn Cache>) -> Self {
        Self::new(delegate, Reachability::Weak)
    }

    pub fn soft(delegate: Arc<dyn Cache>) -> Self {
        Self::new(
            delegate,
            Reachability::Soft {
                retention: DEFAULT_SOFT_RETENTION,
            },
        )
    }

    pub fn with_hard_links(self, capacity: usize) -> Self {
        self.set_hard_links(capacity);
        self
    }

    pub fn reachability(&self) -> Reachability {
        self.reachability
    }

    /// Number of recently read values kept strongly reachable.
    pub fn set_hard_links(&self, capacity: usize) {
        let mut state = self.state.lock();
        state.hard_link_capacity = capacity;
        state.hard_links.truncate(capacity);
    }

    pub fn hard_link_count(&self) -> usize {
        self.state.lock().hard_links.len()
    }

    fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drop reclaimed entries from the registry and the delegate.
    fn remove_garbage_collected_items(&self) -> CacheResult<()> {
        let reclaimed: Vec<CacheKey> = {
            let mut state = self.state.lock();
            if let Reachability::Soft { retention } = self.reachability {
                let now = self.generation.load(Ordering::Relaxed);
                for handle in state.handles.values() {
                    let idle = now.saturating_sub(handle.last_touched.load(Ordering::Relaxed));
                    if idle > retention {
                        handle.demote();
                    }
                }
            }
            let reclaimed: Vec<CacheKey> = state
                .handles
                .iter()
                .filter(|(_, handle)| handle.is_reclaimed())
                .map(|(key, _)| key.clone())
                .collect();
            for key in &reclaimed {
                state.handles.remove(key);
            }
            reclaimed
        };

        if !reclaimed.is_empty() {
            tracing::debug!(
                cache_id = %self.id(),
                count = reclaimed.len(),
                "Removing reclaimed cache entries"
            );
        }
        for key in &reclaimed {
            self.delegate.remove(key)?;
        }
        Ok(())
    }

    fn handle_of(&self, stored: &CacheValue) -> CacheResult<Arc<ReferenceHandle>> {
        stored
            .downcast::<ReferenceHandle>()
            .ok_or_else(|| CacheError::UnexpectedValue {
                cache_id: self.id().to_string(),
                expected: "reference handle",
            })
    }
}

impl Cache for ReferenceCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        self.remove_garbage_collected_items()?;
        let generation = self.advance();
        let Some(value) = value else {
            self.state.lock().handles.remove(&key);
            return self.delegate.put(key, None);
        };

        let handle = Arc::new(ReferenceHandle::new(&value, self.reachability, generation));
        self.state.lock().handles.insert(key.clone(), Arc::clone(&handle));
        self.delegate.put(key, Some(CacheValue::from_arc(handle)))
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        let generation = self.advance();
        let Some(stored) = self.delegate.get(key)? else {
            return Ok(None);
        };
        let handle = self.handle_of(&stored)?;

        match handle.value() {
            Some(value) => {
                handle.touch(generation);
                let mut state = self.state.lock();
                state.hard_links.push_front(value.clone());
                let capacity = state.hard_link_capacity;
                state.hard_links.truncate(capacity);
                Ok(Some(value))
            }
            None => {
                self.state.lock().handles.remove(key);
                self.delegate.remove(key)?;
                Ok(None)
            }
        }
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.remove_garbage_collected_items()?;
        self.advance();
        self.state.lock().handles.remove(key);
        match self.delegate.remove(key)? {
            Some(stored) => Ok(self.handle_of(&stored)?.value()),
            None => Ok(None),
        }
    }

    fn clear(&self) -> CacheResult<()> {
        {
            let mut state = self.state.lock();
            state.hard_links.clear();
            state.handles.clear();
        }
        self.delegate.clear()
    }

    fn size(&self) -> CacheResult<usize> {
        self.remove_garbage_collected_items()?;
        self.delegate.size()
    }

    fn release_lock(&self, key: &CacheKey) -> CacheResult<()> {
        self.delegate.release_lock(key)
    }

    fn stats(&self) -> Option<CacheStats> {
        self.delegate.stats()
    }
}
