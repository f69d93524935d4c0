//! Per-key locking that lets one thread populate a missing entry while
//! others wait for it.
//!
//! A `get` acquires the key's lock. On a hit the lock is released before
//! returning; on a miss the caller keeps holding it and is expected to
//! follow up with a `put` for the same key (which releases the lock) or a
//! `release_lock` if it gives up. Other threads calling `get` for that key
//! block until then, or until the configured timeout elapses.
//!
//! Locks are held by threads and are reentrant without nesting: a thread
//! that already holds a key's lock acquires it again immediately, and a
//! single release frees it.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tessera_core::{CacheError, CacheKey, CacheResult, CacheValue};

use crate::traits::{Cache, CacheStats};

/// Binary lock for one key, owned by the acquiring thread.
#[derive(Default)]
struct KeyLock {
    holder: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl KeyLock {
    /// Returns false if `deadline` passed while another thread held the lock.
    fn acquire(&self, deadline: Option<Instant>) -> bool {
        let me = thread::current().id();
        let mut holder = self.holder.lock();
        loop {
            match *holder {
                None => break,
                Some(owner) if owner == me => return true,
                Some(_) => {}
            }
            match deadline {
                None => self.released.wait(&mut holder),
                Some(deadline) => {
                    if self.released.wait_until(&mut holder, deadline).timed_out()
                        && holder.is_some()
                    {
                        return false;
                    }
                }
            }
        }
        *holder = Some(me);
        true
    }

    /// Release if held by the calling thread. Returns whether it was held.
    fn release(&self) -> bool {
        let me = thread::current().id();
        let mut holder = self.holder.lock();
        if *holder == Some(me) {
            *holder = None;
            self.released.notify_one();
            true
        } else {
            false
        }
    }

    fn is_held(&self) -> bool {
        self.holder.lock().is_some()
    }
}

/// Blocking decorator.
pub struct BlockingCache {
    delegate: Arc<dyn Cache>,
    timeout: Option<Duration>,
    locks: DashMap<CacheKey, Arc<KeyLock>>,
}

impl BlockingCache {
    /// Waits indefinitely for contended keys.
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            timeout: None,
            locks: DashMap::new(),
        }
    }

    pub fn with_timeout(delegate: Arc<dyn Cache>, timeout: Duration) -> Self {
        Self {
            delegate,
            timeout: Some(timeout),
            locks: DashMap::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// True if some thread currently holds the lock for `key`.
    pub fn is_locked(&self, key: &CacheKey) -> bool {
        self.locks.get(key).is_some_and(|lock| lock.is_held())
    }

    fn acquire_lock(&self, key: &CacheKey) -> CacheResult<()> {
        // Clone the Arc out so the map shard is not held while waiting.
        let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);

        if lock.acquire(deadline) {
            tracing::trace!(cache_id = %self.id(), key = %key, "Acquired key lock");
            return Ok(());
        }

        let timeout = self.timeout.unwrap_or_default();
        tracing::warn!(
            cache_id = %self.id(),
            key = %key,
            timeout_ms = timeout.as_millis() as u64,
            "Timed out waiting for key lock"
        );
        Err(CacheError::LockTimeout {
            cache_id: self.id().to_string(),
            key: key.to_string(),
            timeout,
        })
    }

    fn release(&self, key: &CacheKey) {
        let lock = self.locks.get(key).map(|entry| Arc::clone(entry.value()));
        if let Some(lock) = lock {
            if lock.release() {
                tracing::trace!(cache_id = %self.id(), key = %key, "Released key lock");
            }
        }
    }
}

impl Cache for BlockingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Write through to the delegate, then release this thread's lock on
    /// `key` whether or not the write succeeded.
    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        let result = self.delegate.put(key.clone(), value);
        self.release(&key);
        result
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.acquire_lock(key)?;
        match self.delegate.get(key) {
            Ok(Some(value)) => {
                self.release(key);
                Ok(Some(value))
            }
            // Miss: keep the lock so this thread can populate the entry.
            Ok(None) => Ok(None),
            Err(e) => {
                self.release(key);
                Err(e)
            }
        }
    }

    /// Only releases the calling thread's lock on `key`. The entry itself
    /// stays in the delegate.
    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        self.release(key);
        Ok(None)
    }

    fn clear(&self) -> CacheResult<()> {
        self.delegate.clear()
    }

    fn size(&self) -> CacheResult<usize> {
        self.delegate.size()
    }

    fn release_lock(&self, key: &CacheKey) -> CacheResult<()> {
        self.release(key);
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
    use std::sync::mpsc;

    fn blocking(timeout: Option<Duration>) -> Arc<BlockingCache> {
        let base: Arc<dyn Cache> = Arc::new(PerpetualCache::new("blocking"));
        Arc::new(match timeout {
            Some(timeout) => BlockingCache::with_timeout(base, timeout),
            None => BlockingCache::new(base),
        })
    }

    #[test]
    fn test_hit_releases_lock() {
        let cache = blocking(None);
        cache.put(key(1), Some(text("a"))).unwrap();

        assert!(cache.get(&key(1)).unwrap().is_some());
        assert!(!cache.is_locked(&key(1)));
    }

    #[test]
    fn test_miss_holds_lock_until_put() {
        let cache = blocking(None);
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(cache.is_locked(&key(1)));

        cache.put(key(1), Some(text("a"))).unwrap();
        assert!(!cache.is_locked(&key(1)));
    }

    #[test]
    fn test_reacquire_by_holder_does_not_block() {
        let cache = blocking(Some(Duration::from_millis(10)));
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(cache.get(&key(1)).unwrap().is_none());

        cache.release_lock(&key(1)).unwrap();
        assert!(!cache.is_locked(&key(1)));
    }

    #[test]
    fn test_remove_only_releases() {
        let cache = blocking(None);
        cache.put(key(1), Some(text("a"))).unwrap();
        cache.put(key(2), None).unwrap();
        assert!(cache.get(&key(2)).unwrap().is_none());

        assert!(cache.remove(&key(2)).unwrap().is_none());
        assert!(!cache.is_locked(&key(2)));
        assert!(cache.remove(&key(1)).unwrap().is_none());
        assert_eq!(cache.size().unwrap(), 2);
    }

    #[test]
    fn test_release_by_non_holder_is_ignored() {
        let cache = blocking(None);
        assert!(cache.get(&key(1)).unwrap().is_none());

        let other = Arc::clone(&cache);
        thread::spawn(move || other.release_lock(&key(1)).unwrap())
            .join()
            .unwrap();

        assert!(cache.is_locked(&key(1)));
        cache.release_lock(&key(1)).unwrap();
        cache.release_lock(&key(1)).unwrap();
        assert!(!cache.is_locked(&key(1)));
    }

    #[test]
    fn test_contended_get_times_out() {
        let cache = blocking(Some(Duration::from_millis(50)));
        assert!(cache.get(&key(1)).unwrap().is_none());

        let other = Arc::clone(&cache);
        let err = thread::spawn(move || other.get(&key(1)))
            .join()
            .unwrap()
            .unwrap_err();

        match err {
            CacheError::LockTimeout {
                cache_id, timeout, ..
            } => {
                assert_eq!(cache_id, "blocking");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            unexpected => panic!("expected lock timeout, got {unexpected:?}"),
        }
        cache.release_lock(&key(1)).unwrap();
    }

    #[test]
    fn test_waiter_sees_value_put_by_holder() {
        let cache = blocking(None);
        assert!(cache.get(&key(1)).unwrap().is_none());

        let (started_tx, started_rx) = mpsc::channel();
        let waiter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                started_tx.send(()).unwrap();
                cache.get(&key(1)).unwrap()
            })
        };

        started_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        cache.put(key(1), Some(text("loaded"))).unwrap();

        let seen = waiter.join().unwrap().unwrap();
        assert_eq!(seen.downcast_ref::<String>().unwrap(), "loaded");
        assert!(!cache.is_locked(&key(1)));
    }

    #[test]
    fn test_independent_keys_do_not_contend() {
        let cache = blocking(Some(Duration::from_millis(50)));
        assert!(cache.get(&key(1)).unwrap().is_none());

        let other = Arc::clone(&cache);
        let result = thread::spawn(move || {
            let miss = other.get(&key(2));
            other.release_lock(&key(2)).unwrap();
            miss
        })
        .join()
        .unwrap();

        assert!(result.unwrap().is_none());
        cache.release_lock(&key(1)).unwrap();
    }
}
