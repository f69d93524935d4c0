//! Unbounded base store.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;
use tessera_core::{CacheKey, CacheResult, CacheValue};

use crate::traits::Cache;

/// Plain map-backed cache with no eviction.
///
/// Every decorator chain bottoms out in one of these. Two perpetual caches
/// are equal when their ids are equal, regardless of contents.
pub struct PerpetualCache {
    id: String,
    entries: RwLock<HashMap<CacheKey, Option<CacheValue>>>,
}

impl PerpetualCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// True if `key` has an entry, including a stored absence.
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Drop every entry. Same effect as [`Cache::clear`] without the result.
    pub fn clear_entries(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&self, key: CacheKey, value: Option<CacheValue>) -> CacheResult<()> {
        self.entries.write().insert(key, value);
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        Ok(self.entries.read().get(key).cloned().flatten())
    }

    fn remove(&self, key: &CacheKey) -> CacheResult<Option<CacheValue>> {
        Ok(self.entries.write().remove(key).flatten())
    }

    fn clear(&self) -> CacheResult<()> {
        self.clear_entries();
        Ok(())
    }

    fn size(&self) -> CacheResult<usize> {
        Ok(self.len())
    }
}

impl PartialEq for PerpetualCache {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PerpetualCache {}

impl Hash for PerpetualCache {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PerpetualCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerpetualCache")
            .field("id", &self.id)
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{key, text};

    #[test]
    fn test_put_get_remove() {
        let cache = PerpetualCache::new("users");
        cache.put(key(1), Some(text("ada"))).unwrap();

        let hit = cache.get(&key(1)).unwrap().unwrap();
        assert_eq!(hit.downcast_ref::<String>().unwrap(), "ada");
        assert!(cache.get(&key(2)).unwrap().is_none());

        let removed = cache.remove(&key(1)).unwrap().unwrap();
        assert_eq!(removed.downcast_ref::<String>().unwrap(), "ada");
        assert_eq!(cache.size().unwrap(), 0);
    }

    #[test]
    fn test_stored_absence_counts_toward_size() {
        let cache = PerpetualCache::new("users");
        cache.put(key(1), None).unwrap();

        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(cache.contains_key(&key(1)));
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let cache = PerpetualCache::new("users");
        cache.put(key(1), Some(text("ada"))).unwrap();
        cache.put(key(1), Some(text("grace"))).unwrap();

        assert_eq!(cache.size().unwrap(), 1);
        let hit = cache.get(&key(1)).unwrap().unwrap();
        assert_eq!(hit.downcast_ref::<String>().unwrap(), "grace");
    }

    #[test]
    fn test_equality_by_id() {
        let a = PerpetualCache::new("users");
        let b = PerpetualCache::new("users");
        b.put(key(1), None).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, PerpetualCache::new("orders"));
    }

    #[test]
    fn test_clear_and_release_lock_noop() {
        let cache = PerpetualCache::new("users");
        cache.put(key(1), Some(text("ada"))).unwrap();
        cache.release_lock(&key(1)).unwrap();
        assert_eq!(cache.size().unwrap(), 1);

        cache.clear().unwrap();
        assert_eq!(cache.size().unwrap(), 0);
        assert!(cache.stats().is_none());
    }

    #[test]
    fn test_clear_entries_drops_values_and_absences() {
        let cache = PerpetualCache::new("users");
        cache.put(key(1), Some(text("ada"))).unwrap();
        cache.put(key(2), None).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear_entries();
        assert!(cache.is_empty());
        assert!(!cache.contains_key(&key(2)));
    }
}
