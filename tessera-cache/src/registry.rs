//! Namespace-to-cache registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_core::{CacheResult, CacheSettings, ConfigError, TesseraResult};

use crate::builder::CacheBuilder;
use crate::traits::Cache;

/// Holds the shared cache of every configured namespace.
///
/// A namespace may also borrow another namespace's cache through
/// [`CacheRegistry::resolve_ref`], so several statement groups share one
/// cache and invalidate each other.
#[derive(Default)]
pub struct CacheRegistry {
    caches: RwLock<HashMap<String, Arc<dyn Cache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache under its own id.
    pub fn add_cache(&self, cache: Arc<dyn Cache>) -> Result<(), ConfigError> {
        let mut caches = self.caches.write();
        let id = cache.id().to_string();
        if caches.contains_key(&id) {
            return Err(ConfigError::DuplicateNamespace { namespace: id });
        }
        tracing::debug!(cache_id = %id, "Registered cache");
        caches.insert(id, cache);
        Ok(())
    }

    /// Build a cache for `namespace` from `settings` and register it.
    pub fn build_cache(
        &self,
        namespace: &str,
        settings: &CacheSettings,
    ) -> TesseraResult<Arc<dyn Cache>> {
        settings.validate()?;
        let cache = CacheBuilder::from_settings(namespace, settings).build()?;
        self.add_cache(Arc::clone(&cache))?;
        Ok(cache)
    }

    pub fn get_cache(&self, namespace: &str) -> Option<Arc<dyn Cache>> {
        self.caches.read().get(namespace).cloned()
    }

    /// Look up the cache another namespace refers to.
    pub fn resolve_ref(&self, namespace: &str) -> Result<Arc<dyn Cache>, ConfigError> {
        self.get_cache(namespace)
            .ok_or_else(|| ConfigError::UnknownNamespace {
                namespace: namespace.to_string(),
            })
    }

    pub fn has_cache(&self, namespace: &str) -> bool {
        self.caches.read().contains_key(namespace)
    }

    /// Registered namespace ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.caches.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }

    /// Clear every registered cache.
    pub fn clear_all(&self) -> CacheResult<()> {
        let caches: Vec<Arc<dyn Cache>> = self.caches.read().values().cloned().collect();
        for cache in caches {
            cache.clear()?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("namespaces", &self.ids())
            .finish()
    }
}
