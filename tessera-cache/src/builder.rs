//! Assembles a namespace cache from its settings.
//!
//! Decorators are applied innermost first:
//!
//! 1. base store ([`PerpetualCache`] unless a custom implementation is given)
//! 2. eviction policy, sized by `size` when set
//! 3. custom decorators, in the order they were added
//! 4. serialization, for read-write caches
//! 5. logging (hit-ratio statistics)
//! 6. synchronization
//! 7. scheduled clearing, when a clear interval is set
//! 8. blocking, when enabled
//!
//! A custom implementation is taken as fully formed: it only receives the
//! logging decorator.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tessera_core::{CacheSettings, ConfigError, EvictionPolicy, TesseraResult};

use crate::decorators::{
    BlockingCache, FifoCache, LoggingCache, LruCache, ReferenceCache, ScheduledCache,
    SerializedCache, SynchronizedCache,
};
use crate::perpetual::PerpetualCache;
use crate::traits::Cache;

/// Open property bag handed to custom implementations and decorators.
pub type Properties = BTreeMap<String, String>;

/// Creates a base store for the given cache id.
pub type CacheFactory =
    Arc<dyn Fn(&str, &Properties) -> TesseraResult<Arc<dyn Cache>> + Send + Sync>;

/// Wraps a cache in a custom decorator.
pub type DecoratorFactory =
    Arc<dyn Fn(Arc<dyn Cache>, &Properties) -> TesseraResult<Arc<dyn Cache>> + Send + Sync>;

/// Builder for a decorated namespace cache.
#[derive(Clone)]
pub struct CacheBuilder {
    id: String,
    implementation: Option<CacheFactory>,
    eviction: EvictionPolicy,
    decorators: Vec<DecoratorFactory>,
    size: Option<usize>,
    clear_interval: Option<Duration>,
    read_write: bool,
    blocking: bool,
    blocking_timeout: Option<Duration>,
    properties: Properties,
}

impl CacheBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: None,
            eviction: EvictionPolicy::default(),
            decorators: Vec::new(),
            size: None,
            clear_interval: None,
            read_write: true,
            blocking: false,
            blocking_timeout: None,
            properties: Properties::new(),
        }
    }

    /// Start from namespace settings.
    pub fn from_settings(id: impl Into<String>, settings: &CacheSettings) -> Self {
        let mut builder = Self::new(id)
            .eviction(settings.eviction)
            .read_write(settings.read_write())
            .blocking(settings.blocking)
            .properties(settings.properties.clone());
        builder.size = settings.size;
        builder.clear_interval = settings.flush_interval;
        builder.blocking_timeout = settings.blocking_timeout;
        builder
    }

    pub fn implementation<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str, &Properties) -> TesseraResult<Arc<dyn Cache>> + Send + Sync + 'static,
    {
        self.implementation = Some(Arc::new(factory));
        self
    }

    pub fn eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn add_decorator<F>(mut self, factory: F) -> Self
    where
        F: Fn(Arc<dyn Cache>, &Properties) -> TesseraResult<Arc<dyn Cache>>
            + Send
            + Sync
            + 'static,
    {
        self.decorators.push(Arc::new(factory));
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn clear_interval(mut self, interval: Duration) -> Self {
        self.clear_interval = Some(interval);
        self
    }

    pub fn read_write(mut self, read_write: bool) -> Self {
        self.read_write = read_write;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = Some(timeout);
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn build(self) -> TesseraResult<Arc<dyn Cache>> {
        self.validate()?;

        if let Some(factory) = &self.implementation {
            let base = factory(&self.id, &self.properties)?;
            if base.id() != self.id {
                return Err(ConfigError::InvalidValue {
                    field: "implementation".to_string(),
                    value: base.id().to_string(),
                    reason: format!("cache id must be '{}'", self.id),
                }
                .into());
            }
            tracing::debug!(cache_id = %self.id, "Built custom cache");
            return Ok(Arc::new(LoggingCache::new(base)));
        }

        let base: Arc<dyn Cache> = Arc::new(PerpetualCache::new(self.id.clone()));
        let mut cache = self.apply_eviction(base)?;
        for decorator in &self.decorators {
            cache = decorator(cache, &self.properties)?;
        }
        if self.read_write {
            cache = Arc::new(SerializedCache::new(cache));
        }
        cache = Arc::new(LoggingCache::new(cache));
        cache = Arc::new(SynchronizedCache::new(cache));
        if let Some(interval) = self.clear_interval {
            cache = Arc::new(ScheduledCache::with_interval(cache, interval));
        }
        if self.blocking {
            cache = Arc::new(match self.blocking_timeout {
                Some(timeout) => BlockingCache::with_timeout(cache, timeout),
                None => BlockingCache::new(cache),
            });
        }

        tracing::debug!(
            cache_id = %self.id,
            eviction = %self.eviction,
            size = ?self.size,
            read_write = self.read_write,
            blocking = self.blocking,
            decorators = self.decorators.len(),
            "Built cache"
        );
        Ok(cache)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "id".to_string(),
            });
        }
        if self.size == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.clear_interval == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "clear_interval".to_string(),
                value: "0s".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.blocking_timeout.is_some() && !self.blocking {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "blocking_timeout".to_string(),
                option_b: "blocking = false".to_string(),
            });
        }
        let weak_read_write = self.eviction == EvictionPolicy::Weak && self.read_write;
        if self.implementation.is_none() && weak_read_write {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "eviction = WEAK".to_string(),
                option_b: "read_write = true".to_string(),
            });
        }
        Ok(())
    }

    fn apply_eviction(&self, base: Arc<dyn Cache>) -> Result<Arc<dyn Cache>, ConfigError> {
        let cache: Arc<dyn Cache> = match self.eviction {
            EvictionPolicy::Lru => match self.size {
                Some(size) => {
                    let capacity = NonZeroUsize::new(size).ok_or_else(|| ConfigError::InvalidValue {
                        field: "size".to_string(),
                        value: size.to_string(),
                        reason: "must be greater than zero".to_string(),
                    })?;
                    Arc::new(LruCache::with_capacity(base, capacity))
                }
                None => Arc::new(LruCache::new(base)),
            },
            EvictionPolicy::Fifo => match self.size {
                Some(size) => Arc::new(FifoCache::with_capacity(base, size)),
                None => Arc::new(FifoCache::new(base)),
            },
            EvictionPolicy::Soft => {
                let soft = ReferenceCache::soft(base);
                Arc::new(match self.size {
                    Some(size) => soft.with_hard_links(size),
                    None => soft,
                })
            }
            EvictionPolicy::Weak => {
                let weak = ReferenceCache::weak(base);
                Arc::new(match self.size {
                    Some(size) => weak.with_hard_links(size),
                    None => weak,
                })
            }
        };
        Ok(cache)
    }
}

impl fmt::Debug for CacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("id", &self.id)
            .field("custom_implementation", &self.implementation.is_some())
            .field("eviction", &self.eviction)
            .field("decorators", &self.decorators.len())
            .field("size", &self.size)
            .field("clear_interval", &self.clear_interval)
            .field("read_write", &self.read_write)
            .field("blocking", &self.blocking)
            .field("blocking_timeout", &self.blocking_timeout)
            .field("properties", &self.properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{key, row, text, Row};
    use tessera_core::{CacheError, TesseraError};

    #[test]
    fn test_default_chain_is_read_write_lru() {
        let cache = CacheBuilder::new("users").size(2).build().unwrap();
        assert_eq!(cache.id(), "users");

        let original = row(1, "ada");
        cache.put(key(1), Some(original.clone())).unwrap();
        let hit = cache.get(&key(1)).unwrap().unwrap();
        assert_eq!(hit.downcast_ref::<Row>(), original.downcast_ref::<Row>());
        assert!(!hit.ptr_eq(&original));

        cache.put(key(2), Some(row(2, "grace"))).unwrap();
        cache.put(key(3), Some(row(3, "alan"))).unwrap();
        assert_eq!(cache.size().unwrap(), 2);
        assert!(cache.get(&key(1)).unwrap().is_none());
    }

    #[test]
    fn test_read_write_rejects_plain_values() {
        let cache = CacheBuilder::new("users").build().unwrap();
        let err = cache.put(key(1), Some(text("plain"))).unwrap_err();
        assert!(matches!(err, CacheError::NotSerializable { .. }));
    }

    #[test]
    fn test_read_only_shares_instances() {
        let cache = CacheBuilder::new("users").read_write(false).build().unwrap();
        let value = text("shared");
        cache.put(key(1), Some(value.clone())).unwrap();
        assert!(cache.get(&key(1)).unwrap().unwrap().ptr_eq(&value));
    }

    #[test]
    fn test_stats_reachable_from_outermost_cache() {
        let cache = CacheBuilder::new("users")
            .read_write(false)
            .blocking(true)
            .clear_interval(Duration::from_secs(60))
            .build()
            .unwrap();
        cache.put(key(1), Some(text("a"))).unwrap();
        cache.get(&key(1)).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_fifo_policy_from_settings() {
        let settings = CacheSettings::new()
            .with_eviction(EvictionPolicy::Fifo)
            .with_size(1)
            .with_read_only(true);
        let cache = CacheBuilder::from_settings("orders", &settings).build().unwrap();

        cache.put(key(1), Some(text("a"))).unwrap();
        cache.get(&key(1)).unwrap();
        cache.put(key(2), Some(text("b"))).unwrap();
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(cache.get(&key(2)).unwrap().is_some());
    }

    #[test]
    fn test_custom_decorators_applied_in_order() {
        let cache = CacheBuilder::new("users")
            .read_write(false)
            .property("prefix", "tenant-")
            .add_decorator(|inner, props| {
                assert_eq!(props.get("prefix").map(String::as_str), Some("tenant-"));
                Ok(Arc::new(FifoCache::with_capacity(inner, 1)) as Arc<dyn Cache>)
            })
            .build()
            .unwrap();

        cache.put(key(1), Some(text("a"))).unwrap();
        cache.put(key(2), Some(text("b"))).unwrap();
        assert_eq!(cache.size().unwrap(), 1);
    }

    #[test]
    fn test_custom_implementation_only_gets_logging() {
        let cache = CacheBuilder::new("custom")
            .size(1)
            .implementation(|id, _| Ok(Arc::new(PerpetualCache::new(id)) as Arc<dyn Cache>))
            .build()
            .unwrap();

        // No eviction and no serialization around a custom store.
        cache.put(key(1), Some(text("a"))).unwrap();
        cache.put(key(2), Some(text("b"))).unwrap();
        assert_eq!(cache.size().unwrap(), 2);
        assert!(cache.stats().is_some());
    }

    #[test]
    fn test_custom_implementation_must_keep_id() {
        let err = CacheBuilder::new("custom")
            .implementation(|_, _| Ok(Arc::new(PerpetualCache::new("other")) as Arc<dyn Cache>))
            .build()
            .err().unwrap();
        assert!(matches!(err, TesseraError::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        assert!(matches!(
            CacheBuilder::new("users").size(0).build(),
            Err(TesseraError::Config(ConfigError::InvalidValue { .. }))
        ));
        assert!(matches!(
            CacheBuilder::new("").build(),
            Err(TesseraError::Config(ConfigError::MissingRequired { .. }))
        ));
        assert!(matches!(
            CacheBuilder::new("users")
                .blocking_timeout(Duration::from_secs(1))
                .build(),
            Err(TesseraError::Config(ConfigError::IncompatibleOptions { .. }))
        ));
    }

    #[test]
    fn test_weak_policy_builds() {
        let cache = CacheBuilder::new("weak")
            .eviction(EvictionPolicy::Weak)
            .read_write(false)
            .size(4)
            .build()
            .unwrap();
        let held = text("held");
        cache.put(key(1), Some(held.clone())).unwrap();
        assert!(cache.get(&key(1)).unwrap().unwrap().ptr_eq(&held));
    }

    #[test]
    fn test_weak_policy_with_read_write_rejected() {
        let err = CacheBuilder::new("weak")
            .eviction(EvictionPolicy::Weak)
            .build()
            .err().unwrap();
        assert!(matches!(
            err,
            TesseraError::Config(ConfigError::IncompatibleOptions { .. })
        ));

        let settings = CacheSettings::new().with_eviction(EvictionPolicy::Weak);
        assert!(CacheBuilder::from_settings("weak", &settings).build().is_err());
    }

    #[test]
    fn test_weak_read_only_hit_after_commit() {
        let cache = CacheBuilder::new("weak")
            .eviction(EvictionPolicy::Weak)
            .read_write(false)
            .build()
            .unwrap();
        let held = text("held");

        let mut tcm = crate::manager::TransactionalCacheManager::new();
        tcm.put_object(&cache, key(1), Some(held.clone()));
        tcm.commit().unwrap();

        assert!(cache.get(&key(1)).unwrap().unwrap().ptr_eq(&held));
    }
}
