//! Tessera Cache - Decorated Second-Level Cache
//!
//! Namespace-scoped shared caches built from a base store wrapped in
//! decorators (eviction, serialization, statistics, locking, scheduled
//! clearing), plus the per-unit-of-work transactional buffer that keeps
//! uncommitted writes out of the shared cache.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheBuilder::new("users").size(512).build()?;
//! let mut tcm = TransactionalCacheManager::new();
//! tcm.put_object(&cache, key, Some(CacheValue::serializable(rows)));
//! tcm.commit()?;
//! ```

pub mod builder;
pub mod decorators;
pub mod manager;
pub mod perpetual;
pub mod registry;
pub mod traits;
pub mod transactional;

pub use builder::{CacheBuilder, CacheFactory, DecoratorFactory, Properties};
pub use decorators::{
    BlockingCache, FifoCache, LoggingCache, LruCache, Reachability, ReferenceCache,
    ScheduledCache, SerializedCache, SynchronizedCache, DEFAULT_SOFT_RETENTION,
};
pub use manager::TransactionalCacheManager;
pub use perpetual::PerpetualCache;
pub use registry::CacheRegistry;
pub use traits::{Cache, CacheStats};
pub use transactional::TransactionalCache;
