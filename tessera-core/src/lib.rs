//! Tessera Core - Shared Types
//!
//! Keys, values, error taxonomy and cache settings shared by the cache and
//! query crates. This crate contains no cache behavior.

pub mod config;
pub mod error;
pub mod key;
pub mod value;

pub use config::{
    CacheSettings, EvictionPolicy, DEFAULT_CAPACITY, DEFAULT_CLEAR_INTERVAL, DEFAULT_HARD_LINKS,
};
pub use error::{
    CacheError, CacheResult, ConfigError, ExecutorError, TesseraError, TesseraResult,
};
pub use key::{CacheKey, CacheKeyBuilder, KeyComponent};
pub use value::{CacheValue, Snapshot, SnapshotError, WeakCacheValue};
