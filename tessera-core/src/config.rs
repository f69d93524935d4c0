//! Cache namespace settings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default capacity for the bounded eviction policies.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default number of hard links kept by the reference-based policies.
pub const DEFAULT_HARD_LINKS: usize = 256;

/// Default interval for scheduled clearing when none is configured.
pub const DEFAULT_CLEAR_INTERVAL: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// EVICTION POLICY
// ============================================================================

/// Eviction decorator applied directly around the base store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    Lru,
    /// First in, first out
    Fifo,
    /// Entries survive until they go idle, then become reclaimable
    Soft,
    /// Entries survive only while something else holds them
    Weak,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Fifo => "FIFO",
            EvictionPolicy::Soft => "SOFT",
            EvictionPolicy::Weak => "WEAK",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LRU" => Ok(EvictionPolicy::Lru),
            "FIFO" => Ok(EvictionPolicy::Fifo),
            "SOFT" => Ok(EvictionPolicy::Soft),
            "WEAK" => Ok(EvictionPolicy::Weak),
            _ => Err(ConfigError::UnknownEviction {
                name: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// CACHE SETTINGS
// ============================================================================

/// Per-namespace cache configuration.
///
/// `read_only = false` (the default) implies the serialization decorator, so
/// every reader gets its own copy. Read-only caches hand out the same shared
/// value to all readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub eviction: EvictionPolicy,
    /// Capacity of the eviction policy. `None` keeps the policy's default.
    pub size: Option<usize>,
    /// Interval for scheduled clearing. `None` disables it.
    pub flush_interval: Option<Duration>,
    pub read_only: bool,
    pub blocking: bool,
    /// Lock acquisition timeout for blocking caches. `None` waits forever.
    pub blocking_timeout: Option<Duration>,
    /// Open property bag handed to custom decorators.
    pub properties: BTreeMap<String, String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::Lru,
            size: None,
            flush_interval: None,
            read_only: false,
            blocking: false,
            blocking_timeout: None,
            properties: BTreeMap::new(),
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = Some(timeout);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// True when the serialization decorator should be applied.
    pub fn read_write(&self) -> bool {
        !self.read_only
    }

    /// Check the settings for values the builder cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.flush_interval == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "flush_interval".to_string(),
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
        // Snapshots have no owner outside the cache, so a weak handle to one
        // is reclaimed as soon as it is stored.
        if self.eviction == EvictionPolicy::Weak && self.read_write() {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "eviction = WEAK".to_string(),
                option_b: "read_only = false".to_string(),
            });
        }
        Ok(())
    }
}
