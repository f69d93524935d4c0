//! Type-erased cache values.
//!
//! Decorators pass values around without knowing their concrete type, the
//! same way the query layer hands opaque result lists to the cache. A
//! [`CacheValue`] is an `Arc<dyn Any + Send + Sync>` plus, for values built
//! with [`CacheValue::serializable`], a serde codec that lets the
//! serialization decorator snapshot and restore the value without a type
//! registry.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

type Erased = dyn Any + Send + Sync + 'static;

/// Monomorphized encode/decode entry points for one concrete type.
#[derive(Clone, Copy)]
struct Codec {
    encode: fn(&Erased) -> Result<Vec<u8>, String>,
    decode: fn(&[u8]) -> Result<Arc<Erased>, String>,
}

impl Codec {
    fn of<T>() -> Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        Self {
            encode: encode_erased::<T>,
            decode: decode_erased::<T>,
        }
    }
}

fn encode_erased<T: Serialize + Any>(value: &Erased) -> Result<Vec<u8>, String> {
    let typed = value
        .downcast_ref::<T>()
        .ok_or_else(|| format!("value is not a {}", type_name::<T>()))?;
    serde_json::to_vec(typed).map_err(|e| e.to_string())
}

fn decode_erased<T: DeserializeOwned + Any + Send + Sync>(
    bytes: &[u8],
) -> Result<Arc<Erased>, String> {
    let typed: T = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    let erased: Arc<Erased> = Arc::new(typed);
    Ok(erased)
}

/// Errors raised while snapshotting or restoring a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("type {type_name} is not declared serializable")]
    NotSerializable { type_name: &'static str },

    #[error("encoding {type_name} failed: {reason}")]
    Encode {
        type_name: &'static str,
        reason: String,
    },

    #[error("decoding {type_name} failed: {reason}")]
    Decode {
        type_name: &'static str,
        reason: String,
    },
}

// ============================================================================
// CACHE VALUE
// ============================================================================

/// Opaque, shared cache value.
#[derive(Clone)]
pub struct CacheValue {
    inner: Arc<Erased>,
    type_name: &'static str,
    codec: Option<Codec>,
}

impl CacheValue {
    /// Wrap a value that will only ever be shared by reference.
    ///
    /// Such values cannot pass through the serialization decorator.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an existing `Arc` without copying the value.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: type_name::<T>(),
            codec: None,
        }
    }

    /// Wrap a value that can be snapshotted to bytes and restored.
    pub fn serializable<T>(value: T) -> Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
            codec: Some(Codec::of::<T>()),
        }
    }

    pub fn is_serializable(&self) -> bool {
        self.codec.is_some()
    }

    /// Name of the concrete type this value was built from.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Recover a typed `Arc` sharing this value's allocation.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// True when both values point at the same allocation.
    pub fn ptr_eq(&self, other: &CacheValue) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn downgrade(&self) -> WeakCacheValue {
        WeakCacheValue {
            inner: Arc::downgrade(&self.inner),
            type_name: self.type_name,
            codec: self.codec,
        }
    }

    /// Deep-copy this value into an immutable byte snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, SnapshotError> {
        let codec = self.codec.ok_or(SnapshotError::NotSerializable {
            type_name: self.type_name,
        })?;
        let bytes = (codec.encode)(self.inner.as_ref()).map_err(|reason| SnapshotError::Encode {
            type_name: self.type_name,
            reason,
        })?;
        Ok(Snapshot {
            bytes: bytes.into(),
            type_name: self.type_name,
            codec,
        })
    }
}

impl fmt::Debug for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheValue")
            .field("type_name", &self.type_name)
            .field("serializable", &self.codec.is_some())
            .finish()
    }
}

/// Non-owning handle to a [`CacheValue`].
#[derive(Clone)]
pub struct WeakCacheValue {
    inner: Weak<Erased>,
    type_name: &'static str,
    codec: Option<Codec>,
}

impl WeakCacheValue {
    /// Recover the value if any strong reference is still alive.
    pub fn upgrade(&self) -> Option<CacheValue> {
        self.inner.upgrade().map(|inner| CacheValue {
            inner,
            type_name: self.type_name,
            codec: self.codec,
        })
    }

    pub fn is_reclaimed(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl fmt::Debug for WeakCacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCacheValue")
            .field("type_name", &self.type_name)
            .field("reclaimed", &self.is_reclaimed())
            .finish()
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable serialized form of a [`CacheValue`].
#[derive(Clone)]
pub struct Snapshot {
    bytes: Arc<[u8]>,
    type_name: &'static str,
    codec: Codec,
}

impl Snapshot {
    /// Build a snapshot of raw bytes that will be materialized as `T`.
    pub fn from_bytes<T>(bytes: Vec<u8>) -> Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        Self {
            bytes: bytes.into(),
            type_name: type_name::<T>(),
            codec: Codec::of::<T>(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Materialize a fresh, independent value from the snapshot.
    pub fn materialize(&self) -> Result<CacheValue, SnapshotError> {
        let inner = (self.codec.decode)(&self.bytes).map_err(|reason| SnapshotError::Decode {
            type_name: self.type_name,
            reason,
        })?;
        Ok(CacheValue {
            inner,
            type_name: self.type_name,
            codec: Some(self.codec),
        })
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("type_name", &self.type_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}
