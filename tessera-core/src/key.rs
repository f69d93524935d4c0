//! Composite cache keys for cached query results.
//!
//! A key is assembled by folding components into a [`CacheKeyBuilder`] and
//! then frozen with [`CacheKeyBuilder::build`]. Only a frozen [`CacheKey`] is
//! hashable, so a key that has been used for a lookup can never be extended
//! in place. [`CacheKey::to_builder`] starts a new builder from a copy.
//!
//! Equality is order sensitive: folding `a` then `b` yields a different key
//! than folding `b` then `a`.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

const DEFAULT_MULTIPLIER: u64 = 37;
const DEFAULT_HASHCODE: u64 = 17;

// ============================================================================
// KEY COMPONENTS
// ============================================================================

/// A single value folded into a cache key.
///
/// Floats are stored by bit pattern so that components stay `Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyComponent {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<KeyComponent>),
}

impl KeyComponent {
    /// Hash contribution of this component. `Null` always contributes 1.
    fn base_hash(&self) -> u64 {
        match self {
            KeyComponent::Null => 1,
            other => {
                let mut hasher = DefaultHasher::new();
                other.hash(&mut hasher);
                hasher.finish()
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, KeyComponent::Null)
    }
}

impl fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyComponent::Null => write!(f, "null"),
            KeyComponent::Bool(b) => write!(f, "{}", b),
            KeyComponent::Int(i) => write!(f, "{}", i),
            KeyComponent::UInt(u) => write!(f, "{}", u),
            KeyComponent::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            KeyComponent::Text(s) => write!(f, "{}", s),
            KeyComponent::Bytes(b) => write!(f, "{:?}", b),
            KeyComponent::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for KeyComponent {
    fn from(value: &str) -> Self {
        KeyComponent::Text(value.to_string())
    }
}

impl From<String> for KeyComponent {
    fn from(value: String) -> Self {
        KeyComponent::Text(value)
    }
}

impl From<&String> for KeyComponent {
    fn from(value: &String) -> Self {
        KeyComponent::Text(value.clone())
    }
}

impl From<bool> for KeyComponent {
    fn from(value: bool) -> Self {
        KeyComponent::Bool(value)
    }
}

impl From<i32> for KeyComponent {
    fn from(value: i32) -> Self {
        KeyComponent::Int(i64::from(value))
    }
}

impl From<i64> for KeyComponent {
    fn from(value: i64) -> Self {
        KeyComponent::Int(value)
    }
}

impl From<u32> for KeyComponent {
    fn from(value: u32) -> Self {
        KeyComponent::UInt(u64::from(value))
    }
}

impl From<u64> for KeyComponent {
    fn from(value: u64) -> Self {
        KeyComponent::UInt(value)
    }
}

impl From<usize> for KeyComponent {
    fn from(value: usize) -> Self {
        KeyComponent::UInt(value as u64)
    }
}

impl From<f64> for KeyComponent {
    fn from(value: f64) -> Self {
        KeyComponent::Float(value.to_bits())
    }
}

impl From<Vec<u8>> for KeyComponent {
    fn from(value: Vec<u8>) -> Self {
        KeyComponent::Bytes(value)
    }
}

impl From<Vec<KeyComponent>> for KeyComponent {
    fn from(value: Vec<KeyComponent>) -> Self {
        KeyComponent::List(value)
    }
}

impl<T: Into<KeyComponent>> From<Option<T>> for KeyComponent {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyComponent::Null)
    }
}

impl From<serde_json::Value> for KeyComponent {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => KeyComponent::Null,
            Value::Bool(b) => KeyComponent::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    KeyComponent::Int(i)
                } else if let Some(u) = n.as_u64() {
                    KeyComponent::UInt(u)
                } else {
                    KeyComponent::Float(n.as_f64().unwrap_or(f64::NAN).to_bits())
                }
            }
            Value::String(s) => KeyComponent::Text(s),
            Value::Array(items) => {
                KeyComponent::List(items.into_iter().map(KeyComponent::from).collect())
            }
            // Object maps are ordered, so the rendering is canonical.
            object @ Value::Object(_) => KeyComponent::Text(object.to_string()),
        }
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Mutable accumulator for a [`CacheKey`].
///
/// The running hash and checksum are updated incrementally on every fold.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    hashcode: u64,
    checksum: u64,
    components: Vec<KeyComponent>,
}

impl Default for CacheKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self {
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            components: Vec::new(),
        }
    }

    /// Fold one component into the key.
    pub fn update(&mut self, component: impl Into<KeyComponent>) -> &mut Self {
        let component = component.into();
        let base_hash = component.base_hash();

        self.components.push(component);
        let count = self.components.len() as u64;
        self.checksum = self.checksum.wrapping_add(base_hash);
        let weighted = base_hash.wrapping_mul(count);
        self.hashcode = DEFAULT_MULTIPLIER
            .wrapping_mul(self.hashcode)
            .wrapping_add(weighted);
        self
    }

    /// Fold every component of `components`, in iteration order.
    pub fn update_all<I, C>(&mut self, components: I) -> &mut Self
    where
        I: IntoIterator<Item = C>,
        C: Into<KeyComponent>,
    {
        for component in components {
            self.update(component);
        }
        self
    }

    /// Consuming variant of [`update`](Self::update) for chained construction.
    pub fn with(mut self, component: impl Into<KeyComponent>) -> Self {
        self.update(component);
        self
    }

    pub fn update_count(&self) -> usize {
        self.components.len()
    }

    /// Freeze the builder into an immutable key.
    pub fn build(self) -> CacheKey {
        CacheKey {
            inner: Arc::new(KeyInner {
                hashcode: self.hashcode,
                checksum: self.checksum,
                components: self.components.into_boxed_slice(),
                null_surrogate: false,
            }),
        }
    }
}

// ============================================================================
// FROZEN KEY
// ============================================================================

/// Immutable, cheaply clonable cache key.
#[derive(Clone)]
pub struct CacheKey {
    inner: Arc<KeyInner>,
}

struct KeyInner {
    hashcode: u64,
    checksum: u64,
    components: Box<[KeyComponent]>,
    null_surrogate: bool,
}

impl CacheKey {
    /// Start building a new key.
    pub fn builder() -> CacheKeyBuilder {
        CacheKeyBuilder::new()
    }

    /// Sentinel key for "no key" situations. Equal only to other null keys.
    pub fn null() -> Self {
        Self {
            inner: Arc::new(KeyInner {
                hashcode: DEFAULT_HASHCODE,
                checksum: 0,
                components: Box::new([]),
                null_surrogate: true,
            }),
        }
    }

    pub fn is_null(&self) -> bool {
        self.inner.null_surrogate
    }

    pub fn update_count(&self) -> usize {
        self.inner.components.len()
    }

    pub fn components(&self) -> &[KeyComponent] {
        &self.inner.components
    }

    /// Start a new builder seeded with this key's components.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NullKeyUpdate`] for the null sentinel.
    pub fn to_builder(&self) -> CacheResult<CacheKeyBuilder> {
        if self.is_null() {
            return Err(CacheError::NullKeyUpdate);
        }
        Ok(CacheKeyBuilder {
            hashcode: self.inner.hashcode,
            checksum: self.inner.checksum,
            components: self.inner.components.to_vec(),
        })
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        let (a, b) = (&self.inner, &other.inner);
        if a.null_surrogate || b.null_surrogate {
            return a.null_surrogate && b.null_surrogate;
        }
        a.hashcode == b.hashcode
            && a.checksum == b.checksum
            && a.components.len() == b.components.len()
            && a.components == b.components
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.inner.hashcode);
        state.write_u8(u8::from(self.inner.null_surrogate));
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "null-key");
        }
        write!(f, "{}:{}", self.inner.hashcode, self.inner.checksum)?;
        for component in self.inner.components.iter() {
            write!(f, ":{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self)
    }
}
