//! Cache decorators.
//!
//! Each decorator wraps an `Arc<dyn Cache>` delegate and layers exactly one
//! concern on top of it. The builder composes them in a fixed order; see
//! [`crate::builder::CacheBuilder`].

pub mod blocking;
pub mod fifo;
pub mod logging;
pub mod lru;
pub mod reference;
pub mod scheduled;
pub mod serialized;
pub mod synchronized;

pub use self::blocking::BlockingCache;
pub use self::fifo::FifoCache;
pub use self::logging::LoggingCache;
pub use self::lru::LruCache;
pub use self::reference::{Reachability, ReferenceCache, DEFAULT_SOFT_RETENTION};
pub use self::scheduled::ScheduledCache;
pub use self::serialized::SerializedCache;
pub use self::synchronized::SynchronizedCache;
