//! Provides a size constrained LRU Cache.
//!
//! An LRU cache drops the least recently used entry if it is about to grow beyond its memory
//! budget. The budget is given in bytes and covers the keys as well as the values. Note that there
//! is no notion of a time to live. Entries are only ever dropped to make room for new ones or if
//! they are removed explicitly.
//!
//! Provides a generic cache which can store all kinds of values for which the [ByteSize](ByteSize)
//! trait is implemented. A group uses an [LRUCache] of [ByteView](crate::byteview::ByteView)s,
//! wrapped in a [Cache](crate::cache::Cache) to make it thread-safe.
mod lru_cache;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionListener;
pub use lru_cache::LRUCache;
