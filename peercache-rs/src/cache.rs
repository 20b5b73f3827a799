//! Provides the thread-safe cache which keeps the values of a group.
//!
//! A [Cache] simply wraps an [LRUCache](crate::lru::LRUCache) in a mutex. The lock is only ever
//! held for a single map operation and never while a value is being fetched. Also the underlying
//! LRU cache is only created once the first value is stored, therefore a group which is only
//! queried (e.g. because all of its keys are owned by other peers) never allocates a cache.
use std::sync::Mutex;

use crate::byteview::ByteView;
use crate::fmt::format_size;
use crate::lru::LRUCache;

/// Specifies the memory budget of a group cache if none is given explicitly (2 KiB).
pub const DEFAULT_MAX_MEMORY: usize = 2 << 10;

/// Provides a snapshot of the metrics of a [Cache].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Contains the number of entries in the cache.
    pub entries: usize,

    /// Contains the number of bytes occupied by all keys and values.
    pub allocated_memory: usize,

    /// Contains the memory budget of the cache (0 = unbounded).
    pub max_memory: usize,

    /// Contains the number of lookups.
    pub reads: usize,

    /// Contains the number of lookups which found a value.
    pub hits: usize,

    /// Contains the number of entries which were evicted to make room for others.
    pub evictions: usize,
}

/// Wraps an LRU cache of [ByteView]s so that it can be shared between threads.
///
/// # Examples
/// ```
/// # use peercache::cache::Cache;
/// # use peercache::byteview::ByteView;
/// let cache = Cache::new("test", 1024);
/// assert_eq!(cache.get("Foo"), None);
///
/// cache.add("Foo", ByteView::from("Bar"));
/// assert_eq!(cache.get("Foo").unwrap().as_slice(), b"Bar");
/// ```
pub struct Cache {
    name: String,
    max_memory: usize,
    lru: Mutex<Option<LRUCache<ByteView>>>,
}

impl Cache {
    /// Creates a new cache which may allocate up to **max_memory** bytes.
    ///
    /// The name is only used for logging.
    pub fn new(name: impl Into<String>, max_memory: usize) -> Self {
        Cache {
            name: name.into(),
            max_memory,
            lru: Mutex::new(None),
        }
    }

    /// Returns the value stored for the given key.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut lru = self.lru.lock().unwrap();
        lru.as_mut().and_then(|lru| lru.get(key).cloned())
    }

    /// Stores the given value for the given key.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut lru = self.lru.lock().unwrap();
        lru.get_or_insert_with(|| self.create_lru())
            .put(key.to_owned(), value);
    }

    fn create_lru(&self) -> LRUCache<ByteView> {
        log::debug!(
            "Creating cache for {} with a budget of {}...",
            self.name,
            format_size(self.max_memory)
        );

        let name = self.name.clone();
        LRUCache::new(self.max_memory).with_eviction_listener(Box::new(
            move |key: String, value: ByteView| {
                log::trace!("Evicted {} ({}) from {}.", key, format_size(value.len()), name);
            },
        ))
    }

    /// Removes the value stored for the given key (if present).
    pub fn remove(&self, key: &str) {
        if let Some(lru) = self.lru.lock().unwrap().as_mut() {
            lru.remove(key);
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.lru.lock().unwrap().as_ref().map_or(0, |lru| lru.len())
    }

    /// Determines if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Determines if the underlying LRU cache has been created yet.
    pub fn is_materialized(&self) -> bool {
        self.lru.lock().unwrap().is_some()
    }

    /// Returns the memory budget of this cache.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Provides a snapshot of the current metrics.
    pub fn stats(&self) -> CacheStats {
        match self.lru.lock().unwrap().as_ref() {
            Some(lru) => CacheStats {
                entries: lru.len(),
                allocated_memory: lru.allocated_memory(),
                max_memory: lru.max_memory(),
                reads: lru.reads(),
                hits: lru.hits(),
                evictions: lru.evictions(),
            },
            None => CacheStats {
                max_memory: self.max_memory,
                ..CacheStats::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::byteview::ByteView;
    use crate::cache::{Cache, DEFAULT_MAX_MEMORY};

    #[test]
    fn reads_do_not_materialize_the_cache() {
        let cache = Cache::new("test", DEFAULT_MAX_MEMORY);

        assert_eq!(cache.get("Foo"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.is_materialized(), false);
        assert_eq!(cache.stats().max_memory, DEFAULT_MAX_MEMORY);

        cache.add("Foo", ByteView::from("Bar"));
        assert_eq!(cache.is_materialized(), true);
        assert_eq!(cache.get("Foo").unwrap().to_string(), "Bar");
    }

    #[test]
    fn budget_is_passed_to_the_lru_cache() {
        let cache = Cache::new("test", 12);

        cache.add("Hello0", ByteView::from("World0"));
        cache.add("Hello1", ByteView::from("World1"));

        assert_eq!(cache.get("Hello0"), None);
        assert_eq!(cache.get("Hello1").unwrap().to_string(), "World1");

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.allocated_memory, 12);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.hits, 1);

        cache.remove("Hello1");
        assert_eq!(cache.is_empty(), true);
    }

    #[test]
    fn cache_can_be_shared_between_threads() {
        let cache = std::sync::Arc::new(Cache::new("test", 0));

        let handles: Vec<_> = (0..4)
            .map(|thread| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for index in 0..100 {
                        cache.add(
                            &format!("{}-{}", thread, index),
                            ByteView::from(format!("{}", index)),
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 400);
        assert_eq!(cache.get("3-99").unwrap().to_string(), "99");
    }
}
