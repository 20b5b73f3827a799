use linked_hash_map::LinkedHashMap;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of memory in bytes which is accounted for this value.
    ///
    /// For byte sequences and strings this is simply the number of bytes they contain. The fields
    /// stored on the stack (length, pointer, reference counters) are not accounted.
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Represents a callback which is invoked for each entry which has been evicted.
///
/// Note that this is only invoked if an entry is dropped to make room for others. Removing an
/// entry via [LRUCache::remove] or [LRUCache::flush] will not notify the listener.
pub type EvictionListener<V> = Box<dyn FnMut(String, V) + Send>;

/// Provides a size constrained LRU cache.
///
/// A cache behaves just like a **Map** as long as there is no shortage in storage. However, if the
/// allocated memory is above the given limit, old (least recently used) entries will be evicted -
/// hence the name LRU cache. The memory of an entry is the length of its key plus the
/// [ByteSize](ByteSize) of its value.
///
/// A **max_memory** of 0 disables the limit, therefore such a cache grows without bounds.
///
/// # Examples
/// ```
/// # use peercache::lru::LRUCache;
/// // Specifies a cache which can allocate up to 1024 bytes of memory.
/// let mut lru = LRUCache::new(1024);
///
/// lru.put("Foo".to_owned(), "Bar".to_owned());
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit..
/// lru.put("Foo1".to_owned(), "X".repeat(512));
/// assert_eq!(lru.get("Foo").is_some(), true);
/// assert_eq!(lru.get("Foo1").is_some(), true);
///
/// // this will hit the max memory constraint...
/// lru.put("Foo2".to_owned(), "X".repeat(512));
/// // ..and therefore will throw the two others out:
/// assert_eq!(lru.get("Foo").is_some(), false);
/// assert_eq!(lru.get("Foo1").is_some(), false);
/// assert_eq!(lru.get("Foo2").is_some(), true);
///```
pub struct LRUCache<V: ByteSize> {
    allocated_memory: usize,
    max_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    evictions: usize,
    on_evicted: Option<EvictionListener<V>>,
    map: LinkedHashMap<String, Entry<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LRUCache<V> {
    /// Creates a new cache which stores entries until they allocated **max_memory** bytes.
    ///
    /// Use 0 to create an unbounded cache.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// let mut lru = LRUCache::new(1024);
    ///
    /// lru.put("Foo".to_owned(), "Bar".to_owned());
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    ///```
    pub fn new(max_memory: usize) -> Self {
        LRUCache {
            allocated_memory: 0,
            max_memory,
            reads: 0,
            hits: 0,
            writes: 0,
            evictions: 0,
            on_evicted: None,
            map: LinkedHashMap::new(),
        }
    }

    /// Installs a listener which is notified for each evicted entry.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let evicted_keys = evicted.clone();
    /// let mut lru = LRUCache::new(8).with_eviction_listener(Box::new(move |key: String, _: String| {
    ///     evicted_keys.lock().unwrap().push(key);
    /// }));
    ///
    /// lru.put("A".to_owned(), "123".to_owned());
    /// lru.put("B".to_owned(), "123".to_owned());
    /// lru.put("C".to_owned(), "123".to_owned());
    ///
    /// assert_eq!(*evicted.lock().unwrap(), vec!["A".to_owned()]);
    /// ```
    pub fn with_eviction_listener(mut self, listener: EvictionListener<V>) -> Self {
        self.on_evicted = Some(listener);
        self
    }

    /// Stores the given value for the given key.
    ///
    /// If a value is already present, it is replaced and the entry becomes the most recently
    /// used one. Afterwards the least recently used entries are evicted until the cache fits
    /// into its memory budget again. Note that an entry which is larger than the whole budget
    /// will therefore not remain in the cache.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// let mut lru = LRUCache::new(1024);
    ///
    /// lru.put("Foo".to_owned(), "Bar".to_owned());
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    /// assert_eq!(lru.allocated_memory(), 6);
    ///
    /// lru.put("Foo".to_owned(), "Bar1".to_owned());
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar1".to_owned());
    /// assert_eq!(lru.allocated_memory(), 7);
    ///```
    pub fn put(&mut self, key: String, value: V) {
        let entry = Entry {
            mem_size: key.len() + value.allocated_size(),
            value,
        };

        let mut delta_mem: isize = entry.mem_size as isize;

        // Note that inserting an existing key also moves it to the back of the map which is where
        // the most recently used entries live...
        if let Some(stale_entry) = self.map.insert(key, entry) {
            delta_mem -= stale_entry.mem_size as isize;
        }

        self.writes += 1;
        self.allocated_memory = (self.allocated_memory as isize + delta_mem) as usize;

        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_memory > 0 && self.allocated_memory > self.max_memory {
            match self.map.pop_front() {
                Some((key, lru_entry)) => {
                    self.allocated_memory -= lru_entry.mem_size;
                    self.evictions += 1;
                    if let Some(listener) = self.on_evicted.as_mut() {
                        listener(key, lru_entry.value);
                    }
                }
                None => unreachable!("Failed to enforce constraints of a LRU cache!"),
            }
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A successful lookup marks the entry as most recently used.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// let mut lru = LRUCache::new(1024);
    ///
    /// // After inserting a value...
    /// lru.put("Foo".to_owned(), "Bar".to_owned());
    /// // ..it can be retrieved.
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    /// assert_eq!(lru.get("Unknown"), None);
    ///```
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Removes the entry for the given key if present.
    ///
    /// In contrast to an eviction, this will not notify the eviction listener.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// let mut lru = LRUCache::new(1024);
    ///
    /// // After inserting a value...
    /// lru.put("Foo".to_owned(), "Bar".to_owned());
    /// // ..it can be retrieved.
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    ///
    /// // However, once it is removed...
    /// lru.remove("Foo");
    /// // ..it's no longer accessible.
    /// assert_eq!(lru.get("Foo"), None);
    /// assert_eq!(lru.allocated_memory(), 0);
    /// ```
    pub fn remove(&mut self, key: &str) {
        if let Some(entry) = self.map.remove(key) {
            self.writes += 1;
            self.allocated_memory -= entry.mem_size;
        }
    }

    /// Removes all entries in this cache.
    ///
    /// Note that this will also zero all metrics (reads, writes, cache hits, evictions).
    pub fn flush(&mut self) {
        self.map.clear();
        self.allocated_memory = 0;
        self.reads = 0;
        self.writes = 0;
        self.hits = 0;
        self.evictions = 0;
    }

    /// Returns the number of elements in the cache.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// let mut lru = LRUCache::new(1024);
    ///
    /// assert_eq!(lru.len(), 0);
    /// lru.put("Foo".to_owned(), "Bar".to_owned());
    /// assert_eq!(lru.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the maximal amount of memory to be occupied by this cache (0 means unbounded).
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Specifies the maximal amount of memory to be occupied by this cache.
    ///
    /// If the budget shrinks, entries are evicted right away.
    ///
    /// # Examples
    /// ```
    /// # use peercache::lru::LRUCache;
    /// let mut lru = LRUCache::new(1024);
    ///
    /// // Add some entries...
    /// lru.put("Foo0".to_owned(), "Bar".to_owned());
    /// lru.put("Foo1".to_owned(), "Bar".to_owned());
    /// lru.put("Foo2".to_owned(), "Bar".to_owned());
    /// lru.put("Foo3".to_owned(), "Bar".to_owned());
    /// lru.put("Foo4".to_owned(), "Bar".to_owned());
    /// lru.put("Foo5".to_owned(), "Bar".to_owned());
    /// assert_eq!(lru.len(), 6);
    ///
    /// // Now request that the cache is reduced to only 14 bytes...
    /// lru.set_max_memory(14);
    /// assert_eq!(lru.max_memory(), 14);
    ///
    /// // .. this will kick each but the last two entries out of the cache..
    /// assert_eq!(lru.len(), 2);
    /// ```
    pub fn set_max_memory(&mut self, max_memory: usize) {
        self.max_memory = max_memory;
        self.enforce_constraints();
    }

    /// Returns the amount of memory allocated by the keys and values of this cache.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the memory utilization in percent.
    ///
    /// An unbounded cache always reports 0%.
    pub fn memory_utilization(&self) -> f32 {
        match self.max_memory {
            0 => 0.,
            n => self.allocated_memory as f32 / n as f32 * 100.,
        }
    }

    /// Returns the cache hit rate in percent.
    ///
    /// Note that all metrics are reset when **flush()** is called.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache since the last flush.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of reads which found a value since the last flush.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the total number of writes performed on this cache since the last flush.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the number of entries which have been evicted since the last flush.
    pub fn evictions(&self) -> usize {
        self.evictions
    }
}
