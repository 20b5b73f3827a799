//! Provides a consistent hash ring which maps keys to nodes.
//!
//! Each node is placed on the ring several times (once per *replica* or *virtual node*). To
//! determine the node of a key, the key is hashed and the ring is walked clockwise until the
//! first virtual node is found. Placing each node several times smooths the distribution of keys
//! even if there are only a few nodes. Adding a node only moves the keys which now land on one of
//! its virtual nodes (roughly 1/N of all keys) instead of reshuffling everything.
//!
//! Note that nodes can only be added. If the membership of a cluster changes, a new ring is built
//! and swapped in (see [HttpPool](crate::pool::HttpPool)).
//!
//! # Examples
//! ```
//! # use peercache::consistenthash::HashRing;
//! let mut ring = HashRing::new(50);
//! ring.add(["http://10.0.0.1:2410", "http://10.0.0.2:2410"]);
//!
//! // The same key will always be mapped to the same node...
//! let node = ring.get("Tom").unwrap().to_owned();
//! assert_eq!(ring.get("Tom").unwrap(), node);
//! ```
use crate::error::{CacheError, CacheResult};
use fnv::FnvHashMap;

/// Describes the hash function which places keys and virtual nodes on the ring.
pub type HashFunction = fn(&[u8]) -> u32;

/// Specifies the default number of virtual nodes per node.
pub const DEFAULT_REPLICAS: usize = 50;

/// Maps keys to nodes using consistent hashing.
#[derive(Clone)]
pub struct HashRing {
    hash: HashFunction,
    replicas: usize,
    hashes: Vec<u32>,
    nodes: FnvHashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring which places each node **replicas** times, using CRC32 as hash.
    pub fn new(replicas: usize) -> Self {
        HashRing::with_hash(replicas, crc32fast::hash)
    }

    /// Creates an empty ring which uses the given hash function.
    ///
    /// This is mostly useful to obtain a predictable distribution in tests.
    pub fn with_hash(replicas: usize, hash: HashFunction) -> Self {
        HashRing {
            hash,
            replicas,
            hashes: Vec::new(),
            nodes: FnvHashMap::default(),
        }
    }

    /// Adds the given nodes to the ring.
    ///
    /// The i-th virtual node of a node is placed at `hash(i + node)`. If two virtual nodes collide,
    /// the node added last owns the position.
    pub fn add<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            for replica in 0..self.replicas {
                let hash = (self.hash)(format!("{}{}", replica, node).as_bytes());
                if self.nodes.insert(hash, node.to_owned()).is_none() {
                    self.hashes.push(hash);
                }
            }
        }

        self.hashes.sort_unstable();
    }

    /// Determines the node which is responsible for the given key.
    ///
    /// # Errors
    /// Fails with [CacheError::NoNodes] if no node has been added yet.
    ///
    /// # Examples
    /// ```
    /// # use peercache::consistenthash::HashRing;
    /// # use peercache::error::CacheError;
    /// let mut ring = HashRing::new(50);
    /// assert!(matches!(ring.get("Tom"), Err(CacheError::NoNodes)));
    ///
    /// ring.add(["A"]);
    /// assert_eq!(ring.get("Tom").unwrap(), "A");
    /// ```
    pub fn get(&self, key: &str) -> CacheResult<&str> {
        if self.hashes.is_empty() {
            return Err(CacheError::NoNodes);
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.hashes.partition_point(|candidate| *candidate < hash);
        let position = self.hashes[index % self.hashes.len()];

        self.nodes
            .get(&position)
            .map(String::as_str)
            .ok_or(CacheError::NoNodes)
    }

    /// Determines if no node has been added yet.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Returns the number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Returns the number of virtual nodes per node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

#[cfg(test)]
mod tests {
    use crate::consistenthash::HashRing;
    use crate::error::CacheError;
    use std::collections::HashMap;

    fn numeric_hash(key: &[u8]) -> u32 {
        std::str::from_utf8(key)
            .ok()
            .and_then(|key| key.parse().ok())
            .unwrap_or(0)
    }

    #[test]
    fn keys_are_mapped_to_the_next_virtual_node() {
        let mut ring = HashRing::with_hash(3, numeric_hash);

        // Given the above hash function, this will place virtual nodes at:
        // 2, 4, 6, 12, 14, 16, 22, 24, 26
        ring.add(["6", "4", "2"]);
        assert_eq!(ring.len(), 9);

        assert_eq!(ring.get("2").unwrap(), "2");
        assert_eq!(ring.get("11").unwrap(), "2");
        assert_eq!(ring.get("23").unwrap(), "4");
        assert_eq!(ring.get("27").unwrap(), "2");

        // Adds 8, 18, 28...
        ring.add(["8"]);

        // ..so only 27 moves to the new node.
        assert_eq!(ring.get("2").unwrap(), "2");
        assert_eq!(ring.get("11").unwrap(), "2");
        assert_eq!(ring.get("23").unwrap(), "4");
        assert_eq!(ring.get("27").unwrap(), "8");
    }

    #[test]
    fn empty_ring_reports_an_error() {
        let ring = HashRing::new(50);
        assert_eq!(ring.is_empty(), true);
        assert!(matches!(ring.get("Tom"), Err(CacheError::NoNodes)));

        // A ring without replicas never contains any virtual nodes...
        let mut ring = HashRing::new(0);
        ring.add(["A"]);
        assert!(matches!(ring.get("Tom"), Err(CacheError::NoNodes)));
    }

    #[test]
    fn colliding_virtual_nodes_are_not_duplicated() {
        // Every key and virtual node hashes to the same position...
        let mut ring = HashRing::with_hash(3, |_| 42);
        ring.add(["A", "B"]);

        assert_eq!(ring.len(), 1);
        assert_eq!(ring.get("Tom").unwrap(), "B");
    }

    #[test]
    fn keys_are_spread_across_all_nodes() {
        let nodes = ["http://a:2410", "http://b:2410", "http://c:2410"];
        let mut ring = HashRing::new(50);
        ring.add(nodes);

        let mut distribution: HashMap<String, usize> = HashMap::new();
        for index in 0..3000 {
            let node = ring.get(&format!("key-{}", index)).unwrap();
            *distribution.entry(node.to_owned()).or_default() += 1;
        }

        for node in nodes {
            assert_eq!(distribution.get(node).copied().unwrap_or(0) > 500, true);
        }

        // Adding a fourth node only moves a part of the keys...
        let mut extended_ring = ring.clone();
        extended_ring.add(["http://d:2410"]);
        let moved = (0..3000)
            .filter(|index| {
                let key = format!("key-{}", index);
                ring.get(&key).unwrap() != extended_ring.get(&key).unwrap()
            })
            .count();
        assert_eq!(moved > 0 && moved < 1500, true);
    }
}
