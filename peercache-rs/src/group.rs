//! Provides groups, the named cache namespaces which are queried by the application.
//!
//! A [Group] ties all the parts of the cache together. Each lookup proceeds as follows:
//!
//! 1. The local [Cache] is checked. A hit is returned right away.
//! 2. Otherwise the lookup is routed through the [SingleFlight] of the group so that concurrent
//!    lookups of the same key result in a single fetch.
//! 3. If a [PeerPicker] has been registered and it determines that the key is owned by another
//!    node, the value is fetched from there. Such values are **not** stored locally, as the owner
//!    already caches them.
//! 4. Otherwise (or if the peer failed) the [Source] of the group is asked. Its values are stored
//!    in the local cache. Errors are never cached.
//!
//! # Examples
//! ```
//! # use peercache::group::{source_fn, Group};
//! # #[tokio::main]
//! # async fn main() {
//! let group = Group::builder("greetings")
//!     .max_memory(1024)
//!     .source(source_fn(|key: String| async move {
//!         Ok(format!("Hello {}", key).into_bytes())
//!     }))
//!     .build();
//!
//! assert_eq!(group.get("World").await.unwrap().to_string(), "Hello World");
//! # }
//! ```
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::byteview::ByteView;
use crate::cache::{Cache, CacheStats, DEFAULT_MAX_MEMORY};
use crate::error::{CacheError, CacheResult};
use crate::peers::PeerPicker;
use crate::singleflight::SingleFlight;

/// Provides the values of a group which are not yet cached.
///
/// This is the "source of truth" of a group, e.g. a database or a file system. Note that a
/// source is called at most once at a time per key and node.
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    /// Fetches the value for the given key.
    async fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts an async closure so that it can be used as [Source].
///
/// Use [source_fn] to create one.
pub struct SourceFn<F> {
    fetch: F,
}

/// Wraps the given async closure into a [Source].
///
/// # Examples
/// ```
/// # use peercache::group::{source_fn, Source};
/// # #[tokio::main]
/// # async fn main() {
/// let source = source_fn(|key: String| async move { Ok(key.to_uppercase().into_bytes()) });
/// assert_eq!(source.fetch("foo").await.unwrap(), b"FOO".to_vec());
/// # }
/// ```
pub fn source_fn<F, Fut>(fetch: F) -> SourceFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    SourceFn { fetch }
}

#[async_trait::async_trait]
impl<F, Fut> Source for SourceFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    async fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.fetch)(key.to_owned()).await
    }
}

/// Collects the settings of a group before it is created.
///
/// Obtained via [Group::builder].
pub struct GroupBuilder {
    name: String,
    max_memory: usize,
    source: Option<Arc<dyn Source>>,
}

impl GroupBuilder {
    /// Specifies the memory budget (in bytes) of the local cache (0 = unbounded).
    ///
    /// If not specified, [DEFAULT_MAX_MEMORY] is used.
    pub fn max_memory(mut self, max_memory: usize) -> Self {
        self.max_memory = max_memory;
        self
    }

    /// Specifies the source which provides values which aren't cached yet.
    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the name of the group to build.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates the group.
    ///
    /// Note that the group isn't registered anywhere. Use
    /// [Node::create_group](crate::node::Node::create_group) to create a group which is visible to
    /// other peers.
    pub fn build(self) -> Arc<Group> {
        Arc::new(Group {
            cache: Cache::new(self.name.clone(), self.max_memory),
            name: self.name,
            source: self.source,
            peers: OnceLock::new(),
            loader: SingleFlight::new(),
            stats: Counters::default(),
        })
    }
}

/// Provides a snapshot of the counters of a [Group].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Contains the number of lookups.
    pub gets: u64,

    /// Contains the number of lookups which were answered by the local cache.
    pub cache_hits: u64,

    /// Contains the number of fetches (remote or local) after deduplication.
    pub loads: u64,

    /// Contains the number of values which were obtained from a peer.
    pub peer_loads: u64,

    /// Contains the number of failed peer fetches.
    pub peer_errors: u64,

    /// Contains the number of values which were obtained from the local source.
    pub local_loads: u64,

    /// Contains the number of failed fetches from the local source.
    pub local_load_errors: u64,
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    loads: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    local_loads: AtomicU64,
    local_load_errors: AtomicU64,
}

fn increment(counter: &AtomicU64) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

/// Represents a named cache namespace along with the source which provides its values.
pub struct Group {
    name: String,
    source: Option<Arc<dyn Source>>,
    cache: Cache,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    loader: SingleFlight<CacheResult<ByteView>>,
    stats: Counters,
}

impl Group {
    /// Starts building a group with the given name.
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder {
            name: name.into(),
            max_memory: DEFAULT_MAX_MEMORY,
            source: None,
        }
    }

    /// Returns the name of the group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs the picker which determines if a key is owned by another node.
    ///
    /// Only the first registration takes effect. Subsequent calls are logged and ignored.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            log::warn!(
                "Peers for group {} have already been registered. Ignoring re-registration.",
                self.name
            );
        }
    }

    /// Returns the value for the given key.
    ///
    /// If the value is neither cached locally nor available from the owning peer, it is fetched
    /// from the source of the group.
    ///
    /// # Errors
    /// * [CacheError::InvalidKey] if an empty key is given
    /// * [CacheError::NoSource] if the value has to be fetched locally but no source is present
    /// * [CacheError::Source] if the source failed to provide the value
    pub async fn get(self: &Arc<Self>, key: &str) -> CacheResult<ByteView> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey);
        }

        increment(&self.stats.gets);
        if let Some(value) = self.cache.get(key) {
            log::debug!("Cache hit for {} in {}", key, self.name);
            increment(&self.stats.cache_hits);
            return Ok(value);
        }

        self.load(key).await
    }

    async fn load(self: &Arc<Self>, key: &str) -> CacheResult<ByteView> {
        let group = self.clone();
        let owned_key = key.to_owned();

        self.loader
            .call(key, move || async move { group.load_once(&owned_key).await })
            .await
    }

    async fn load_once(&self, key: &str) -> CacheResult<ByteView> {
        // Another flight for the same key might have completed between our cache miss and
        // the registration of this flight...
        if let Some(value) = self.cache.get(key) {
            increment(&self.stats.cache_hits);
            return Ok(value);
        }

        increment(&self.stats.loads);
        if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
            match peer.fetch(&self.name, key).await {
                Ok(value) => {
                    increment(&self.stats.peer_loads);
                    return Ok(value);
                }
                Err(error) => {
                    increment(&self.stats.peer_errors);
                    log::warn!(
                        "Failed to fetch {} of {} from peer: {:#}. Falling back to local source.",
                        key,
                        self.name,
                        error
                    );
                }
            }
        }

        self.get_locally(key).await
    }

    async fn get_locally(&self, key: &str) -> CacheResult<ByteView> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| CacheError::NoSource(self.name.clone()))?;

        match source.fetch(key).await {
            Ok(data) => {
                increment(&self.stats.local_loads);
                let value = ByteView::from(data);
                self.cache.add(key, value.clone());

                Ok(value)
            }
            Err(error) => {
                increment(&self.stats.local_load_errors);
                log::debug!("Source of {} failed for {}: {:#}", self.name, key, error);

                Err(CacheError::Source(Arc::new(error)))
            }
        }
    }

    /// Provides a snapshot of the counters of this group.
    pub fn stats(&self) -> GroupStats {
        GroupStats {
            gets: self.stats.gets.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            loads: self.stats.loads.load(Ordering::Relaxed),
            peer_loads: self.stats.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.stats.peer_errors.load(Ordering::Relaxed),
            local_loads: self.stats.local_loads.load(Ordering::Relaxed),
            local_load_errors: self.stats.local_load_errors.load(Ordering::Relaxed),
        }
    }

    /// Provides a snapshot of the metrics of the local cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use crate::byteview::ByteView;
    use crate::error::CacheError;
    use crate::group::{source_fn, Group, Source};
    use crate::peers::{PeerFetcher, PeerPicker};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Simulates a slow database and records how often each key has been loaded.
    fn database(loads: Arc<Mutex<HashMap<String, usize>>>) -> impl Source {
        source_fn(move |key: String| {
            let loads = loads.clone();
            async move {
                *loads.lock().unwrap().entry(key.clone()).or_default() += 1;

                match key.as_str() {
                    "Tom" => Ok(b"630".to_vec()),
                    "Jack" => Ok(b"589".to_vec()),
                    "Sam" => Ok(b"567".to_vec()),
                    _ => Err(anyhow::anyhow!("{} not exist", key)),
                }
            }
        })
    }

    struct FixedPicker(Option<Arc<dyn PeerFetcher>>);

    impl PeerPicker for FixedPicker {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerFetcher>> {
            self.0.clone()
        }
    }

    struct FailingPeer;

    #[async_trait::async_trait]
    impl PeerFetcher for FailingPeer {
        async fn fetch(&self, _group: &str, _key: &str) -> anyhow::Result<ByteView> {
            Err(anyhow::anyhow!("Peer is down"))
        }
    }

    struct RemotePeer;

    #[async_trait::async_trait]
    impl PeerFetcher for RemotePeer {
        async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<ByteView> {
            Ok(ByteView::from(format!("{}/{} from remote", group, key)))
        }
    }

    #[test]
    fn values_are_loaded_once_and_then_cached() {
        crate::testing::test_async(async {
            let loads = Arc::new(Mutex::new(HashMap::new()));
            let group = Group::builder("scores")
                .max_memory(2 << 10)
                .source(database(loads.clone()))
                .build();

            for (key, value) in [("Tom", "630"), ("Jack", "589"), ("Sam", "567")] {
                assert_eq!(group.get(key).await.unwrap().to_string(), value);
                assert_eq!(group.get(key).await.unwrap().to_string(), value);
                assert_eq!(loads.lock().unwrap().get(key), Some(&1));
            }

            let stats = group.stats();
            assert_eq!(stats.gets, 6);
            assert_eq!(stats.cache_hits, 3);
            assert_eq!(stats.loads, 3);
            assert_eq!(stats.local_loads, 3);
            assert_eq!(group.cache_stats().entries, 3);
        });
    }

    #[test]
    fn errors_are_reported_but_never_cached() {
        crate::testing::test_async(async {
            let loads = Arc::new(Mutex::new(HashMap::new()));
            let group = Group::builder("scores")
                .source(database(loads.clone()))
                .build();

            match group.get("unknown").await {
                Err(CacheError::Source(error)) => assert_eq!(error.to_string(), "unknown not exist"),
                _ => panic!("Expected a source error"),
            }
            assert!(group.get("unknown").await.is_err());

            assert_eq!(loads.lock().unwrap().get("unknown"), Some(&2));
            assert_eq!(group.cache_stats().entries, 0);
            assert_eq!(group.stats().local_load_errors, 2);
        });
    }

    #[test]
    fn empty_keys_are_rejected() {
        crate::testing::test_async(async {
            let loads = Arc::new(Mutex::new(HashMap::new()));
            let group = Group::builder("scores").source(database(loads.clone())).build();

            assert!(matches!(group.get("").await, Err(CacheError::InvalidKey)));
            assert_eq!(loads.lock().unwrap().is_empty(), true);
            assert_eq!(group.stats().gets, 0);
        });
    }

    #[test]
    fn a_group_without_source_reports_an_error() {
        crate::testing::test_async(async {
            let group = Group::builder("empty").build();

            match group.get("Tom").await {
                Err(CacheError::NoSource(name)) => assert_eq!(name, "empty"),
                _ => panic!("Expected a missing source error"),
            }
        });
    }

    #[test]
    fn failing_peers_fall_back_to_the_local_source() {
        crate::testing::test_async(async {
            let loads = Arc::new(Mutex::new(HashMap::new()));
            let group = Group::builder("scores").source(database(loads.clone())).build();
            group.register_peers(Arc::new(FixedPicker(Some(Arc::new(FailingPeer)))));

            assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
            assert_eq!(loads.lock().unwrap().get("Tom"), Some(&1));

            let stats = group.stats();
            assert_eq!(stats.peer_errors, 1);
            assert_eq!(stats.local_loads, 1);

            // As the value has been fetched locally, it is also cached...
            assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
            assert_eq!(group.stats().peer_errors, 1);
        });
    }

    #[test]
    fn values_of_peers_are_not_cached_locally() {
        crate::testing::test_async(async {
            let loads = Arc::new(Mutex::new(HashMap::new()));
            let group = Group::builder("scores").source(database(loads.clone())).build();
            group.register_peers(Arc::new(FixedPicker(Some(Arc::new(RemotePeer)))));

            assert_eq!(
                group.get("Tom").await.unwrap().to_string(),
                "scores/Tom from remote"
            );
            assert_eq!(
                group.get("Tom").await.unwrap().to_string(),
                "scores/Tom from remote"
            );

            assert_eq!(loads.lock().unwrap().is_empty(), true);
            assert_eq!(group.cache_stats().entries, 0);
            assert_eq!(group.stats().peer_loads, 2);
        });
    }

    #[test]
    fn keys_owned_by_the_local_node_are_fetched_locally() {
        crate::testing::test_async(async {
            let loads = Arc::new(Mutex::new(HashMap::new()));
            let group = Group::builder("scores").source(database(loads.clone())).build();
            group.register_peers(Arc::new(FixedPicker(None)));

            assert_eq!(group.get("Jack").await.unwrap().to_string(), "589");
            assert_eq!(group.stats().peer_loads, 0);
            assert_eq!(group.stats().local_loads, 1);
        });
    }

    #[test]
    fn only_the_first_peer_registration_takes_effect() {
        crate::testing::test_async(async {
            let loads = Arc::new(Mutex::new(HashMap::new()));
            let group = Group::builder("scores").source(database(loads.clone())).build();
            group.register_peers(Arc::new(FixedPicker(None)));
            group.register_peers(Arc::new(FixedPicker(Some(Arc::new(RemotePeer)))));

            assert_eq!(group.get("Sam").await.unwrap().to_string(), "567");
            assert_eq!(group.stats().peer_loads, 0);
        });
    }

    #[test]
    fn concurrent_lookups_only_hit_the_source_once() {
        crate::testing::test_async(async {
            let counter = Arc::new(AtomicUsize::new(0));
            let source_counter = counter.clone();
            let group = Group::builder("slow")
                .source(source_fn(move |key: String| {
                    let counter = source_counter.clone();
                    async move {
                        let _ = counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(key.into_bytes())
                    }
                }))
                .build();

            let lookups = (0..10).map(|_| group.get("popular"));
            let results = futures::future::join_all(lookups).await;

            assert_eq!(counter.load(Ordering::SeqCst), 1);
            for result in results {
                assert_eq!(result.unwrap().to_string(), "popular");
            }
            assert_eq!(group.stats().loads, 1);
        });
    }
}
