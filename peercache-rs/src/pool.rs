//! Provides the HTTP based peer transport.
//!
//! An [HttpPool] knows all nodes of the cluster and uses a
//! [consistent hash ring](crate::consistenthash::HashRing) to determine which of them owns a key.
//! For each remote node it keeps an [HttpFetcher] which requests values via
//! `GET <node><base_path><group>/<key>`. The other side of this protocol is implemented by the
//! [Server](crate::server::Server).
//!
//! The membership is taken from the **peers** section of the config:
//! ```yaml
//! peers:
//!     # The URL under which this node is reachable by the others.
//!     self: http://10.0.0.1:2410
//!     # Optional, "/_peercache/" by default.
//!     base_path: /_peercache/
//!     # Optional, the number of virtual nodes per node on the hash ring.
//!     replicas: 50
//!     # Optional, aborts requests to a peer which take longer.
//!     timeout: 2s
//!     nodes:
//!         - http://10.0.0.1:2410
//!         - http://10.0.0.2:2410
//! ```
//!
//! Each time the config changes, a new ring is built and swapped in atomically. Lookups therefore
//! never block and never see a partially built ring.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arc_swap::ArcSwap;
use fnv::FnvHashMap;
use hyper::client::HttpConnector;
use hyper::{Client, StatusCode, Uri};
use tokio::sync::broadcast::error::RecvError;
use yaml_rust::Yaml;

use crate::byteview::ByteView;
use crate::config::Handle;
use crate::consistenthash::{HashRing, DEFAULT_REPLICAS};
use crate::fmt::parse_duration;
use crate::node::Node;
use crate::peers::{PeerFetcher, PeerPicker};

/// Contains the path prefix under which a node answers requests of its peers.
pub const DEFAULT_BASE_PATH: &str = "/_peercache/";

/// Describes the members of a cluster and how to reach them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSettings {
    /// Contains the URL of the local node, as listed in **nodes**.
    pub self_url: String,

    /// Contains the path prefix of all peer requests.
    pub base_path: String,

    /// Contains the number of virtual nodes per node.
    pub replicas: usize,

    /// Contains the maximal duration of a peer request.
    pub timeout: Option<Duration>,

    /// Contains the URLs of all nodes, including the local one.
    pub nodes: Vec<String>,
}

impl PeerSettings {
    /// Creates settings for the given node URL using the defaults for all other values.
    pub fn new(self_url: impl Into<String>) -> Self {
        PeerSettings {
            self_url: self_url.into(),
            base_path: DEFAULT_BASE_PATH.to_owned(),
            replicas: DEFAULT_REPLICAS,
            timeout: None,
            nodes: Vec::new(),
        }
    }

    /// Reads the settings from the **peers** section of the given config.
    ///
    /// Returns **None** if no such section is present.
    ///
    /// # Examples
    /// ```
    /// # use peercache::config::Config;
    /// # use peercache::pool::PeerSettings;
    /// let config = Config::new("settings.yml");
    /// config.load_from_string("
    /// peers:
    ///     self: http://a:2410
    ///     base_path: cache
    ///     nodes:
    ///         - http://a:2410
    ///         - http://b:2410
    /// ", None).unwrap();
    ///
    /// let settings = PeerSettings::from_config(&config.current()).unwrap().unwrap();
    /// assert_eq!(settings.base_path, "/cache/");
    /// assert_eq!(settings.replicas, 50);
    /// assert_eq!(settings.nodes.len(), 2);
    /// ```
    pub fn from_config(handle: &Handle) -> anyhow::Result<Option<PeerSettings>> {
        let peers = handle.query("peers");
        if peers.is_badvalue() || peers.is_null() {
            return Ok(None);
        }

        let self_url = peers["self"]
            .as_str()
            .context("peers.self must contain the URL of this node")?;

        let base_path = peers["base_path"].as_str().unwrap_or(DEFAULT_BASE_PATH);

        let replicas = match &peers["replicas"] {
            Yaml::Integer(replicas) if *replicas > 0 => *replicas as usize,
            Yaml::BadValue => DEFAULT_REPLICAS,
            other => anyhow::bail!("peers.replicas must be a positive number, not {:?}", other),
        };

        let timeout = match &peers["timeout"] {
            Yaml::String(timeout) => match parse_duration(timeout).context("Invalid peers.timeout")? {
                duration if duration.is_zero() => {
                    anyhow::bail!("peers.timeout must be a positive duration, not '{}'", timeout)
                }
                duration => Some(duration),
            },
            Yaml::Integer(millis) if *millis > 0 => Some(Duration::from_millis(*millis as u64)),
            Yaml::BadValue | Yaml::Null => None,
            other => anyhow::bail!("peers.timeout must be a positive duration, not {:?}", other),
        };

        let nodes = peers["nodes"]
            .as_vec()
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|node| node.as_str())
                    .map(|node| node.trim_end_matches('/').to_owned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(PeerSettings {
            self_url: self_url.trim_end_matches('/').to_owned(),
            base_path: normalize_base_path(base_path),
            replicas,
            timeout,
            nodes,
        }))
    }
}

fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{}/", trimmed)
    }
}

struct PeerSet {
    settings: PeerSettings,
    ring: HashRing,
    fetchers: FnvHashMap<String, Arc<dyn PeerFetcher>>,
}

/// Picks the owner of a key among the nodes of a cluster and talks to it via HTTP.
pub struct HttpPool {
    client: Client<HttpConnector>,
    peers: ArcSwap<PeerSet>,
}

impl HttpPool {
    /// Creates a pool for the node reachable via the given URL.
    ///
    /// Initially the pool knows no nodes, therefore all keys are considered to be local.
    pub fn new(self_url: impl Into<String>) -> Self {
        let client = Client::new();
        let peers = HttpPool::build_peer_set(&client, PeerSettings::new(self_url));

        HttpPool {
            client,
            peers: ArcSwap::new(Arc::new(peers)),
        }
    }

    fn build_peer_set(client: &Client<HttpConnector>, settings: PeerSettings) -> PeerSet {
        let mut ring = HashRing::new(settings.replicas);
        ring.add(&settings.nodes);

        let mut fetchers = FnvHashMap::default();
        for node in &settings.nodes {
            let fetcher: Arc<dyn PeerFetcher> = Arc::new(HttpFetcher {
                client: client.clone(),
                base_url: format!("{}{}", node, settings.base_path),
                timeout: settings.timeout,
            });
            let _ = fetchers.insert(node.clone(), fetcher);
        }

        PeerSet {
            settings,
            ring,
            fetchers,
        }
    }

    /// Replaces the known nodes while keeping base path, replicas and timeout.
    ///
    /// # Examples
    /// ```
    /// # use peercache::pool::HttpPool;
    /// # use peercache::peers::PeerPicker;
    /// let pool = HttpPool::new("http://a:2410");
    /// assert!(pool.pick_peer("Tom").is_none());
    ///
    /// // If the local node is the only one, every key is still local...
    /// pool.set("http://a:2410", ["http://a:2410"]);
    /// assert!(pool.pick_peer("Tom").is_none());
    ///
    /// // ..whereas a foreign node owns everything if it is the only one.
    /// pool.set("http://a:2410", ["http://b:2410"]);
    /// assert!(pool.pick_peer("Tom").is_some());
    /// ```
    pub fn set<I, S>(&self, self_url: &str, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let current = self.peers.load();
        self.apply(PeerSettings {
            self_url: self_url.to_owned(),
            nodes: nodes
                .into_iter()
                .map(|node| node.as_ref().to_owned())
                .collect(),
            ..current.settings.clone()
        });
    }

    /// Builds a new hash ring for the given settings and makes it visible to all lookups.
    pub fn apply(&self, settings: PeerSettings) {
        log::info!(
            "Using {} as peers (self: {}, base path: {}, replicas: {}).",
            settings.nodes.join(", "),
            settings.self_url,
            settings.base_path,
            settings.replicas
        );

        self.peers
            .store(Arc::new(HttpPool::build_peer_set(&self.client, settings)));
    }

    /// Applies the **peers** section of the given config.
    ///
    /// If there is no such section, the current peers are kept.
    pub fn apply_config(&self, handle: &Handle) -> anyhow::Result<()> {
        match PeerSettings::from_config(handle)? {
            Some(settings) => self.apply(settings),
            None => log::info!("No peers have been configured. Keeping the current peers."),
        }

        Ok(())
    }

    /// Returns the path prefix of all peer requests.
    pub fn base_path(&self) -> String {
        self.peers.load().settings.base_path.clone()
    }

    /// Returns the URL of the local node.
    pub fn self_url(&self) -> String {
        self.peers.load().settings.self_url.clone()
    }

    /// Returns the URLs of all known nodes in alphabetical order.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.peers.load().fetchers.keys().cloned().collect();
        nodes.sort();

        nodes
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>> {
        let peers = self.peers.load();
        match peers.ring.get(key) {
            Ok(node) if node != peers.settings.self_url => {
                log::debug!("Picked peer {} for {}", node, key);
                peers.fetchers.get(node).cloned()
            }
            _ => None,
        }
    }
}

/// Fetches values from a single remote node.
pub struct HttpFetcher {
    client: Client<HttpConnector>,
    base_url: String,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    async fn perform(&self, uri: Uri) -> anyhow::Result<ByteView> {
        let response = self
            .client
            .get(uri)
            .await
            .context("Failed to contact peer")?;

        if response.status() != StatusCode::OK {
            return Err(anyhow::anyhow!("Peer returned: {}", response.status()));
        }

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .context("Failed to read response of peer")?;

        Ok(ByteView::from(body))
    }
}

#[async_trait::async_trait]
impl PeerFetcher for HttpFetcher {
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<ByteView> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(group),
            urlencoding::encode(key)
        );
        let uri: Uri = url
            .parse()
            .with_context(|| format!("Invalid peer URL: {}", url))?;

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.perform(uri))
                .await
                .map_err(|_| anyhow::anyhow!("Peer did not respond within {:?}: {}", timeout, url))?,
            None => self.perform(uri).await,
        }
    }
}

/// Applies the peers of the node config and re-applies them each time the config changes.
///
/// This is called by the [Builder](crate::builder::Builder) if the config is enabled.
pub fn install(node: Arc<Node>) {
    apply_node_config(&node);

    let mut notifier = node.config().notifier();
    crate::spawn!(async move {
        while node.is_running() {
            match tokio::time::timeout(Duration::from_secs(1), notifier.recv()).await {
                Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => apply_node_config(&node),
                Ok(Err(RecvError::Closed)) => return,
                Err(_) => (),
            }
        }
    });
}

fn apply_node_config(node: &Node) {
    if let Err(error) = node.pool().apply_config(&node.config().current()) {
        log::error!("Failed to apply the peers config: {:#}", error);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::consistenthash::HashRing;
    use crate::peers::PeerPicker;
    use crate::pool::{HttpPool, PeerSettings, DEFAULT_BASE_PATH};
    use std::time::Duration;

    #[test]
    fn keys_are_routed_to_their_owner() {
        let nodes = ["http://a:2410", "http://b:2410", "http://c:2410"];
        let pool = HttpPool::new("http://a:2410");
        pool.set("http://a:2410", nodes);

        let mut ring = HashRing::new(50);
        ring.add(nodes);

        for index in 0..100 {
            let key = format!("key-{}", index);
            let owner = ring.get(&key).unwrap();
            assert_eq!(pool.pick_peer(&key).is_some(), owner != "http://a:2410");
        }

        assert_eq!(pool.nodes(), nodes.to_vec());
        assert_eq!(pool.base_path(), DEFAULT_BASE_PATH);
    }

    #[test]
    fn peers_are_read_from_the_config() {
        let config = Config::new("settings.yml");
        config
            .load_from_string(
                "
peers:
    self: http://b:2410/
    base_path: /internal/cache
    replicas: 10
    timeout: 500ms
    nodes:
        - http://a:2410
        - http://b:2410/
",
                None,
            )
            .unwrap();

        let settings = PeerSettings::from_config(&config.current()).unwrap().unwrap();
        assert_eq!(
            settings,
            PeerSettings {
                self_url: "http://b:2410".to_owned(),
                base_path: "/internal/cache/".to_owned(),
                replicas: 10,
                timeout: Some(Duration::from_millis(500)),
                nodes: vec!["http://a:2410".to_owned(), "http://b:2410".to_owned()],
            }
        );

        let pool = HttpPool::new("http://localhost:2410");
        pool.apply_config(&config.current()).unwrap();
        assert_eq!(pool.self_url(), "http://b:2410");
        assert_eq!(pool.base_path(), "/internal/cache/");
        assert_eq!(pool.nodes().len(), 2);
    }

    #[test]
    fn a_missing_peers_section_keeps_the_current_peers() {
        let config = Config::new("settings.yml");
        config.load_from_string("server:\n    port: 2410", None).unwrap();

        let pool = HttpPool::new("http://a:2410");
        pool.set("http://a:2410", ["http://a:2410", "http://b:2410"]);
        pool.apply_config(&config.current()).unwrap();

        assert_eq!(pool.nodes().len(), 2);
    }

    #[test]
    fn invalid_peer_settings_are_rejected() {
        let config = Config::new("settings.yml");

        config
            .load_from_string("peers:\n    nodes:\n        - http://a:2410", None)
            .unwrap();
        assert_eq!(PeerSettings::from_config(&config.current()).is_err(), true);

        config
            .load_from_string("peers:\n    self: http://a:2410\n    replicas: many", None)
            .unwrap();
        assert_eq!(PeerSettings::from_config(&config.current()).is_err(), true);

        for timeout in ["1.5", "-1", "0", "0s", "soon", "99999999999999999999h"] {
            config
                .load_from_string(
                    &format!("peers:\n    self: http://a:2410\n    timeout: {}", timeout),
                    None,
                )
                .unwrap();
            assert_eq!(
                PeerSettings::from_config(&config.current()).is_err(),
                true,
                "timeout: {} should be rejected",
                timeout
            );
        }

        // Omitting the timeout (or leaving it empty) disables it...
        config
            .load_from_string("peers:\n    self: http://a:2410\n    timeout:", None)
            .unwrap();
        let settings = PeerSettings::from_config(&config.current()).unwrap().unwrap();
        assert_eq!(settings.timeout, None);
    }
}
