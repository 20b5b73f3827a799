//! Provides the central context of a cache node.
//!
//! A [Node] keeps everything together which is shared by the components of a running process: the
//! configuration, the registry of groups and the peer pool. It also carries the central "is
//! running" flag which is used to shut down all background tasks.
//!
//! # Examples
//! ```
//! # use peercache::node::Node;
//! # use peercache::group::{source_fn, Group};
//! let node = Node::new();
//! let group = node.create_group(
//!     Group::builder("scores").source(source_fn(|key: String| async move { Ok(key.into_bytes()) })),
//! );
//!
//! assert_eq!(node.groups().find("scores").unwrap().name(), group.name());
//! assert_eq!(node.is_running(), true);
//!
//! node.terminate();
//! assert_eq!(node.is_running(), false);
//! ```
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Config, CONFIG_FILE};
use crate::group::{Group, GroupBuilder};
use crate::pool::HttpPool;
use crate::registry::Groups;

/// Contains the URL of the local node until the **peers** config has been applied.
pub const DEFAULT_SELF_URL: &str = "http://127.0.0.1:2410";

/// Represents a running cache node.
pub struct Node {
    config: Arc<Config>,
    groups: Groups,
    pool: Arc<HttpPool>,
    is_running: AtomicBool,
}

impl Node {
    /// Creates a new node which reads its config from **config/settings.yml**.
    ///
    /// Note that the config isn't loaded yet. This is done by the [Builder](crate::builder::Builder)
    /// or manually via [config::install](crate::config::install).
    pub fn new() -> Arc<Self> {
        Node::with_config(Arc::new(Config::new(CONFIG_FILE)))
    }

    /// Creates a new node which uses the given config.
    pub fn with_config(config: Arc<Config>) -> Arc<Self> {
        Arc::new(Node {
            config,
            groups: Groups::default(),
            pool: Arc::new(HttpPool::new(DEFAULT_SELF_URL)),
            is_running: AtomicBool::new(true),
        })
    }

    /// Provides access to the configuration of this node.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Provides access to all groups of this node.
    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// Provides access to the pool which knows the other nodes of the cluster.
    pub fn pool(&self) -> &Arc<HttpPool> {
        &self.pool
    }

    /// Creates a group which uses the peer pool of this node and makes it visible to other nodes.
    ///
    /// If a group with the same name already exists, it is replaced.
    pub fn create_group(&self, builder: GroupBuilder) -> Arc<Group> {
        let group = builder.build();
        group.register_peers(self.pool.clone());
        self.groups.register(group.clone());

        group
    }

    /// Determines if the node is still running.
    ///
    /// All background tasks should check this every once in a while and exit once the node has
    /// been terminated.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the node and all of its background tasks.
    pub fn terminate(&self) {
        log::info!("Terminating node...");
        self.is_running.store(false, Ordering::Release);
    }
}
