//! Contains the node configuration.
//!
//! The configuration is read from **config/settings.yml**. The file is observed and reloaded
//! once it changes, so that e.g. the list of peers can be updated without restarting the node.
//! Therefore each user of the config should attach itself to [Config::notifier] and re-process
//! the config once a change message is received.
//!
//! Note that a [Handle] obtained via [Config::current] should not be stored, as it won't reflect
//! any changes.
//!
//! # Examples
//! ```
//! # use peercache::config::Config;
//! let config = Config::new("settings.yml");
//! config.load_from_string("
//! peers:
//!     self: http://10.0.0.1:2410
//!     nodes:
//!         - http://10.0.0.1:2410
//!         - http://10.0.0.2:2410
//! ", None).unwrap();
//!
//! let handle = config.current();
//! assert_eq!(handle.query("peers.self").as_str(), Some("http://10.0.0.1:2410"));
//! assert_eq!(handle.query("peers.nodes").as_vec().map(|nodes| nodes.len()), Some(2));
//! assert_eq!(handle.query("server.port").as_i64().unwrap_or(2410), 2410);
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::node::Node;

/// Contains the path of the config file used by a node.
pub const CONFIG_FILE: &str = "config/settings.yml";

/// Provides access to the configuration of a node.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Receives a message each time the configuration has been changed.
///
/// The message itself carries no information.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a snapshot of the currently loaded configuration.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Creates an empty config which is backed by the given file.
    ///
    /// Note that the file is neither read nor observed. This is done by [install].
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Null, None))),
            tx,
        }
    }

    /// Obtains a notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    #[cfg(not(test))]
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|metadata| metadata.is_file())
            .and_then(|metadata| metadata.modified().ok())
    }

    /// Reads the underlying file.
    ///
    /// A missing file is not an error, the node then simply runs with its defaults.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => (),
            _ => {
                log::info!("Config file {} doesn't exist - using defaults.", &self.filename);
                return Ok(());
            }
        }

        let data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot load config file {}", &self.filename))?;
        let last_modified = tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        self.load_from_string(&data, last_modified)
    }

    /// Validates and writes the given config into the underlying file.
    ///
    /// The file monitor will then pick up and apply the change.
    ///
    /// # Example
    /// ```
    /// # use peercache::config::Config;
    /// # #[tokio::main]
    /// # async fn main() {
    /// let config = Config::new("peercache_test_config.yml");
    ///
    /// assert_eq!(config.store("server:\n    port: 12345\n").await.is_ok(), true);
    /// assert_eq!(config.load().await.is_ok(), true);
    /// assert_eq!(config.current().query("server.port").as_i64(), Some(12345));
    ///
    /// // An invalid config is never written...
    /// assert_eq!(config.store("server: \"test").await.is_err(), true);
    /// assert_eq!(config.load().await.is_ok(), true);
    /// assert_eq!(config.current().query("server.port").as_i64(), Some(12345));
    ///
    /// # let _ = std::fs::remove_file("peercache_test_config.yml");
    /// # }
    /// ```
    pub async fn store(&self, config: &str) -> anyhow::Result<()> {
        log::info!("Updating the config file {}...", &self.filename);

        let _ = YamlLoader::load_from_str(config)
            .map_err(|error| anyhow::anyhow!("Cannot parse config data: {}", error))?;
        tokio::fs::write(&self.filename, config)
            .await
            .with_context(|| format!("Failed to write config file {}", &self.filename))?;

        log::info!("Config file {} has been updated.", &self.filename);
        Ok(())
    }

    /// Replaces the current config by the one given as string.
    ///
    /// An invalid config is rejected and the previous one stays active. Otherwise all listeners
    /// are notified.
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let docs = YamlLoader::load_from_str(data).map_err(|error| {
            anyhow::anyhow!("Cannot parse config file {}: {}", &self.filename, error)
        })?;

        let doc = match docs.into_iter().next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            _ => Yaml::Null,
        };

        self.config.store(Arc::new((doc, last_modified)));

        // Nobody might be listening...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Provides access to the root of the loaded configuration.
    pub fn config(&self) -> &Yaml {
        &self.config.0
    }

    /// Resolves a dotted path like "peers.nodes" against the loaded configuration.
    ///
    /// Returns **Yaml::BadValue** if any part of the path doesn't exist.
    pub fn query(&self, path: impl AsRef<str>) -> &Yaml {
        path.as_ref()
            .split('.')
            .fold(&self.config.0, |node, part| &node[part])
    }
}

/// Loads the config of the given node and starts observing the config file.
///
/// Note that the observer only compares the "last modified" date of the file, each config user
/// has to cope with partial changes.
pub async fn install(node: Arc<Node>) {
    let directory = Path::new(CONFIG_FILE).parent().unwrap_or_else(|| Path::new("."));
    if let Err(error) = tokio::fs::create_dir_all(directory).await {
        log::warn!(
            "Failed to create config directory {}: {}",
            directory.to_string_lossy(),
            error
        );
    }

    if let Err(error) = node.config().load().await {
        log::error!("{:#}", error);
    }

    run_config_change_monitor(node);
}

#[cfg(test)]
fn run_config_change_monitor(_node: Arc<Node>) {
    // Tests provide their config via load_from_string...
}

#[cfg(not(test))]
fn run_config_change_monitor(node: Arc<Node>) {
    crate::spawn!(async move {
        while node.is_running() {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;

            let config = node.config();
            let last_modified = config.last_modified().await;
            let last_loaded = config.config.load().1;

            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => log::info!("Node configuration was re-loaded."),
                    Err(error) => log::error!("Failed to re-load node configuration: {:#}", error),
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use std::time::SystemTime;

    #[test]
    fn config_updates_are_broadcast() {
        crate::testing::test_async(async {
            let config = Config::new("settings.yml");
            config
                .load_from_string("groups:\n    scores:\n        max_memory: 2k", Some(SystemTime::now()))
                .unwrap();

            let mut change_notifier = config.notifier();
            let (tx, rx) = tokio::sync::oneshot::channel();
            crate::spawn!(async move {
                if change_notifier.recv().await.is_ok() {
                    let _ = tx.send(());
                }
            });

            // A malformed config is rejected and the previous one remains active...
            assert_eq!(
                config
                    .load_from_string("groups: 'invalid", Some(SystemTime::now()))
                    .is_err(),
                true
            );
            assert_eq!(
                config.current().query("groups.scores.max_memory").as_str(),
                Some("2k")
            );

            config
                .load_from_string("groups:\n    users: {}", Some(SystemTime::now()))
                .unwrap();
            assert_eq!(rx.await.is_ok(), true);

            let handle = config.current();
            assert_eq!(handle.query("groups.scores.max_memory").is_badvalue(), true);
            assert_eq!(handle.query("groups.users").as_hash().is_some(), true);
        });
    }

    #[test]
    fn non_mapping_documents_result_in_an_empty_config() {
        let config = Config::new("settings.yml");
        config.load_from_string("- a\n- b", None).unwrap();

        assert_eq!(config.current().config().is_null(), true);
        assert_eq!(config.current().query("peers.self").is_badvalue(), true);
    }
}
