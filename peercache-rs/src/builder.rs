//! Provides a builder which sets up a [Node](crate::node::Node).
//!
//! Logging, signal handling and the config file are optional, so that e.g. tests can provide
//! their config programmatically.
//!
//! # Example
//! ```no_run
//! # use peercache::builder::Builder;
//! # use peercache::server::Server;
//! #[tokio::main]
//! async fn main() {
//!     let node = Builder::new().enable_all().build().await;
//!
//!     // Create groups here...
//!
//!     Server::new(node).event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::node::Node;
use crate::{init_logging, PEERCACHE_REVISION, PEERCACHE_VERSION};

/// Selects the components to set up when creating a node.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
}

impl Builder {
    /// Creates a builder with all components disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all components.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;

        self
    }

    /// Initializes **simplelog** to log to stdout.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the logging setup after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Terminates the node once **CTRL-C** or **SIGHUP** is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables the signal handler after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Loads and observes **config/settings.yml** and applies its **peers** section to the pool.
    ///
    /// For more details see: [config](crate::config) and [pool](crate::pool)
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables loading the config after [enable_all()](Builder::enable_all) has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Creates the node and sets up all enabled components.
    pub async fn build(self) -> Arc<Node> {
        let node = Node::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. PEERCACHE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            PEERCACHE_VERSION,
            PEERCACHE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(node.clone());
        }

        if self.setup_config {
            crate::config::install(node.clone()).await;
            crate::pool::install(node.clone());
        }

        node
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::peers::PeerPicker;
    use std::time::Duration;

    #[test]
    fn config_changes_are_applied_to_the_pool() {
        crate::testing::test_async(async {
            let node = Builder::new().enable_config().build().await;
            assert_eq!(node.pool().nodes().is_empty(), true);

            node.config()
                .load_from_string(
                    "
peers:
    self: http://a:2410
    nodes:
        - http://b:2410
",
                    None,
                )
                .unwrap();

            // The pool listener runs in a separate task...
            let mut attempts = 0;
            while node.pool().nodes().is_empty() && attempts < 50 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                attempts += 1;
            }

            assert_eq!(node.pool().nodes(), vec!["http://b:2410".to_owned()]);
            assert_eq!(node.pool().self_url(), "http://a:2410");
            assert_eq!(node.pool().pick_peer("Tom").is_some(), true);

            node.terminate();
        });
    }
}
