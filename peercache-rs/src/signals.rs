//! Terminates a node once **CTRL+C** or **SIGHUP** is received.
use std::sync::Arc;

use tokio::signal::unix::SignalKind;

use crate::node::Node;

/// Forks a task which waits for **CTRL+C** or **SIGHUP** and then terminates the given node.
///
/// This is called by the [Builder](crate::builder::Builder) if signals are enabled.
pub fn install(node: Arc<Node>) {
    crate::spawn!(async move {
        let mut hang_up = match tokio::signal::unix::signal(SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(error) => {
                log::error!("Failed to install a handler for SIGHUP: {}", error);
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("Received CTRL-C. Shutting down..."),
            _ = hang_up.recv() => log::info!("Received SIGHUP. Shutting down..."),
        }

        node.terminate();
    });
}
