//! Defines the contract between a [Group](crate::group::Group) and the other nodes of a cluster.
//!
//! A group doesn't know anything about the transport used to talk to other nodes. It only asks
//! its [PeerPicker] which node owns a key and, if this is a remote node, uses the returned
//! [PeerFetcher] to obtain the value. [HttpPool](crate::pool::HttpPool) is the default
//! implementation which talks HTTP.
use std::sync::Arc;

use crate::byteview::ByteView;

/// Fetches a value of a group from a remote node.
#[async_trait::async_trait]
pub trait PeerFetcher: Send + Sync {
    /// Asks the remote node for the value of the given key in the given group.
    ///
    /// Any error is treated as "peer unavailable" by the caller, which then falls back to its
    /// local source.
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<ByteView>;
}

/// Determines the node which owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the fetcher of the remote node which owns the given key.
    ///
    /// Returns **None** if the key is owned by the local node or if no peers are known at all.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>>;
}
