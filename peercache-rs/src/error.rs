//! Describes the errors which can be reported by a [Group](crate::group::Group) lookup.
//!
//! Note that errors of peers are not part of this list. If a peer fails to deliver a value, this
//! is logged and the node falls back to its local source. Therefore the caller of
//! [Group::get](crate::group::Group::get) only ever sees errors of the local fetch path.
//!
//! All errors are **Clone** as a single failed fetch is reported to every caller which has been
//! waiting for it (see [SingleFlight](crate::singleflight::SingleFlight)).
use std::sync::Arc;

/// Enumerates the errors which occur when looking up a value.
#[derive(thiserror::Error, Debug, Clone)]
pub enum CacheError {
    /// An empty key has been requested.
    #[error("A non-empty key is required")]
    InvalidKey,

    /// The value isn't cached and the group has no source to fetch it from.
    #[error("No data source has been configured for group '{0}'")]
    NoSource(String),

    /// The source of the group failed to provide a value.
    ///
    /// The error is shared (and not re-created) so that all deduplicated callers receive the very
    /// same error instance.
    #[error("Failed to fetch value from source: {0:#}")]
    Source(Arc<anyhow::Error>),

    /// A node was requested from an empty hash ring.
    #[error("No nodes are available in the hash ring")]
    NoNodes,

    /// A request for an unknown group has been received.
    #[error("Unknown group: {0}")]
    UnknownGroup(String),
}

/// Represents the result of a cache operation.
pub type CacheResult<T> = Result<T, CacheError>;
