//! Peercache is a distributed read-through cache for byte values.
//!
//! # Introduction
//! Callers ask a [Group](group::Group) for a value by key. If the value is present in the local
//! memory it is returned right away. Otherwise it is fetched **exactly once** - even if many
//! callers request the same missing key at the same time and even if the cache runs on a cluster of
//! several nodes - and then handed to every caller which asked for it.
//!
//! Each key has exactly one owner within the cluster, determined by a
//! [consistent hash ring](consistenthash::HashRing). A node which doesn't own a key asks the owner
//! via HTTP. Only the owner asks the user supplied [Source](group::Source) and keeps the value in
//! its memory. This way each value is cached once per cluster and the load on the source of truth
//! is kept at a minimum. If a peer cannot be reached, the node simply falls back to its own source.
//!
//! # Modules
//! * **LRU-Cache**: A size constrained (in terms of allocated memory) LRU cache which holds the
//!   values of a group. See [crate::lru] and the thread-safe wrapper in [crate::cache].
//! * **Singleflight**: Collapses concurrent lookups of the same key into a single fetch. See
//!   [crate::singleflight].
//! * **Consistent hashing**: Maps keys to nodes so that adding a node only moves a fraction of
//!   all keys. See [crate::consistenthash].
//! * **Groups**: Named cache namespaces which orchestrate all of the above. See [crate::group] and
//!   the [registry](crate::registry).
//! * **HTTP transport**: A [peer pool](crate::pool) which implements the peer selection and a
//!   [server](crate::server) which answers requests of other peers.
//!
//! # Examples
//! A complete node can be set up using the [Builder](builder::Builder):
//!
//! ```no_run
//! # use peercache::builder::Builder;
//! # use peercache::group::{source_fn, Group};
//! # use peercache::server::Server;
//! #[tokio::main]
//! async fn main() {
//!     let node = Builder::new().enable_all().build().await;
//!
//!     let _ = node.create_group(
//!         Group::builder("scores")
//!             .max_memory(64 * 1024 * 1024)
//!             .source(source_fn(|key: String| async move { Ok(key.into_bytes()) })),
//!     );
//!
//!     Server::new(node).event_loop().await;
//! }
//! ```
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod byteview;
pub mod cache;
pub mod config;
pub mod consistenthash;
pub mod error;
pub mod fmt;
pub mod group;
pub mod lru;
pub mod node;
pub mod peers;
pub mod pool;
pub mod registry;
pub mod server;
pub mod signals;
pub mod singleflight;

/// Contains the version of the Peercache library.
pub const PEERCACHE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the Peercache build being used.
pub const PEERCACHE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// node, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise the tests might crash as the logging system
    // is initialized several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned join handle as we're not interested
/// in the outcome of the task.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate peercache;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
