//! Collapses concurrent fetches of the same key into a single one.
//!
//! If a popular key is missing from the cache, many callers will request it at (more or less) the
//! same time. Without any coordination, each of them would ask the source (or a peer) for the
//! value. A [SingleFlight] ensures that only the first caller actually performs the fetch. All
//! callers arriving while this fetch is in flight simply wait for it and receive a clone of its
//! result - be it a value or an error.
//!
//! Once a fetch completes, it is forgotten. Therefore the next caller for the same key will again
//! trigger a fetch. Caching the result is the task of the caller (see
//! [Group](crate::group::Group)).
//!
//! Internally each in-flight fetch is a [Shared] future. The map of in-flight fetches is guarded
//! by a mutex, which is only held to look up or register a fetch, but never while the fetch
//! itself is running. Therefore fetches of different keys never block each other.
//!
//! A fetch removes itself from the map in the very poll in which it completes, no matter which
//! caller drives it. If the caller which started a fetch is cancelled, the fetch stays registered
//! and is driven by any caller which joined before or arrives later. Therefore a key is never
//! fetched twice at the same time and a completed result is never handed to a later caller.
//!
//! # Examples
//! ```
//! # use peercache::singleflight::SingleFlight;
//! # #[tokio::main]
//! # async fn main() {
//! let flight = SingleFlight::new();
//!
//! // Both calls are polled concurrently, but only the first one performs its fetch...
//! let (a, b) = tokio::join!(
//!     flight.call("key", || async {
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!         1
//!     }),
//!     flight.call("key", || async { 2 })
//! );
//! assert_eq!((a, b), (1, 1));
//!
//! // ..once completed, the next call triggers a new fetch.
//! assert_eq!(flight.call("key", || async { 3 }).await, 3);
//! # }
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

type Flight<T> = Shared<BoxFuture<'static, T>>;
type Flights<T> = Arc<Mutex<HashMap<String, Flight<T>>>>;

/// Keeps track of all fetches which are currently in flight.
pub struct SingleFlight<T> {
    calls: Flights<T>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    /// Creates a new instance without any fetches in flight.
    pub fn new() -> Self {
        SingleFlight {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Executes the given fetch unless a fetch for the same key is already in flight.
    ///
    /// If no fetch is in flight, the future returned by **fetch** is registered and awaited. Its
    /// result is returned to this caller and to every caller which joined in the meantime. If a
    /// fetch is already in flight, **fetch** is not invoked at all and the result of the
    /// in-flight fetch is returned instead.
    ///
    /// Note that **fetch** is invoked while the internal lock is held. It should therefore only
    /// create the future which does the actual work (e.g. an **async move** block).
    pub async fn call<F, Fut>(&self, key: &str, fetch: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut calls = self.calls.lock().unwrap();
            match calls.get(key) {
                Some(flight) => flight.clone(),
                None => {
                    let flight = SingleFlight::deregister_on_completion(
                        self.calls.clone(),
                        key.to_owned(),
                        fetch(),
                    );
                    let _ = calls.insert(key.to_owned(), flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// Wraps the given fetch so that it removes its own registration once it yields a result.
    fn deregister_on_completion<Fut>(calls: Flights<T>, key: String, fetch: Fut) -> Flight<T>
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        async move {
            let result = fetch.await;
            if let Ok(mut calls) = calls.lock() {
                let _ = calls.remove(&key);
            }

            result
        }
        .boxed()
        .shared()
    }

    /// Returns the number of fetches which are currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        SingleFlight::new()
    }
}
