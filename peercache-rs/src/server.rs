//! Contains the HTTP server which answers the requests of other peers.
//!
//! Opens a server socket on the specified port (**server.port** in the config or 2410 as fallback)
//! and binds it to the selected IP (**server.host** in the config or 0.0.0.0 as fallback). Each
//! request has the form `GET <base_path><group>/<key>` (with both, group and key being percent
//! encoded) and is answered with the raw bytes of the value.
//!
//! If the address is in use, the server keeps trying to bind it every 500ms. Therefore a new
//! instance can be started while the old one is still draining. Also the server observes the
//! config and moves to another host or port if the config changes.
//!
//! # Example
//! ```no_run
//! # use peercache::builder::Builder;
//! # use peercache::server::Server;
//! #[tokio::main]
//! async fn main() {
//!     let node = Builder::new().enable_all().build().await;
//!
//!     // Run on a different port than a production instance...
//!     node.config().load_from_string("
//!         server:
//!             port: 1503
//!     ", None).unwrap();
//!
//!     Server::new(node).event_loop().await;
//! }
//! ```
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use tokio::sync::broadcast::error::RecvError;

use crate::error::CacheError;
use crate::node::Node;
use crate::spawn;

/// Specifies how often a running server checks if the node has been terminated.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Specifies the interval in which we try to bind the server socket.
const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Serves the values of all groups of a node to its peers.
pub struct Server {
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
    node: Arc<Node>,
}

impl Server {
    /// Creates a server for the given node.
    ///
    /// Note that this will not start the server. Use [event_loop](Server::event_loop) (most
    /// probably within the main task) or [fork](Server::fork).
    pub fn new(node: Arc<Node>) -> Arc<Self> {
        Arc::new(Server {
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
            node,
        })
    }

    /// Determines if the server should keep its socket open.
    ///
    /// This is toggled to false once the address in the config changes, so that the event loop
    /// rebinds to the new address.
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the address the server is currently listening on.
    pub fn current_address(&self) -> Option<String> {
        self.current_address.lock().unwrap().clone()
    }

    /// Determines the server address based on the current configuration.
    fn address(&self) -> String {
        let handle = self.node.config().current();
        format!(
            "{}:{}",
            handle.query("server.host").as_str().unwrap_or("0.0.0.0"),
            handle
                .query("server.port")
                .as_i64()
                .filter(|port| *port > 0 && *port <= i64::from(u16::MAX))
                .unwrap_or(2410)
        )
    }

    /// Starts the event loop in a separate task.
    pub fn fork(server: &Arc<Server>) {
        let cloned_server = server.clone();
        spawn!(async move {
            cloned_server.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the server socket is open.
    pub async fn fork_and_await(server: &Arc<Server>) {
        Server::fork(server);

        while server.current_address().is_none() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Binds the server socket and serves requests until the node is terminated.
    ///
    /// If the configured address changes, the socket is closed and re-opened on the new address.
    pub async fn event_loop(&self) {
        let mut address = String::new();
        let mut last_bind_error_reported: Option<Instant> = None;

        while self.node.is_running() {
            if !self.is_running() {
                address = self.address();
                self.running.store(true, Ordering::Release);
            }

            match bind(&address).await {
                Ok(builder) => {
                    log::info!("Opened server socket on {}...", &address);
                    *self.current_address.lock().unwrap() = Some(address.clone());
                    self.serve(builder, &address).await;
                    *self.current_address.lock().unwrap() = None;
                    log::info!("Closing server socket on {}.", &address);
                }
                Err(error) => {
                    // Only report every 5s, as we retry every 500ms...
                    if last_bind_error_reported
                        .map(|reported| reported.elapsed().as_secs() >= 5)
                        .unwrap_or(true)
                    {
                        log::error!(
                            "Cannot open server address {}: {:#}. Retrying every 500ms...",
                            &address,
                            error
                        );
                        last_bind_error_reported = Some(Instant::now());
                    }
                    tokio::time::sleep(BIND_RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn serve(&self, builder: hyper::server::Builder<AddrIncoming>, address: &str) {
        let node = self.node.clone();
        let make_service = make_service_fn(move |_connection| {
            let node = node.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    handle_request(node.clone(), request)
                }))
            }
        });

        let result = builder
            .serve(make_service)
            .with_graceful_shutdown(self.await_shutdown(address))
            .await;

        if let Err(error) = result {
            log::error!("Server on {} failed: {}", address, error);
        }
    }

    /// Completes once the node has been terminated or once the configured address changed.
    async fn await_shutdown(&self, address: &str) {
        let mut config_changed = self.node.config().notifier();

        while self.node.is_running() && self.is_running() {
            match tokio::time::timeout(SHUTDOWN_CHECK_INTERVAL, config_changed.recv()).await {
                Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => {
                    let new_address = self.address();
                    if new_address != address {
                        log::info!(
                            "Server address has changed from {} to {}. Restarting server...",
                            address,
                            new_address
                        );
                        self.running.store(false, Ordering::Release);
                    }
                }
                Ok(Err(RecvError::Closed)) => return,
                Err(_) => (),
            }
        }
    }
}

async fn bind(address: &str) -> anyhow::Result<hyper::server::Builder<AddrIncoming>> {
    let socket_address: SocketAddr = tokio::net::lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Cannot resolve {}", address))?;

    Ok(hyper::Server::try_bind(&socket_address)?)
}

async fn handle_request(
    node: Arc<Node>,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    log::debug!("{} {}", request.method(), request.uri());

    if request.method() != Method::GET {
        return Ok(text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Only GET requests are supported",
        ));
    }

    let base_path = node.pool().base_path();
    let remainder = match request.uri().path().strip_prefix(base_path.as_str()) {
        Some(remainder) => remainder,
        None => {
            return Ok(text_response(
                StatusCode::NOT_FOUND,
                format!("Unexpected path: {}", request.uri().path()),
            ))
        }
    };

    let (group_name, key) = match remainder.split_once('/') {
        Some((group_name, key)) => match (decode(group_name), decode(key)) {
            (Some(group_name), Some(key)) => (group_name, key),
            _ => return Ok(text_response(StatusCode::BAD_REQUEST, "Malformed encoding")),
        },
        None => {
            return Ok(text_response(
                StatusCode::BAD_REQUEST,
                "Expected a path like <base_path><group>/<key>",
            ))
        }
    };

    let group = match node.groups().find(&group_name) {
        Some(group) => group,
        None => {
            return Ok(text_response(
                StatusCode::NOT_FOUND,
                CacheError::UnknownGroup(group_name).to_string(),
            ))
        }
    };

    Ok(match group.get(&key).await {
        Ok(value) => {
            let mut response = Response::new(Body::from(value.bytes()));
            let _ = response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            response
        }
        Err(error) => text_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    })
}

fn decode(segment: &str) -> Option<String> {
    urlencoding::decode(segment)
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn text_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    let _ = response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );

    response
}
