//! HTTP server.
//!
//! The server is built on Hyper and Tokio. [`Server::spawn`] binds the
//! listener and runs the accept loop on a background task; the returned
//! [`ServeHandle`] reports the loop's terminal result and drives the
//! graceful drain.
//!
//! # Architecture
//!
//! - TCP listener, optionally terminating TLS
//! - One task per connection, HTTP/1.1 with keep-alive
//! - Exact-path routing via the [`Router`](crate::Router); matched requests
//!   run through the [`MiddlewareChain`] before the route handler
//! - Per-connection idle watchdog and per-request read/write bounds
//!
//! # Example
//!
//! ```rust,no_run
//! use basement_middleware::MiddlewareChain;
//! use basement_server::{livez_handler, ListenerConfig, Router, Server, LIVEZ_PATH};
//! use basement_telemetry::Observability;
//!
//! # async fn example() -> basement_server::ServerResult<()> {
//! let observability = Observability::disabled("basement");
//! let server = Server::builder()
//!     .config(ListenerConfig::builder().addr("127.0.0.1:8080".parse().unwrap()).build())
//!     .router(Router::new().route_shared(LIVEZ_PATH, livez_handler(&observability)))
//!     .chain(MiddlewareChain::default())
//!     .build()?;
//!
//! let mut handle = server.spawn();
//! handle.serve_result().await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use basement_middleware::{MiddlewareChain, MiddlewareContext, Request, Response, ResponseExt};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

use crate::config::ListenerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::Router;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::state::{ServerState, StateTracker};
use crate::tls;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Body of the response for unregistered paths.
const NOT_FOUND_BODY: &str = "404 page not found";

/// A configured, not yet listening server.
pub struct Server {
    shared: Arc<Shared>,
    state: StateTracker,
    tracker: ConnectionTracker,
}

/// What every connection task needs.
struct Shared {
    config: ListenerConfig,
    router: Router,
    chain: MiddlewareChain,
    shutdown: ShutdownSignal,
    tls: Option<TlsAcceptor>,
}

impl Server {
    /// Creates a new server builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The listener configuration.
    #[must_use]
    pub fn config(&self) -> &ListenerConfig {
        &self.shared.config
    }

    /// The server's lifecycle state.
    #[must_use]
    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    /// The root cancellation shared by the accept loop, every connection
    /// and every request context.
    #[must_use]
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shared.shutdown
    }

    /// Binds the listener and starts accepting on a background task.
    ///
    /// Bind failures are reported through [`ServeHandle::serve_result`].
    #[must_use]
    pub fn spawn(self) -> ServeHandle {
        let (addr_tx, addr_rx) = watch::channel(None);
        let task = tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            self.state.clone(),
            self.tracker.clone(),
            addr_tx,
        ));

        ServeHandle {
            task: Some(task),
            local_addr: addr_rx,
            grace: self.shared.config.shutdown_timeout(),
            state: self.state,
            tracker: self.tracker,
            shutdown: self.shared.shutdown.clone(),
        }
    }
}

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    config: ListenerConfig,
    router: Router,
    chain: MiddlewareChain,
    shutdown: Option<ShutdownSignal>,
}

impl ServerBuilder {
    /// Sets the listener configuration.
    #[must_use]
    pub fn config(mut self, config: ListenerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the route table.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Sets the middleware chain wrapped around every matched route.
    #[must_use]
    pub fn chain(mut self, chain: MiddlewareChain) -> Self {
        self.chain = chain;
        self
    }

    /// Uses an existing signal as the server's root cancellation.
    #[must_use]
    pub fn shutdown_signal(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Builds the server, loading TLS material if configured.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Tls`] if the certificate or key cannot be used.
    pub fn build(self) -> ServerResult<Server> {
        let tls = self.config.tls().map(tls::load_acceptor).transpose()?;

        Ok(Server {
            shared: Arc::new(Shared {
                config: self.config,
                router: self.router,
                chain: self.chain,
                shutdown: self.shutdown.unwrap_or_default(),
                tls,
            }),
            state: StateTracker::new(),
            tracker: ConnectionTracker::new(),
        })
    }
}

/// Control over a running server.
pub struct ServeHandle {
    task: Option<JoinHandle<ServerResult<()>>>,
    local_addr: watch::Receiver<Option<SocketAddr>>,
    grace: Duration,
    state: StateTracker,
    tracker: ConnectionTracker,
    shutdown: ShutdownSignal,
}

impl ServeHandle {
    /// The bound address, or `None` if binding failed.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut rx = self.local_addr.clone();
        rx.wait_for(Option::is_some).await.ok().and_then(|addr| *addr)
    }

    /// The configured drain bound.
    #[must_use]
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Waits for the accept loop to end.
    ///
    /// This is cancel-safe. The loop's result is reported once; later calls
    /// return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the fatal listener error, or [`ServerError::ServeTaskLost`]
    /// if the task panicked.
    pub async fn serve_result(&mut self) -> ServerResult<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        joined.map_err(|e| ServerError::ServeTaskLost(e.to_string()))?
    }

    /// Stops accepting and waits for open connections to finish, bounded by
    /// `grace` overall.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ShutdownTimeout`] if connections are still
    /// open when `grace` runs out.
    pub async fn shutdown(&mut self, grace: Duration) -> ServerResult<()> {
        let deadline = Instant::now() + grace;
        self.state.advance(ServerState::ShuttingDown);
        self.shutdown.trigger();

        if let Some(task) = self.task.take() {
            match tokio::time::timeout_at(deadline, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "listener ended with error during shutdown"),
                Ok(Err(e)) => tracing::warn!(error = %e, "serve task lost during shutdown"),
                Err(_) => tracing::warn!("accept loop did not stop before the grace period ran out"),
            }
        }

        tracing::info!(
            connections = self.tracker.active_connections(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "draining connections"
        );
        let drained = self.tracker.drain(deadline).await;
        self.state.advance(ServerState::Stopped);

        match drained {
            Ok(()) => {
                tracing::info!("server stopped");
                Ok(())
            }
            Err(remaining) => Err(ServerError::ShutdownTimeout { remaining }),
        }
    }

    /// The root cancellation shared with every request.
    #[must_use]
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// The server's lifecycle state.
    #[must_use]
    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    /// Number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }
}

async fn accept_loop(
    shared: Arc<Shared>,
    state: StateTracker,
    tracker: ConnectionTracker,
    local_addr: watch::Sender<Option<SocketAddr>>,
) -> ServerResult<()> {
    let addr = shared.config.addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(source) => {
            state.advance(ServerState::Stopped);
            return Err(ServerError::Bind { addr, source });
        }
    };
    let bound = match listener.local_addr() {
        Ok(bound) => bound,
        Err(e) => {
            state.advance(ServerState::Stopped);
            return Err(ServerError::Accept(e));
        }
    };

    local_addr.send_replace(Some(bound));
    state.advance(ServerState::Serving);
    tracing::info!(addr = %bound, tls = shared.tls.is_some(), "server listening");

    let shutdown = shared.shutdown.recv();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                tracing::info!("stopped accepting connections");
                return Ok(());
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let token = tracker.acquire();
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        handle_connection(shared, stream, remote).await;
                        drop(token);
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
}

async fn handle_connection(shared: Arc<Shared>, stream: TcpStream, remote: SocketAddr) {
    let Some(acceptor) = shared.tls.clone() else {
        serve_connection(shared, TokioIo::new(stream), remote).await;
        return;
    };

    match tokio::time::timeout(shared.config.read_timeout(), acceptor.accept(stream)).await {
        Ok(Ok(stream)) => serve_connection(shared, TokioIo::new(stream), remote).await,
        Ok(Err(e)) => tracing::debug!(%remote, error = %e, "tls handshake failed"),
        Err(_) => tracing::debug!(%remote, "tls handshake timed out"),
    }
}

async fn serve_connection<I>(shared: Arc<Shared>, io: I, remote: SocketAddr)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let activity = Arc::new(Activity::new());

    let service = {
        let shared = Arc::clone(&shared);
        let activity = Arc::clone(&activity);
        service_fn(move |request: http::Request<Incoming>| {
            let shared = Arc::clone(&shared);
            let busy = activity.begin();
            async move {
                let response = shared.handle_request(request).await;
                drop(busy);
                Ok::<_, Infallible>(response)
            }
        })
    };

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(shared.config.read_timeout())
        .keep_alive(true)
        .serve_connection(io, service);
    tokio::pin!(conn);

    let shutdown = shared.shutdown.recv();
    tokio::pin!(shutdown);
    let idle_timeout = shared.config.idle_timeout();
    let mut draining = false;

    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(%remote, error = %e, "connection closed with error");
                }
                break;
            }
            () = &mut shutdown, if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
            () = activity.idle_expired(idle_timeout), if !draining => {
                tracing::debug!(%remote, "closing idle connection");
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

impl Shared {
    async fn handle_request(&self, request: http::Request<Incoming>) -> Response {
        let Some(route) = self.router.match_route(request.uri().path()) else {
            tracing::debug!(method = %request.method(), path = request.uri().path(), "no route");
            return Response::error(StatusCode::NOT_FOUND, NOT_FOUND_BODY);
        };

        let (parts, body) = request.into_parts();
        let body = match tokio::time::timeout(self.config.read_timeout(), body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "failed to read request body");
                return Response::error(StatusCode::BAD_REQUEST, "failed to read request body");
            }
            Err(_) => {
                tracing::warn!(path = route.path(), "request body read timed out");
                return Response::error(StatusCode::REQUEST_TIMEOUT, "request body read timed out");
            }
        };
        let request: Request = http::Request::from_parts(parts, Full::new(body));

        let mut ctx = MiddlewareContext::for_route(route.path());
        ctx.set_extension(self.shutdown.clone());

        let handler = route.handler();
        let processed = self
            .chain
            .process(ctx, request, move |ctx, request| handler(ctx, request));

        match tokio::time::timeout(self.config.write_timeout(), processed).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(path = route.path(), "request timed out");
                Response::error(StatusCode::SERVICE_UNAVAILABLE, "request timed out")
            }
        }
    }
}

/// Request activity on one connection, for the idle watchdog.
struct Activity {
    in_flight: AtomicUsize,
    last_active: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Busy(Arc::clone(self))
    }

    /// Completes once no request has been in flight for `idle`.
    async fn idle_expired(&self, idle: Duration) {
        loop {
            let deadline = if self.in_flight.load(Ordering::SeqCst) > 0 {
                Instant::now() + idle
            } else {
                *self.last_active.lock() + idle
            };
            tokio::time::sleep_until(deadline).await;

            if self.in_flight.load(Ordering::SeqCst) == 0
                && self.last_active.lock().elapsed() >= idle
            {
                return;
            }
        }
    }
}

struct Busy(Arc<Activity>);

impl Drop for Busy {
    fn drop(&mut self) {
        *self.0.last_active.lock() = Instant::now();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
