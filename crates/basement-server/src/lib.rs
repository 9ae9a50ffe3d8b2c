//! # Basement Server
//!
//! The listening side of the basement service:
//!
//! - HTTP/1.1 over plain TCP or TLS via Hyper and `tokio-rustls`
//! - Exact-path routing with the middleware chain around every route
//! - The `/livez` liveness endpoint
//! - Lifecycle control: serve until failure or interrupt, then a bounded
//!   graceful drain
//!
//! ## Example
//!
//! ```rust,no_run
//! use basement_config::CorsConfig;
//! use basement_middleware::MiddlewareChain;
//! use basement_server::{lifecycle, livez_handler, ListenerConfig, Router, Server, LIVEZ_PATH};
//! use basement_telemetry::Observability;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let observability = Observability::disabled("basement");
//!     let server = Server::builder()
//!         .config(ListenerConfig::default())
//!         .router(Router::new().route_shared(LIVEZ_PATH, livez_handler(&observability)))
//!         .chain(MiddlewareChain::standard(&observability, &CorsConfig::default()))
//!         .build()?;
//!
//!     lifecycle::run(server, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/basement-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod health;
pub mod lifecycle;
mod router;
mod server;
mod shutdown;
mod state;
mod tls;

pub use config::{
    ListenerConfig, ListenerConfigBuilder, TlsPaths, DEFAULT_IDLE_TIMEOUT, DEFAULT_READ_TIMEOUT,
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
pub use error::{ServerError, ServerResult};
pub use health::{livez_handler, livez_response, LivezStatus, LIVEZ_PATH};
pub use lifecycle::{run, supervise};
pub use router::{RouteHandler, RouteMatch, Router};
pub use server::{ServeHandle, Server, ServerBuilder};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownReceiver, ShutdownSignal};
pub use state::{ServerState, StateTracker};
