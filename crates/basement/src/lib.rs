//! Basement - observable HTTP service bootstrap
//!
//! `basement server` loads layered configuration, initializes logging and
//! the OpenTelemetry providers, and serves `/livez` behind the standard
//! middleware chain until interrupted.
//!
//! # Example Usage
//!
//! ```bash
//! # Plain HTTP, no export
//! $ basement server --port 8080 --disable-tls --disable-telemetry
//!
//! # TLS with a collector sidecar
//! $ basement server --tls-cert /etc/tls/tls.crt --tls-cert-key /etc/tls/tls.key \
//!     --telemetry-collector localhost:4317
//!
//! # Environment overrides
//! $ BASEMENT__SERVER__PORT=9000 OTEL_SDK_DISABLED=true basement server --disable-tls
//! ```
//!
//! # Exit status
//!
//! - `0` after a graceful stop, including a drain that hit its bound
//! - `1` on any start failure: configuration, telemetry, TLS material, bind
//! - `130` on a second interrupt during shutdown

#![doc(html_root_url = "https://docs.rs/basement/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod signal;

pub use cli::{Cli, Command, ServerArgs};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Executes a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Server(args) => {
            let config = app::load_configuration(cli.config.as_deref(), args.overrides())?;
            app::serve(config, signal::interrupt()).await
        }
    }
}
