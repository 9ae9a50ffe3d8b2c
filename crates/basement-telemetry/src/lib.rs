//! OpenTelemetry provider lifecycle for the basement service.
//!
//! This crate owns everything between the configuration and the exported
//! telemetry:
//!
//! - **Resource**: identity attributes shared by every signal
//! - **Providers**: trace, log and metric providers over OTLP/gRPC
//! - **Shutdown registry**: one idempotent, aggregated release of all of them
//! - **Logging**: structured stdout logs, bridged to the log provider
//! - **Runtime metrics**: process memory, threads and uptime
//!
//! # Architecture
//!
//! ```text
//!   ProviderOptions
//!         │
//!         ▼
//!   ResourceDescriptor ──► SpanExporter ──► TracerProvider ─┐
//!                      ├─► LogExporter  ──► LoggerProvider ─┼─► ShutdownRegistry
//!                      └─► MetricExporter ► MeterProvider  ─┘
//!                                               │
//!                                               ▼
//!                                        Observability
//!                               (tracer, meter, propagator)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use basement_telemetry::{init_logging, init_providers, LogConfig, ProviderOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let logs = init_logging(&LogConfig::default())?;
//!
//!     let options = ProviderOptions::new(true, "basement")
//!         .with_collector_endpoint("otel-collector:4317");
//!     let (observability, shutdown) = init_providers(&options).await?;
//!     observability.install_global();
//!     if let Some(provider) = observability.logger_provider() {
//!         logs.attach_exporter(provider)?;
//!     }
//!
//!     // ... serve ...
//!
//!     shutdown.shutdown(Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod endpoint;
pub mod error;
pub mod logging;
pub mod observability;
pub mod propagation;
pub mod providers;
pub mod registry;
pub mod resource;
pub mod runtime;

pub use error::{BoxError, ShutdownError, Signal, TelemetryError};
pub use logging::{init_logging, LogConfig, LogHandle};
pub use observability::{Observability, INSTRUMENTATION_SCOPE};
pub use propagation::{HeaderExtractor, HeaderInjector};
pub use providers::{
    init_providers, init_providers_with, ExportTransport, GrpcTransport, ProviderOptions,
};
pub use registry::{ShutdownHandle, ShutdownRegistry};
pub use resource::{HostDetector, ResourceDescriptor, SystemHost};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
