//! The standard chain stages.
//!
//! 1. [`cors`] - cross-origin policy, rejects disallowed origins
//! 2. [`trace_context`] - remote parent extraction and the request span
//! 3. [`request_log`] - one structured line per request
//! 4. [`metrics`] - request count, duration and concurrency

pub mod cors;
pub mod metrics;
pub mod request_log;
pub mod trace_context;

pub use cors::{CorsBuilder, CorsMiddleware, CorsPolicy};
pub use metrics::{AppMetrics, MetricsMiddleware};
pub use request_log::{RequestLogMiddleware, RequestSummary};
pub use trace_context::TraceContextMiddleware;
