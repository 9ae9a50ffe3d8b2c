//! # Basement Middleware
//!
//! Request interceptors wrapped around every registered route.
//!
//! ## Chain Order
//!
//! ```text
//! Request → CORS → TraceContext → RequestLog → Metrics → Handler
//!                                                           ↓
//! Response ← CORS ← TraceContext ← RequestLog ← Metrics ←───┘
//! ```
//!
//! | Stage | Middleware    | Purpose                                       |
//! |-------|---------------|-----------------------------------------------|
//! | 1     | CORS          | Reject disallowed origins, answer preflights  |
//! | 2     | Trace context | Continue the remote trace, start server span  |
//! | 3     | Request log   | Structured log line with trace correlation    |
//! | 4     | Metrics       | Request count, latency and in-flight requests |
//!
//! The order is fixed. Every route gets the same chain.
//!
//! ## Example
//!
//! ```
//! use basement_config::CorsConfig;
//! use basement_middleware::chain::{MiddlewareChain, Stage};
//! use basement_telemetry::Observability;
//!
//! let chain = MiddlewareChain::standard(&Observability::disabled("basement"), &CorsConfig::default());
//!
//! assert_eq!(chain.len(), Stage::all().len());
//! assert_eq!(chain.stage_names()[0], "cors");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod context;
pub mod middleware;
pub mod stages;
pub mod types;

pub use chain::{BoxedMiddleware, ChainBuilder, MiddlewareChain, Stage};
pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, Middleware, Next};
pub use types::{Request, Response, ResponseExt};
