//! Ordered middleware chain.
//!
//! A [`MiddlewareChain`] composes middleware around a terminal handler.
//! Each stage's "before" logic runs in chain order on the way in and its
//! "after" logic in reverse order on the way out.
//!
//! ## Standard Stages
//!
//! [`MiddlewareChain::standard`] builds the fixed order every route is
//! wrapped with:
//!
//! 1. **CORS** - reject disallowed origins before any other work
//! 2. **Trace context** - start the request span the rest runs under
//! 3. **Request log** - log with the span's trace correlation
//! 4. **Metrics** - record latency and status over everything inside it

use std::sync::Arc;

use basement_config::CorsConfig;
use basement_telemetry::Observability;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::stages::{CorsMiddleware, MetricsMiddleware, RequestLogMiddleware, TraceContextMiddleware};
use crate::types::{Request, Response};

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An immutable, ordered middleware chain.
///
/// Cheap to clone. Changing the stages means building a new chain.
///
/// # Example
///
/// ```
/// use basement_config::CorsConfig;
/// use basement_middleware::chain::{MiddlewareChain, Stage};
/// use basement_telemetry::Observability;
///
/// let chain = MiddlewareChain::standard(&Observability::disabled("basement"), &CorsConfig::default());
///
/// let expected: Vec<_> = Stage::all().iter().map(|s| s.name()).collect();
/// assert_eq!(chain.stage_names(), expected);
/// ```
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Vec<BoxedMiddleware>,
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl MiddlewareChain {
    /// Creates a new chain builder.
    #[must_use]
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// The standard chain: CORS, trace context, request log, metrics.
    #[must_use]
    pub fn standard(observability: &Observability, cors: &CorsConfig) -> Self {
        Self::builder()
            .layer(CorsMiddleware::from_config(cors))
            .layer(TraceContextMiddleware::new(observability))
            .layer(RequestLogMiddleware::new())
            .layer(MetricsMiddleware::new(observability))
            .build()
    }

    /// Processes a request through every stage and then `handler`.
    pub async fn process<H>(&self, mut ctx: MiddlewareContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send,
    {
        self.process_with(&mut ctx, request, handler).await
    }

    /// Like [`process`](Self::process), leaving the context with the caller
    /// so stage extensions can be inspected afterwards.
    pub async fn process_with<H>(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send,
    {
        let next = self.build_chain(handler);
        next.run(ctx, request).await
    }

    /// Builds the nested `Next` for one request, from back to front.
    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns a new chain with every stage passed through `wrap`, keeping
    /// the order.
    #[must_use]
    pub fn map_stages<F>(&self, wrap: F) -> Self
    where
        F: Fn(BoxedMiddleware) -> BoxedMiddleware,
    {
        Self {
            stages: self.stages.iter().cloned().map(wrap).collect(),
        }
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Builder for a [`MiddlewareChain`].
#[derive(Default)]
pub struct ChainBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl ChainBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage; stages run in the order they are added.
    #[must_use]
    pub fn layer<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn layer_shared(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Builds the chain.
    #[must_use]
    pub fn build(self) -> MiddlewareChain {
        MiddlewareChain {
            stages: self.stages,
        }
    }
}

/// The standard stages, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: cross-origin policy
    Cors = 1,
    /// Stage 2: trace-context extraction and request span
    TraceContext = 2,
    /// Stage 3: request logging
    RequestLog = 3,
    /// Stage 4: request metrics
    Metrics = 4,
}

impl Stage {
    /// Returns the stage name, as reported by [`Middleware::name`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cors => "cors",
            Self::TraceContext => "trace_context",
            Self::RequestLog => "request_log",
            Self::Metrics => "metrics",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 4] {
        [Self::Cors, Self::TraceContext, Self::RequestLog, Self::Metrics]
    }
}
