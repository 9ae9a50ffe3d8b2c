//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the chain:
//! trace correlation set by the trace-context stage, the matched route, and
//! typed extensions such as the request's OpenTelemetry context or the
//! server's shutdown signal.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;

/// Context that flows through the middleware chain.
///
/// # Example
///
/// ```
/// use basement_middleware::context::MiddlewareContext;
///
/// let mut ctx = MiddlewareContext::for_route("/livez");
/// ctx.set_trace_id("4bf92f3577b34da6a3ce929d0e0e4736".to_string());
///
/// assert_eq!(ctx.route(), Some("/livez"));
/// assert!(ctx.trace_id().is_some());
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// OpenTelemetry trace ID (hex string).
    trace_id: Option<String>,

    /// OpenTelemetry span ID (hex string).
    span_id: Option<String>,

    /// The registered route the request matched.
    route: Option<String>,

    /// When the request started processing.
    started_at: Instant,

    /// Type-erased extension data.
    ///
    /// Middleware can store arbitrary data here using type-safe keys.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: None,
            span_id: None,
            route: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Creates a context for a matched route.
    #[must_use]
    pub fn for_route(route: impl Into<String>) -> Self {
        Self {
            route: Some(route.into()),
            ..Self::new()
        }
    }

    /// Returns the trace ID, if set.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Sets the trace ID.
    ///
    /// This should only be called by the trace-context stage.
    pub fn set_trace_id(&mut self, trace_id: String) {
        self.trace_id = Some(trace_id);
    }

    /// Returns the span ID, if set.
    #[must_use]
    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    /// Sets the span ID.
    ///
    /// This should only be called by the trace-context stage.
    pub fn set_span_id(&mut self, span_id: String) {
        self.span_id = Some(span_id);
    }

    /// Returns the matched route, if any.
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use basement_middleware::context::MiddlewareContext;
    ///
    /// #[derive(Clone)]
    /// struct Tenant(&'static str);
    ///
    /// let mut ctx = MiddlewareContext::new();
    /// ctx.set_extension(Tenant("acme"));
    ///
    /// assert_eq!(ctx.get_extension::<Tenant>().unwrap().0, "acme");
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    ///
    /// Returns `None` if no extension of the given type was stored.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MiddlewareContext {
    fn clone(&self) -> Self {
        // Extensions are not cloned; they are not `Clone`.
        Self {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            route: self.route.clone(),
            started_at: self.started_at,
            extensions: HashMap::new(),
        }
    }
}
