//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that all middleware stages implement.
//! Middleware processes requests before they reach handlers and responses after
//! handlers complete.
//!
//! Each middleware's code before `next.run` executes on the way in, in chain
//! order; its code after `next.run` executes on the way out, in reverse.
//!
//! # Example
//!
//! ```
//! use basement_middleware::{BoxFuture, Middleware, MiddlewareContext, Next, Request, Response};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             let response = next.run(ctx, request).await;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "timed");
//!             response
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core middleware trait.
///
/// All middleware stages implement this trait. Middleware receives a mutable
/// context, the incoming request, and a [`Next`] callback to invoke the
/// next middleware in the chain.
///
/// # Invariants
///
/// - Middleware MUST call `next.run()` exactly once (unless short-circuiting)
/// - Middleware SHOULD NOT suppress errors from downstream middleware
/// - Middleware MUST NOT modify the chain order
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    ///
    /// This name is used for logging, metrics, and debugging.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The mutable middleware context
    /// * `request` - The incoming HTTP request
    /// * `next` - Callback to invoke the next middleware
    ///
    /// # Returns
    ///
    /// The HTTP response (either from downstream or generated here)
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// Callback to invoke the next middleware in the chain.
///
/// This type is passed to middleware and must be called (exactly once)
/// to continue processing. If not called, the middleware short-circuits
/// the chain and returns its own response.
pub struct Next<'a> {
    /// The remaining middleware chain
    inner: NextInner<'a>,
}

/// Internal representation of the next middleware chain.
enum NextInner<'a> {
    /// More middleware to process
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain - invoke the handler
    Handler(Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a>),
}

impl<'a> Next<'a> {
    /// Creates a new `Next` that will invoke the given middleware.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    ///
    /// This consumes `self` to ensure it can only be called once.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, *next).await
            }
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::{Request as HttpRequest, StatusCode};
    use http_body_util::Full;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("before:{}", self.name));
                let response = next.run(ctx, request).await;
                self.log.lock().unwrap().push(format!("after:{}", self.name));
                response
            })
        }
    }

    struct Reject;

    impl Middleware for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            _request: Request,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async { Response::error(StatusCode::FORBIDDEN, "no") })
        }
    }

    fn request() -> Request {
        HttpRequest::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn ok_handler(
        log: Arc<Mutex<Vec<String>>>,
    ) -> impl FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send {
        move |_ctx, _req| {
            Box::pin(async move {
                log.lock().unwrap().push("handler".to_string());
                Response::json(StatusCode::OK, "{}")
            })
        }
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = MiddlewareContext::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let response = Next::handler(ok_handler(log.clone()))
            .run(&mut ctx, request())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["handler"]);
    }

    #[tokio::test]
    async fn test_nested_before_and_after() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = Recording { name: "outer", log: log.clone() };
        let inner = Recording { name: "inner", log: log.clone() };
        let mut ctx = MiddlewareContext::new();

        let chain = Next::new(&outer, Next::new(&inner, Next::handler(ok_handler(log.clone()))));
        let response = chain.run(&mut ctx, request()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["before:outer", "before:inner", "handler", "after:inner", "after:outer"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = Recording { name: "outer", log: log.clone() };
        let mut ctx = MiddlewareContext::new();

        let chain = Next::new(&outer, Next::new(&Reject, Next::handler(ok_handler(log.clone()))));
        let response = chain.run(&mut ctx, request()).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*log.lock().unwrap(), vec!["before:outer", "after:outer"]);
    }
}
