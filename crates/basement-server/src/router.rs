//! Route table.
//!
//! Routes are exact paths. A request for a registered path runs through the
//! middleware chain and then the route's handler; any other path is answered
//! with `404` directly, without entering the chain.
//!
//! # Example
//!
//! ```rust
//! use basement_middleware::{Response, ResponseExt};
//! use basement_server::Router;
//! use http::StatusCode;
//!
//! let router = Router::new().route("/livez", |_ctx, _req| {
//!     Box::pin(async { Response::json(StatusCode::OK, r#"{"status":"ok"}"#) })
//! });
//!
//! assert!(router.match_route("/livez").is_some());
//! assert!(router.match_route("/livez/").is_none());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use basement_middleware::{BoxFuture, MiddlewareContext, Request, Response};

/// A route handler: the terminal step after the middleware chain.
pub type RouteHandler =
    Arc<dyn Fn(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// A matched route.
#[derive(Clone)]
pub struct RouteMatch {
    path: Arc<str>,
    handler: RouteHandler,
}

impl RouteMatch {
    /// The registered path that matched.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The route's handler.
    #[must_use]
    pub fn handler(&self) -> RouteHandler {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch").field("path", &self.path).finish()
    }
}

/// Exact-path route table.
#[derive(Clone, Default)]
pub struct Router {
    routes: BTreeMap<Arc<str>, RouteHandler>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `path`, replacing any earlier registration.
    #[must_use]
    pub fn route<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response>
            + Send
            + Sync
            + 'static,
    {
        self.route_shared(path, Arc::new(handler))
    }

    /// Registers an already shared handler.
    #[must_use]
    pub fn route_shared(mut self, path: &str, handler: RouteHandler) -> Self {
        self.routes.insert(Arc::from(path), handler);
        self
    }

    /// Looks up the route for `path`.
    #[must_use]
    pub fn match_route(&self, path: &str) -> Option<RouteMatch> {
        self.routes
            .get_key_value(path)
            .map(|(path, handler)| RouteMatch {
                path: Arc::clone(path),
                handler: Arc::clone(handler),
            })
    }

    /// Registered paths in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.routes.keys().map(AsRef::as_ref).collect()
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("paths", &self.paths()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basement_middleware::ResponseExt;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    fn status_handler(
        status: StatusCode,
    ) -> impl Fn(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + Sync {
        move |_ctx, _req| Box::pin(async move { Response::empty(status) })
    }

    #[test]
    fn test_exact_match_only() {
        let router = Router::new().route("/livez", status_handler(StatusCode::OK));

        assert_eq!(router.match_route("/livez").unwrap().path(), "/livez");
        assert!(router.match_route("/").is_none());
        assert!(router.match_route("/livez/extra").is_none());
        assert!(router.match_route("/LIVEZ").is_none());
    }

    #[test]
    fn test_paths_sorted() {
        let router = Router::new()
            .route("/readyz", status_handler(StatusCode::OK))
            .route("/livez", status_handler(StatusCode::OK));

        assert_eq!(router.paths(), vec!["/livez", "/readyz"]);
        assert_eq!(router.len(), 2);
    }

    #[tokio::test]
    async fn test_reregister_replaces() {
        let router = Router::new()
            .route("/livez", status_handler(StatusCode::OK))
            .route("/livez", status_handler(StatusCode::NO_CONTENT));
        assert_eq!(router.len(), 1);

        let handler = router.match_route("/livez").unwrap().handler();
        let mut ctx = MiddlewareContext::new();
        let request = http::Request::new(Full::new(Bytes::new()));
        let response = handler(&mut ctx, request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
