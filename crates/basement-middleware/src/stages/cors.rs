//! Cross-origin policy stage.
//!
//! First stage of the standard chain. Requests from origins outside the
//! policy are rejected with `403` before any span is started or any log
//! line is written. Allowed requests get the usual CORS response headers.
//!
//! Preflight `OPTIONS` requests (those carrying both `Origin` and
//! `Access-Control-Request-Method`) are answered here with `204` and never
//! reach the handler.
//!
//! ## Example
//!
//! ```
//! use basement_middleware::stages::CorsMiddleware;
//! use http::Method;
//! use std::time::Duration;
//!
//! let cors = CorsMiddleware::builder()
//!     .allow_origin("https://app.example.com")
//!     .allow_methods([Method::GET, Method::POST])
//!     .allow_headers(["Content-Type", "traceparent"])
//!     .max_age(Duration::from_secs(600))
//!     .build();
//! # let _ = cors;
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use basement_config::CorsConfig;
use http::{HeaderValue, Method, StatusCode};
use tracing::debug;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// Cross-origin policy enforcement.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    policy: CorsPolicy,
}

/// The resolved cross-origin policy.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: AllowedOrigins,
    allowed_methods: BTreeSet<String>,
    allowed_headers: BTreeSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

/// Represents the set of allowed origins.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    /// Allow any origin (wildcard `*`).
    Any,
    /// Allow specific origins.
    List(BTreeSet<String>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    /// Returns the `Access-Control-Allow-Origin` value for an allowed origin.
    ///
    /// With credentials the origin is echoed, since browsers reject `*`
    /// together with `Access-Control-Allow-Credentials: true`.
    fn header_value(&self, origin: &str, credentials: bool) -> Option<HeaderValue> {
        match self {
            Self::Any if !credentials => Some(HeaderValue::from_static("*")),
            _ if self.is_allowed(origin) => HeaderValue::from_str(origin).ok(),
            _ => None,
        }
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        CorsPolicy::from_config(&CorsConfig::default())
    }
}

impl CorsPolicy {
    /// Builds a policy from the `cors` configuration section.
    ///
    /// An origin entry of `"*"` allows any origin. Methods are upper-cased
    /// and headers lower-cased for comparison.
    #[must_use]
    pub fn from_config(config: &CorsConfig) -> Self {
        let allowed_origins = if config.allowed_origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(config.allowed_origins.iter().cloned().collect())
        };

        Self {
            allowed_origins,
            allowed_methods: config
                .allowed_methods
                .iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
            allowed_headers: config
                .allowed_headers
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            allow_credentials: config.allow_credentials,
            max_age: (config.max_age_secs > 0).then(|| Duration::from_secs(config.max_age_secs)),
        }
    }

    /// Returns the allowed origins.
    #[must_use]
    pub fn allowed_origins(&self) -> &AllowedOrigins {
        &self.allowed_origins
    }

    fn allows_method(&self, method: &str) -> bool {
        self.allowed_methods.contains(&method.to_ascii_uppercase())
    }

    fn allows_header(&self, header: &str) -> bool {
        self.allowed_headers.contains("*") || self.allowed_headers.contains(header)
    }
}

/// Builder for a [`CorsMiddleware`].
#[derive(Debug, Clone)]
pub struct CorsBuilder {
    policy: CorsPolicy,
}

impl Default for CorsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsBuilder {
    /// Creates a builder starting from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policy: CorsPolicy {
                allowed_origins: AllowedOrigins::List(BTreeSet::new()),
                ..CorsPolicy::default()
            },
        }
    }

    /// Allows any origin (wildcard `*`).
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.policy.allowed_origins = AllowedOrigins::Any;
        self
    }

    /// Adds an allowed origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        if let AllowedOrigins::List(origins) = &mut self.policy.allowed_origins {
            origins.insert(origin.into());
        }
        self
    }

    /// Sets the allowed HTTP methods.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.policy.allowed_methods = methods.into_iter().map(|m| m.as_str().to_string()).collect();
        self
    }

    /// Sets the allowed request headers.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy.allowed_headers = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Sets whether credentials may accompany cross-origin requests.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.policy.allow_credentials = allow;
        self
    }

    /// Sets the max age for preflight caching.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.policy.max_age = Some(duration);
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> CorsMiddleware {
        CorsMiddleware {
            policy: self.policy,
        }
    }
}

impl CorsMiddleware {
    /// Creates a new CORS builder with no allowed origins.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Creates the stage from the `cors` configuration section.
    #[must_use]
    pub fn from_config(config: &CorsConfig) -> Self {
        Self {
            policy: CorsPolicy::from_config(config),
        }
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> &CorsPolicy {
        &self.policy
    }

    fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains_key(headers::ORIGIN)
            && request.headers().contains_key(headers::REQUEST_METHOD)
    }

    fn origin(request: &Request) -> Option<&str> {
        request
            .headers()
            .get(headers::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    /// Answers a preflight request without invoking the rest of the chain.
    fn handle_preflight(&self, request: &Request, origin: &str) -> Response {
        let requested_method = request
            .headers()
            .get(headers::REQUEST_METHOD)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !self.policy.allows_method(requested_method) {
            return forbidden("method not allowed");
        }

        if let Some(requested) = request
            .headers()
            .get(headers::REQUEST_HEADERS)
            .and_then(|v| v.to_str().ok())
        {
            for header in requested.split(',').map(|h| h.trim().to_ascii_lowercase()) {
                if !header.is_empty() && !self.policy.allows_header(&header) {
                    return forbidden(&format!("header '{header}' not allowed"));
                }
            }
        }

        let mut response = Response::empty(StatusCode::NO_CONTENT);
        self.add_origin_headers(&mut response, origin);

        let headers_mut = response.headers_mut();
        let methods = join(&self.policy.allowed_methods);
        if let Ok(value) = HeaderValue::from_str(&methods) {
            headers_mut.insert(headers::ALLOW_METHODS, value);
        }
        let allowed_headers = join(&self.policy.allowed_headers);
        if let Ok(value) = HeaderValue::from_str(&allowed_headers) {
            headers_mut.insert(headers::ALLOW_HEADERS, value);
        }
        if let Some(max_age) = self.policy.max_age {
            headers_mut.insert(headers::MAX_AGE, HeaderValue::from(max_age.as_secs()));
        }
        headers_mut.insert(
            headers::VARY,
            HeaderValue::from_static(
                "Origin, Access-Control-Request-Method, Access-Control-Request-Headers",
            ),
        );
        response
    }

    fn add_origin_headers(&self, response: &mut Response, origin: &str) {
        let credentials = self.policy.allow_credentials;
        let headers_mut = response.headers_mut();

        if let Some(value) = self.policy.allowed_origins.header_value(origin, credentials) {
            headers_mut.insert(headers::ALLOW_ORIGIN, value);
        }
        if credentials {
            headers_mut.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        headers_mut.insert(headers::VARY, HeaderValue::from_static("Origin"));
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            // Same-origin and non-browser requests carry no Origin header.
            let Some(origin) = Self::origin(&request).map(String::from) else {
                return next.run(ctx, request).await;
            };

            if !self.policy.allowed_origins.is_allowed(&origin) {
                debug!(origin = %origin, "rejecting cross-origin request");
                return forbidden("origin not allowed");
            }

            if Self::is_preflight(&request) {
                return self.handle_preflight(&request, &origin);
            }

            let mut response = next.run(ctx, request).await;
            self.add_origin_headers(&mut response, &origin);
            response
        })
    }
}

fn forbidden(message: &str) -> Response {
    Response::error(StatusCode::FORBIDDEN, message)
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
