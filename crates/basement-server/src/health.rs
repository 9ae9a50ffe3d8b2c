//! Liveness endpoint.
//!
//! `GET /livez` answers `200` with `{"status":"ok"}`. `HEAD` is accepted as
//! well; any other method gets `405` with an `Allow` header.
//!
//! The handler opens a `livezHandler` span as a child of the request span
//! started by the trace-context stage.

use basement_middleware::{BoxFuture, MiddlewareContext, Request, Response, ResponseExt};
use basement_telemetry::Observability;
use http::header::{HeaderValue, ALLOW};
use http::{Method, StatusCode};
use opentelemetry::trace::{Span as _, Tracer as _};
use opentelemetry::Context;
use serde::Serialize;

use crate::router::RouteHandler;

/// The registered liveness path.
pub const LIVEZ_PATH: &str = "/livez";

/// Liveness payload.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LivezStatus {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
}

impl LivezStatus {
    /// The only status this endpoint reports.
    pub const OK: Self = Self { status: "ok" };
}

/// Renders the liveness response body.
///
/// A serialization failure becomes `400` with a plain-text body.
#[must_use]
pub fn livez_response(status: &impl Serialize) -> Response {
    match serde_json::to_vec(status) {
        Ok(body) => Response::json(StatusCode::OK, body),
        Err(e) => Response::error(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

/// Builds the `/livez` handler over the service tracer.
#[must_use]
pub fn livez_handler(observability: &Observability) -> RouteHandler {
    let tracer = observability.tracer();

    std::sync::Arc::new(move |ctx: &mut MiddlewareContext, request: Request| -> BoxFuture<'static, Response> {
        let parent = ctx
            .get_extension::<Context>()
            .cloned()
            .unwrap_or_else(Context::current);
        let mut span = tracer.start_with_context("livezHandler", &parent);

        let response = if request.method() == Method::GET || request.method() == Method::HEAD {
            tracing::debug!(trace_id = ctx.trace_id().unwrap_or_default(), "livez check");
            livez_response(&LivezStatus::OK)
        } else {
            let mut response = Response::error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            response
        };

        span.end();
        Box::pin(std::future::ready(response))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::header::CONTENT_TYPE;
    use http_body_util::{BodyExt, Full};
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("boom"))
        }
    }

    fn request(method: Method) -> Request {
        http::Request::builder()
            .method(method)
            .uri(LIVEZ_PATH)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_livez_ok() {
        let handler = livez_handler(&Observability::disabled("basement"));
        let mut ctx = MiddlewareContext::for_route(LIVEZ_PATH);

        let response = handler(&mut ctx, request(Method::GET)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body(response).await, Bytes::from_static(br#"{"status":"ok"}"#));
    }

    #[tokio::test]
    async fn test_livez_rejects_post() {
        let handler = livez_handler(&Observability::disabled("basement"));
        let mut ctx = MiddlewareContext::for_route(LIVEZ_PATH);

        let response = handler(&mut ctx, request(Method::POST)).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");
    }

    #[tokio::test]
    async fn test_serialization_failure_is_bad_request() {
        let response = livez_response(&Unserializable);

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body(response).await, Bytes::from_static(b"boom"));
    }
}
