//! Request logging stage.
//!
//! Runs inside the request span, so each line carries the `trace_id` and
//! `span_id` the trace-context stage recorded. Level follows the status
//! class: `info` for success, `warn` for 4xx, `error` for 5xx.

use basement_telemetry::logging::fields;
use tracing::{error, info, warn};

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};

/// Summary of a completed request, left in the context as an extension.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    /// The HTTP method.
    pub method: String,
    /// The request path.
    pub path: String,
    /// The HTTP status code.
    pub status_code: u16,
    /// Time spent in the rest of the chain, in milliseconds.
    pub duration_ms: f64,
    /// The trace ID, if a span was started.
    pub trace_id: Option<String>,
    /// The span ID, if a span was started.
    pub span_id: Option<String>,
}

/// Logs one line per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogMiddleware;

impl RequestLogMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn emit(summary: &RequestSummary) {
        let trace_id = summary.trace_id.as_deref().unwrap_or_default();
        let span_id = summary.span_id.as_deref().unwrap_or_default();

        macro_rules! log_at {
            ($level:ident) => {
                $level!(
                    { fields::HTTP_METHOD } = %summary.method,
                    { fields::HTTP_PATH } = %summary.path,
                    { fields::HTTP_STATUS } = summary.status_code,
                    { fields::DURATION_MS } = summary.duration_ms,
                    { fields::TRACE_ID } = trace_id,
                    { fields::SPAN_ID } = span_id,
                    "request completed"
                )
            };
        }

        match summary.status_code {
            500..=599 => log_at!(error),
            400..=499 => log_at!(warn),
            _ => log_at!(info),
        }
    }
}

impl Middleware for RequestLogMiddleware {
    fn name(&self) -> &'static str {
        "request_log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let start = std::time::Instant::now();

            let response = next.run(ctx, request).await;

            let summary = RequestSummary {
                method,
                path,
                status_code: response.status().as_u16(),
                duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                trace_id: ctx.trace_id().map(ToString::to_string),
                span_id: ctx.span_id().map(ToString::to_string),
            };
            Self::emit(&summary);
            ctx.set_extension(summary);

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::{Method, Request as HttpRequest, StatusCode};
    use http_body_util::Full;

    fn request(method: Method, path: &str) -> Request {
        HttpRequest::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn run(ctx: &mut MiddlewareContext, status: StatusCode) -> Response {
        RequestLogMiddleware::new()
            .process(
                ctx,
                request(Method::GET, "/livez"),
                Next::handler(move |_ctx, _req| Box::pin(async move { Response::empty(status) })),
            )
            .await
    }

    #[tokio::test]
    async fn test_records_summary() {
        let mut ctx = MiddlewareContext::new();
        ctx.set_trace_id("4bf92f3577b34da6a3ce929d0e0e4736".to_string());
        ctx.set_span_id("00f067aa0ba902b7".to_string());

        let response = run(&mut ctx, StatusCode::OK).await;
        assert_eq!(response.status(), StatusCode::OK);

        let summary = ctx.get_extension::<RequestSummary>().unwrap();
        assert_eq!(summary.method, "GET");
        assert_eq!(summary.path, "/livez");
        assert_eq!(summary.status_code, 200);
        assert!(summary.duration_ms >= 0.0);
        assert_eq!(
            summary.trace_id.as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
        assert_eq!(summary.span_id.as_deref(), Some("00f067aa0ba902b7"));
    }

    #[tokio::test]
    async fn test_summary_without_trace() {
        let mut ctx = MiddlewareContext::new();

        run(&mut ctx, StatusCode::SERVICE_UNAVAILABLE).await;

        let summary = ctx.get_extension::<RequestSummary>().unwrap();
        assert_eq!(summary.status_code, 503);
        assert!(summary.trace_id.is_none());
    }

    #[test]
    fn test_middleware_name() {
        assert_eq!(RequestLogMiddleware::new().name(), "request_log");
    }
}
