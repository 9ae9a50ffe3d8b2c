//! Request metrics stage.
//!
//! Innermost stage, so the recorded duration covers the handler and the
//! logging around it.
//!
//! | Instrument | Kind | Unit |
//! |---|---|---|
//! | `http.server.request.count` | counter | `{request}` |
//! | `http.server.request.duration` | histogram | `s` |
//! | `http.server.active_requests` | up-down counter | `{request}` |
//!
//! Count and duration carry the method, route and status code. The route
//! falls back to the raw path when no route was matched.

use basement_telemetry::Observability;
use opentelemetry::metrics::{Counter, Histogram, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::trace as semconv;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};

/// Request instruments, created once per chain.
#[derive(Debug, Clone)]
pub struct AppMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
    active: UpDownCounter<i64>,
}

impl AppMetrics {
    /// Creates the instruments on the service meter.
    #[must_use]
    pub fn new(observability: &Observability) -> Self {
        let meter = observability.meter();
        Self {
            requests: meter
                .u64_counter("http.server.request.count")
                .with_description("Completed HTTP requests")
                .with_unit("{request}")
                .build(),
            duration: meter
                .f64_histogram("http.server.request.duration")
                .with_description("Duration of HTTP requests")
                .with_unit("s")
                .build(),
            active: meter
                .i64_up_down_counter("http.server.active_requests")
                .with_description("HTTP requests in flight")
                .with_unit("{request}")
                .build(),
        }
    }
}

/// Records request count, latency and concurrency.
#[derive(Debug, Clone)]
pub struct MetricsMiddleware {
    metrics: AppMetrics,
}

impl MetricsMiddleware {
    /// Creates the stage over the service meter.
    #[must_use]
    pub fn new(observability: &Observability) -> Self {
        Self {
            metrics: AppMetrics::new(observability),
        }
    }
}

/// Attributes attached to the count and duration of one request.
#[must_use]
pub fn request_attributes(method: &str, route: &str, status: u16) -> [KeyValue; 3] {
    [
        KeyValue::new(semconv::HTTP_REQUEST_METHOD, method.to_string()),
        KeyValue::new(semconv::HTTP_ROUTE, route.to_string()),
        KeyValue::new(semconv::HTTP_RESPONSE_STATUS_CODE, i64::from(status)),
    ]
}

/// Decrements the in-flight count when dropped, so a cancelled request
/// does not leak it.
struct ActiveGuard<'a> {
    active: &'a UpDownCounter<i64>,
    attributes: [KeyValue; 1],
}

impl<'a> ActiveGuard<'a> {
    fn enter(active: &'a UpDownCounter<i64>, method: &str) -> Self {
        let attributes = [KeyValue::new(semconv::HTTP_REQUEST_METHOD, method.to_string())];
        active.add(1, &attributes);
        Self { active, attributes }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.add(-1, &self.attributes);
    }
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().as_str().to_string();
            let route = ctx
                .route()
                .map_or_else(|| request.uri().path().to_string(), ToString::to_string);
            let start = std::time::Instant::now();
            let _active = ActiveGuard::enter(&self.metrics.active, &method);

            let response = next.run(ctx, request).await;

            let attributes = request_attributes(&method, &route, response.status().as_u16());
            self.metrics.requests.add(1, &attributes);
            self.metrics
                .duration
                .record(start.elapsed().as_secs_f64(), &attributes);

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::{Request as HttpRequest, StatusCode};
    use http_body_util::Full;

    #[test]
    fn test_request_attributes() {
        let attributes = request_attributes("GET", "/livez", 200);

        assert_eq!(attributes[0].key.as_str(), "http.request.method");
        assert_eq!(attributes[1].value.as_str(), "/livez");
        assert_eq!(attributes[2].value, opentelemetry::Value::I64(200));
    }

    #[tokio::test]
    async fn test_passes_response_through() {
        let stage = MetricsMiddleware::new(&Observability::disabled("basement"));
        let mut ctx = MiddlewareContext::for_route("/livez");
        let request = HttpRequest::builder()
            .uri("/livez")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = stage
            .process(
                &mut ctx,
                request,
                Next::handler(|_ctx, _req| {
                    Box::pin(async { Response::error(StatusCode::BAD_GATEWAY, "upstream") })
                }),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_middleware_name() {
        let stage = MetricsMiddleware::new(&Observability::disabled("basement"));
        assert_eq!(stage.name(), "metrics");
    }
}
