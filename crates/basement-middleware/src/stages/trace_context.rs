//! Trace-context stage.
//!
//! Extracts the remote parent from `traceparent`/`tracestate`/`baggage`,
//! starts a server span named `"<METHOD> <path>"` and runs the rest of the
//! chain inside it. The span's ids are written into the
//! [`MiddlewareContext`] so later stages can correlate with it, and the
//! OpenTelemetry [`Context`] is stored as an extension for handlers that
//! open child spans.

use basement_telemetry::Observability;
use opentelemetry::trace::{
    FutureExt as _, SpanKind, Status, TraceContextExt as _, Tracer as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer;
use opentelemetry_semantic_conventions::trace as semconv;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};

/// Starts the per-request server span.
#[derive(Debug, Clone)]
pub struct TraceContextMiddleware {
    observability: Observability,
    tracer: Tracer,
}

impl TraceContextMiddleware {
    /// Creates the stage over the given providers.
    #[must_use]
    pub fn new(observability: &Observability) -> Self {
        Self {
            tracer: observability.tracer(),
            observability: observability.clone(),
        }
    }

    fn start_span(&self, ctx: &MiddlewareContext, request: &Request) -> Context {
        let parent = self.observability.extract(request.headers());
        let method = request.method().as_str().to_string();
        let path = request.uri().path().to_string();

        let mut attributes = vec![
            KeyValue::new(semconv::HTTP_REQUEST_METHOD, method.clone()),
            KeyValue::new(semconv::URL_PATH, path.clone()),
        ];
        if let Some(route) = ctx.route() {
            attributes.push(KeyValue::new(semconv::HTTP_ROUTE, route.to_string()));
        }
        if let Some(agent) = request
            .headers()
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
        {
            attributes.push(KeyValue::new(semconv::USER_AGENT_ORIGINAL, agent.to_string()));
        }

        let span = self
            .tracer
            .span_builder(format!("{method} {path}"))
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, &parent);

        parent.with_span(span)
    }
}

impl Middleware for TraceContextMiddleware {
    fn name(&self) -> &'static str {
        "trace_context"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let cx = self.start_span(ctx, &request);

            let span_context = cx.span().span_context().clone();
            ctx.set_trace_id(span_context.trace_id().to_string());
            ctx.set_span_id(span_context.span_id().to_string());
            ctx.set_extension(cx.clone());

            let response = next.run(ctx, request).with_context(cx.clone()).await;

            let status = response.status();
            let span = cx.span();
            span.set_attribute(KeyValue::new(
                semconv::HTTP_RESPONSE_STATUS_CODE,
                i64::from(status.as_u16()),
            ));
            if status.is_server_error() {
                span.set_status(Status::error(status.to_string()));
            }
            span.end();

            response
        })
    }
}
