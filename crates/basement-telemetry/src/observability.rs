//! The observability context handed to the middleware chain and the server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opentelemetry::global;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::Context;
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};

use crate::propagation::{composite_propagator, HeaderExtractor, HeaderInjector};
use crate::resource::ResourceDescriptor;
use crate::runtime::RuntimeMetrics;

/// Instrumentation scope for every tracer and meter handed out.
pub const INSTRUMENTATION_SCOPE: &str = "basement";

static GLOBAL_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Long-lived handle to the active tracer, meter and logger providers.
///
/// Cheap to clone; all clones share the same providers. Several independent
/// instances can coexist in one process.
#[derive(Clone)]
pub struct Observability {
    inner: Arc<Inner>,
}

struct Inner {
    descriptor: ResourceDescriptor,
    enabled: bool,
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: Option<LoggerProvider>,
    propagator: TextMapCompositePropagator,
    _runtime: Option<RuntimeMetrics>,
}

impl std::fmt::Debug for Observability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observability")
            .field("service_name", &self.service_name())
            .field("enabled", &self.inner.enabled)
            .finish_non_exhaustive()
    }
}

impl Observability {
    pub(crate) fn active(
        descriptor: ResourceDescriptor,
        tracer_provider: TracerProvider,
        meter_provider: SdkMeterProvider,
        logger_provider: LoggerProvider,
        runtime: RuntimeMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                descriptor,
                enabled: true,
                tracer_provider,
                meter_provider,
                logger_provider: Some(logger_provider),
                propagator: composite_propagator(),
                _runtime: Some(runtime),
            }),
        }
    }

    /// Providers without exporters: spans and instruments work locally but
    /// nothing leaves the process.
    #[must_use]
    pub fn disabled(service_name: &str) -> Self {
        let descriptor = ResourceDescriptor::service_only(service_name);
        let resource = descriptor.to_resource();

        Self {
            inner: Arc::new(Inner {
                tracer_provider: TracerProvider::builder()
                    .with_resource(resource.clone())
                    .build(),
                meter_provider: SdkMeterProvider::builder().with_resource(resource).build(),
                descriptor,
                enabled: false,
                logger_provider: None,
                propagator: composite_propagator(),
                _runtime: None,
            }),
        }
    }

    /// Returns `true` when exporters are attached.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// The configured service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.inner.descriptor.service_name()
    }

    /// The resource attributes shared by all providers.
    #[must_use]
    pub fn resource(&self) -> &ResourceDescriptor {
        &self.inner.descriptor
    }

    /// A tracer under the service's instrumentation scope.
    #[must_use]
    pub fn tracer(&self) -> Tracer {
        self.inner.tracer_provider.tracer(INSTRUMENTATION_SCOPE)
    }

    /// A meter under the service's instrumentation scope.
    #[must_use]
    pub fn meter(&self) -> Meter {
        self.inner.meter_provider.meter(INSTRUMENTATION_SCOPE)
    }

    /// The log provider, if logs are exported.
    #[must_use]
    pub fn logger_provider(&self) -> Option<&LoggerProvider> {
        self.inner.logger_provider.as_ref()
    }

    /// Extracts the remote parent context (trace context and baggage).
    #[must_use]
    pub fn extract(&self, headers: &http::HeaderMap) -> Context {
        self.inner.propagator.extract(&HeaderExtractor(headers))
    }

    /// Injects `cx` into outgoing headers.
    pub fn inject(&self, cx: &Context, headers: &mut http::HeaderMap) {
        self.inner
            .propagator
            .inject_context(cx, &mut HeaderInjector(headers));
    }

    /// Registers the propagator and providers as process-wide defaults.
    ///
    /// Only the first call in a process installs anything; it returns `true`.
    /// The propagator is installed before the providers.
    pub fn install_global(&self) -> bool {
        if GLOBAL_INSTALLED.swap(true, Ordering::SeqCst) {
            return false;
        }

        global::set_text_map_propagator(composite_propagator());
        let _ = global::set_tracer_provider(self.inner.tracer_provider.clone());
        global::set_meter_provider(self.inner.meter_provider.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Span as _, TraceContextExt, Tracer as _};

    #[test]
    fn test_disabled_is_usable() {
        let obs = Observability::disabled("basement");
        assert!(!obs.is_enabled());
        assert_eq!(obs.service_name(), "basement");
        assert!(obs.logger_provider().is_none());

        let mut span = obs.tracer().start("probe");
        assert!(span.span_context().is_valid());
        span.end();

        obs.meter().u64_counter("probe").build().add(1, &[]);
    }

    #[test]
    fn test_extract_and_inject() {
        let obs = Observability::disabled("basement");
        let mut headers = http::HeaderMap::new();
        headers.insert(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"
                .parse()
                .unwrap(),
        );

        let cx = obs.extract(&headers);
        assert!(cx.has_active_span());

        let mut outbound = http::HeaderMap::new();
        obs.inject(&cx, &mut outbound);
        assert_eq!(outbound.get("traceparent"), headers.get("traceparent"));
    }

    #[test]
    fn test_independent_instances() {
        let a = Observability::disabled("a");
        let b = Observability::disabled("b");
        assert_eq!(a.service_name(), "a");
        assert_eq!(b.service_name(), "b");
    }

    #[test]
    fn test_install_global_once() {
        let obs = Observability::disabled("basement");
        let first = obs.install_global();
        let second = obs.install_global();
        assert!(!second);
        assert!(first || GLOBAL_INSTALLED.load(Ordering::SeqCst));
    }
}
