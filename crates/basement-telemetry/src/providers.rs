//! Provider lifecycle: exporters, providers and their shutdown registry.
//!
//! [`init_providers`] either returns a disabled [`Observability`] with a
//! no-op [`ShutdownHandle`], or connects one gRPC channel per signal, builds
//! the trace, log and metric providers on top of them and registers each
//! provider's shutdown. If any step fails, everything registered so far is
//! shut down before the error is returned.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use opentelemetry::metrics::MeterProvider as _;
use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithTonicConfig};
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::TracerProvider;
use tonic::transport::{Channel, Endpoint};

use crate::endpoint::resolve_from_env;
use crate::error::{BoxError, Signal, TelemetryError};
use crate::observability::{Observability, INSTRUMENTATION_SCOPE};
use crate::registry::{ShutdownHandle, ShutdownRegistry};
use crate::resource::{HostDetector, ResourceDescriptor, SystemHost, ENV_RESOURCE_ATTRIBUTES};
use crate::runtime::{RuntimeMetrics, Sampler, DEFAULT_MIN_INTERVAL};
use crate::TelemetryResult;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bound on connecting each exporter channel.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on releasing providers after a failed initialization.
pub const CLEANUP_DEADLINE: Duration = Duration::from_secs(5);

/// Default interval between metric exports.
pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(60);

/// Inputs to [`init_providers`].
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Build exporters at all. When `false`, no network setup happens.
    pub enable: bool,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// Collector endpoint; falls back to the environment, then the default.
    pub collector_endpoint: Option<String>,
    /// Interval between metric exports.
    pub metric_interval: Duration,
    /// Minimum interval between process runtime readings.
    pub runtime_min_interval: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            enable: true,
            service_name: "basement".to_string(),
            collector_endpoint: None,
            metric_interval: DEFAULT_METRIC_INTERVAL,
            runtime_min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

impl ProviderOptions {
    /// Options for `service_name`, exporting when `enable` is set.
    #[must_use]
    pub fn new(enable: bool, service_name: impl Into<String>) -> Self {
        Self {
            enable,
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Sets the collector endpoint.
    #[must_use]
    pub fn with_collector_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.collector_endpoint = Some(endpoint.into());
        self
    }
}

/// Opens the channel an exporter streams over.
pub trait ExportTransport: Send + Sync {
    /// Connects a channel for `signal` to `endpoint`.
    fn connect<'a>(
        &'a self,
        signal: Signal,
        endpoint: &'a str,
    ) -> BoxFuture<'a, TelemetryResult<Channel>>;
}

/// Plaintext gRPC, connected eagerly so an unreachable collector fails
/// initialization.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    connect_timeout: Duration,
}

impl Default for GrpcTransport {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl GrpcTransport {
    /// Transport with a custom connect bound.
    #[must_use]
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl ExportTransport for GrpcTransport {
    fn connect<'a>(
        &'a self,
        signal: Signal,
        endpoint: &'a str,
    ) -> BoxFuture<'a, TelemetryResult<Channel>> {
        Box::pin(async move {
            let target = Endpoint::from_shared(endpoint.to_string())
                .map_err(|e| TelemetryError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?
                .connect_timeout(self.connect_timeout);

            match tokio::time::timeout(self.connect_timeout, target.connect()).await {
                Ok(Ok(channel)) => Ok(channel),
                Ok(Err(e)) => Err(TelemetryError::exporter(
                    signal,
                    format!("{endpoint}: {}", describe(&e)),
                )),
                Err(_) => Err(TelemetryError::exporter(
                    signal,
                    format!("{endpoint}: connect timed out after {:?}", self.connect_timeout),
                )),
            }
        })
    }
}

/// Initializes trace, log and metric providers.
///
/// When `options.enable` is `false` this returns immediately with a disabled
/// [`Observability`] and a no-op handle.
///
/// # Errors
///
/// Returns [`TelemetryError::ResourceBuild`] if host identity is missing, or
/// [`TelemetryError::InitFailed`] if an exporter could not be set up. In the
/// latter case every provider created so far has already been shut down.
pub async fn init_providers(
    options: &ProviderOptions,
) -> TelemetryResult<(Observability, ShutdownHandle)> {
    init_providers_with(options, &GrpcTransport::default(), &SystemHost).await
}

/// [`init_providers`] with explicit transport and host detection.
///
/// # Errors
///
/// See [`init_providers`].
pub async fn init_providers_with<T>(
    options: &ProviderOptions,
    transport: &T,
    host: &dyn HostDetector,
) -> TelemetryResult<(Observability, ShutdownHandle)>
where
    T: ExportTransport + ?Sized,
{
    let mut registry = ShutdownRegistry::new();
    let observability = init_into(options, transport, host, &mut registry).await?;
    Ok((observability, ShutdownHandle::new(registry)))
}

async fn init_into<T>(
    options: &ProviderOptions,
    transport: &T,
    host: &dyn HostDetector,
    registry: &mut ShutdownRegistry,
) -> TelemetryResult<Observability>
where
    T: ExportTransport + ?Sized,
{
    if !options.enable {
        tracing::info!("telemetry disabled, exporters not started");
        return Ok(Observability::disabled(&options.service_name));
    }

    let endpoint = resolve_from_env(options.collector_endpoint.as_deref());
    let env_attributes = std::env::var(ENV_RESOURCE_ATTRIBUTES).ok();
    let descriptor =
        ResourceDescriptor::build(&options.service_name, host, env_attributes.as_deref())?;

    tracing::info!(
        endpoint = %endpoint,
        service.name = %descriptor.service_name(),
        "initializing telemetry providers"
    );

    match build_providers(options, &endpoint, descriptor, transport, registry).await {
        Ok(observability) => Ok(observability),
        Err(cause) => {
            let released: Vec<String> = registry.names().map(String::from).collect();
            let cleanup = registry.shutdown(CLEANUP_DEADLINE).await.err();
            tracing::error!(
                error = %cause,
                released = ?released,
                "telemetry initialization failed"
            );
            Err(TelemetryError::InitFailed {
                cause: Box::new(cause),
                cleanup,
            })
        }
    }
}

async fn build_providers<T>(
    options: &ProviderOptions,
    endpoint: &str,
    descriptor: ResourceDescriptor,
    transport: &T,
    registry: &mut ShutdownRegistry,
) -> TelemetryResult<Observability>
where
    T: ExportTransport + ?Sized,
{
    let resource = descriptor.to_resource();

    let channel = transport.connect(Signal::Traces, endpoint).await?;
    let span_exporter = SpanExporter::builder()
        .with_tonic()
        .with_channel(channel)
        .build()
        .map_err(|e| TelemetryError::exporter(Signal::Traces, e))?;
    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(span_exporter, runtime::Tokio)
        .with_resource(resource.clone())
        .build();
    registry.register("tracer-provider", {
        let provider = tracer_provider.clone();
        move || provider.shutdown().map_err(|e| Box::new(e) as BoxError)
    });

    let channel = transport.connect(Signal::Logs, endpoint).await?;
    let log_exporter = LogExporter::builder()
        .with_tonic()
        .with_channel(channel)
        .build()
        .map_err(|e| TelemetryError::exporter(Signal::Logs, e))?;
    let logger_provider = LoggerProvider::builder()
        .with_batch_exporter(log_exporter, runtime::Tokio)
        .with_resource(resource.clone())
        .build();
    registry.register("logger-provider", {
        let provider = logger_provider.clone();
        move || provider.shutdown().map_err(|e| Box::new(e) as BoxError)
    });

    let channel = transport.connect(Signal::Metrics, endpoint).await?;
    let metric_exporter = MetricExporter::builder()
        .with_tonic()
        .with_channel(channel)
        .build()
        .map_err(|e| TelemetryError::exporter(Signal::Metrics, e))?;
    let reader = PeriodicReader::builder(metric_exporter, runtime::Tokio)
        .with_interval(options.metric_interval)
        .build();
    let meter_provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();
    registry.register("meter-provider", {
        let provider = meter_provider.clone();
        move || provider.shutdown().map_err(|e| Box::new(e) as BoxError)
    });

    let runtime_metrics = RuntimeMetrics::register(
        &meter_provider.meter(INSTRUMENTATION_SCOPE),
        Sampler::new(options.runtime_min_interval),
    );

    Ok(Observability::active(
        descriptor,
        tracer_provider,
        meter_provider,
        logger_provider,
        runtime_metrics,
    ))
}

fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
