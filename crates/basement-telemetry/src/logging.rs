//! Structured logging with an attachable OpenTelemetry log bridge.
//!
//! [`init_logging`] installs the global `tracing` subscriber: an
//! [`EnvFilter`], a JSON (or pretty) stdout layer, and an empty slot.
//! Once providers exist, [`LogHandle::attach_exporter`] fills the slot with
//! the OpenTelemetry bridge so every event is also exported as a log record.
//!
//! # Example
//!
//! ```rust,ignore
//! use basement_telemetry::logging::{init_logging, LogConfig};
//!
//! let handle = init_logging(&LogConfig::default())?;
//! tracing::info!(http.method = "GET", http.path = "/livez", "request served");
//! ```

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::LoggerProvider;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Targets whose events are never bridged to the exporter.
///
/// These are the crates the export path itself runs on.
const TRANSPORT_TARGETS: &[&str] = &["h2", "hyper", "tonic", "tower", "opentelemetry"];

type Base = Layered<EnvFilter, Registry>;
type ExportSlot = Option<Box<dyn Layer<Base> + Send + Sync>>;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directives (e.g. `info,basement_server=debug`).
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            include_target: true,
        }
    }
}

/// Handle to the installed subscriber's export slot.
#[derive(Clone)]
pub struct LogHandle {
    slot: reload::Handle<ExportSlot, Base>,
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle").finish_non_exhaustive()
    }
}

impl LogHandle {
    /// Bridges every subsequent event to `provider`.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::LoggingInit` if the subscriber is gone.
    pub fn attach_exporter(&self, provider: &LoggerProvider) -> TelemetryResult<()> {
        let bridge = ExportBridge {
            inner: OpenTelemetryTracingBridge::new(provider),
        };
        self.slot
            .modify(|slot| *slot = Some(Box::new(bridge)))
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
    }

    /// Stops bridging events.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::LoggingInit` if the subscriber is gone.
    pub fn detach_exporter(&self) -> TelemetryResult<()> {
        self.slot
            .modify(|slot| *slot = None)
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
    }
}

/// Initializes the global logging subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<LogHandle> {
    let filter = create_env_filter(&config.level)?;
    let (slot, handle) = reload::Layer::new(ExportSlot::None);

    let json = config.json_format.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.include_target)
            .with_current_span(true)
    });
    let pretty = (!config.json_format).then(|| {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(config.include_target)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(slot)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    Ok(LogHandle { slot: handle })
}

/// Creates an env filter from a string.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log level: {e}")))
}

/// Returns `true` for targets emitted by the export transport.
#[must_use]
pub fn is_transport_target(target: &str) -> bool {
    TRANSPORT_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::") || rest.starts_with('_'))
    })
}

/// Forwards events to the inner bridge, skipping transport targets.
struct ExportBridge<L> {
    inner: L,
}

impl<S, L> Layer<S> for ExportBridge<L>
where
    S: Subscriber,
    L: Layer<S>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if is_transport_target(event.metadata().target()) {
            return;
        }
        self.inner.on_event(event, ctx);
    }
}

/// Standard log fields.
///
/// Use these field names for consistency across logs.
pub mod fields {
    /// Trace ID field name.
    pub const TRACE_ID: &str = "trace_id";

    /// Span ID field name.
    pub const SPAN_ID: &str = "span_id";

    /// HTTP method field name.
    pub const HTTP_METHOD: &str = "http.method";

    /// HTTP path field name.
    pub const HTTP_PATH: &str = "http.path";

    /// HTTP status code field name.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Duration field name (in milliseconds).
    pub const DURATION_MS: &str = "duration_ms";

    /// Error field name.
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert!(config.json_format);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_development_config() {
        let config = LogConfig::development();
        assert!(!config.json_format);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info,hyper=warn").is_ok());
        assert!(create_env_filter("basement=loud").is_err());
    }

    #[test]
    fn test_transport_targets() {
        assert!(is_transport_target("h2"));
        assert!(is_transport_target("h2::codec"));
        assert!(is_transport_target("hyper_util::client"));
        assert!(is_transport_target("tonic::transport"));
        assert!(is_transport_target("opentelemetry_sdk::metrics"));
        assert!(!is_transport_target("basement_server::server"));
        assert!(!is_transport_target("hyperion"));
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_logging(&LogConfig::default());
        let second = init_logging(&LogConfig::default());
        assert!(matches!(second, Err(TelemetryError::LoggingInit(_))));
    }
}
