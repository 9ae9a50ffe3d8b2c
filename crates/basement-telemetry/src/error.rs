//! Telemetry error types.

use std::fmt;

use thiserror::Error;

/// Boxed error returned by shutdown callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The telemetry signal an exporter carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Spans.
    Traces,
    /// Log records.
    Logs,
    /// Metric data points.
    Metrics,
}

impl Signal {
    /// Returns the signal name as used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Logs => "logs",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Host or SDK identity could not be collected.
    #[error("failed to build resource descriptor: {0}")]
    ResourceBuild(String),

    /// An exporter or its transport could not be constructed.
    #[error("failed to set up {signal} exporter: {message}")]
    Exporter {
        /// Signal the exporter was for.
        signal: Signal,
        /// Underlying failure.
        message: String,
    },

    /// Initialization failed after some providers were registered.
    ///
    /// `cleanup` carries any errors raised while releasing them.
    #[error("telemetry initialization failed: {cause}")]
    InitFailed {
        /// The failure that aborted initialization.
        #[source]
        cause: Box<TelemetryError>,
        /// Errors from releasing the already-registered providers.
        cleanup: Option<ShutdownError>,
    },

    /// One or more shutdown callbacks failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// The collector endpoint is not a valid URI.
    #[error("invalid collector endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// Endpoint as resolved.
        endpoint: String,
        /// Parser message.
        reason: String,
    },
}

impl TelemetryError {
    /// Create an exporter error for `signal`.
    pub fn exporter(signal: Signal, message: impl fmt::Display) -> Self {
        Self::Exporter {
            signal,
            message: message.to_string(),
        }
    }
}

/// Aggregated failures from a registry shutdown.
///
/// Each entry keeps the name the callback was registered under, in
/// registration order.
#[derive(Debug, Error)]
#[error("shutdown failed: {}", render(.failures))]
pub struct ShutdownError {
    failures: Vec<(String, BoxError)>,
}

impl ShutdownError {
    pub(crate) fn new(failures: Vec<(String, BoxError)>) -> Self {
        Self { failures }
    }

    /// Returns the individual `(name, error)` failures.
    #[must_use]
    pub fn failures(&self) -> &[(String, BoxError)] {
        &self.failures
    }

    /// Returns the names of the callbacks that failed.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_str())
    }
}

fn render(failures: &[(String, BoxError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::exporter(Signal::Logs, "connection refused");
        assert_eq!(
            err.to_string(),
            "failed to set up logs exporter: connection refused"
        );
    }

    #[test]
    fn test_shutdown_error_joins_failures() {
        let err = ShutdownError::new(vec![
            ("tracer-provider".to_string(), "flush failed".into()),
            ("meter-provider".to_string(), "timed out".into()),
        ]);

        assert_eq!(
            err.to_string(),
            "shutdown failed: tracer-provider: flush failed; meter-provider: timed out"
        );
        assert_eq!(
            err.names().collect::<Vec<_>>(),
            vec!["tracer-provider", "meter-provider"]
        );
    }

    #[test]
    fn test_init_failed_exposes_cause() {
        use std::error::Error as _;

        let err = TelemetryError::InitFailed {
            cause: Box::new(TelemetryError::exporter(Signal::Metrics, "boom")),
            cleanup: None,
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("metrics exporter"));
    }
}
