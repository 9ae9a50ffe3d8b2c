//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// Controls the listener: port, TLS material and the drain bound used on
/// interrupt.
///
/// # Example
///
/// ```
/// use basement_config::ServerConfig;
///
/// let config = ServerConfig {
///     port: 8443,
///     disable_tls: false,
///     tls_cert_file: Some("/etc/basement/tls.crt".into()),
///     tls_cert_key_file: Some("/etc/basement/tls.key".into()),
///     shutdown_timeout_secs: 30,
/// };
/// assert!(config.tls_enabled());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Port to listen on; the listener binds `0.0.0.0:<port>`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Serve plain HTTP instead of HTTPS (development mode).
    #[serde(default)]
    pub disable_tls: bool,

    /// PEM certificate chain used when TLS is enabled.
    #[serde(default)]
    pub tls_cert_file: Option<PathBuf>,

    /// PEM private key used when TLS is enabled.
    #[serde(default)]
    pub tls_cert_key_file: Option<PathBuf>,

    /// Upper bound, in seconds, for draining in-flight requests on interrupt.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Returns `true` when the listener should terminate TLS.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        !self.disable_tls
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            disable_tls: false,
            tls_cert_file: None,
            tls_cert_key_file: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Disable telemetry publishing entirely.
    #[serde(default)]
    pub disabled: bool,

    /// OTLP gRPC collector endpoint (`host:port`). Falls back to
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`, then `localhost:4317`.
    #[serde(default)]
    pub collector_endpoint: Option<String>,

    /// Service name attached to every span, log record and metric.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            collector_endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "basement".to_string()
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directives (e.g. `debug`, `info,basement_server=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "debug,h2=warn,hyper=warn,hyper_util=warn,tonic=warn,tower=warn".to_string()
}

/// Cross-origin policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins. `"*"` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Allowed methods for cross-origin requests.
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,

    /// Allowed request headers for cross-origin requests.
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,

    /// Whether credentials may accompany cross-origin requests.
    #[serde(default)]
    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
            allow_credentials: false,
            max_age_secs: default_max_age(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allowed_methods() -> Vec<String> {
    ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_allowed_headers() -> Vec<String> {
    ["content-type", "authorization", "traceparent", "tracestate", "baggage"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_max_age() -> u64 {
    86400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.tls_enabled());
        assert!(config.tls_cert_file.is_none());
        assert_eq!(config.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_telemetry_defaults() {
        let config = TelemetryConfig::default();
        assert!(!config.disabled);
        assert!(config.collector_endpoint.is_none());
        assert_eq!(config.service_name, "basement");
    }

    #[test]
    fn test_cors_defaults_allow_any_origin() {
        let config = CorsConfig::default();
        assert_eq!(config.allowed_origins, vec!["*"]);
        assert!(config.allowed_headers.iter().any(|h| h == "traceparent"));
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(format, LogFormat::Pretty);
    }
}
