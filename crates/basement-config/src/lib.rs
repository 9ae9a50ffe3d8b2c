//! Typed configuration for the basement service.
//!
//! This crate provides a strongly-typed configuration system with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - The standard `OTEL_*` variables
//! - Command-line overrides
//! - Strict validation (fails on unknown fields)
//!
//! # Overview
//!
//! The configuration system is built around the [`Configuration`] struct:
//!
//! - [`ServerConfig`] - listener port, TLS material, drain bound
//! - [`TelemetryConfig`] - enable switch, collector endpoint, service name
//! - [`LoggingConfig`] - filter directives and output format
//! - [`CorsConfig`] - cross-origin policy
//!
//! # Example
//!
//! ```no_run
//! use basement_config::{ConfigLoader, Overrides};
//!
//! # fn main() -> Result<(), basement_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("basement.toml")?
//!     .with_env_prefix("BASEMENT")
//!     .with_standard_env()
//!     .with_overrides(Overrides {
//!         port: Some(9000),
//!         ..Default::default()
//!     })
//!     .load()?;
//!
//! println!("listening on port {}", config.server.port);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 8443
//! tls_cert_file = "/etc/basement/tls.crt"
//! tls_cert_key_file = "/etc/basement/tls.key"
//! shutdown_timeout_secs = 30
//!
//! [telemetry]
//! disabled = false
//! collector_endpoint = "otel-collector:4317"
//! service_name = "basement"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [cors]
//! allowed_origins = ["https://app.example.com"]
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden via environment variables using the format
//! `PREFIX__SECTION__KEY`. For example:
//!
//! - `BASEMENT__SERVER__PORT=9000`
//! - `BASEMENT__TELEMETRY__DISABLED=true`
//! - `BASEMENT__CORS__ALLOWED_ORIGINS=https://a.example,https://b.example`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::{ConfigLoader, Overrides, ENV_OTLP_ENDPOINT, ENV_SDK_DISABLED};
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Configuration::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Configuration::development();
        let text = toml::to_string(&config).unwrap();
        let parsed: Configuration = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
