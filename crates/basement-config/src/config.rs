//! Main configuration types.
//!
//! This module provides the top-level [`Configuration`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, CorsConfig, LoggingConfig, ServerConfig, TelemetryConfig};

/// Complete basement service configuration.
///
/// This is the root configuration type that contains all configuration
/// sections. Use [`ConfigLoader`](crate::ConfigLoader) to load it from files,
/// environment variables and command-line overrides.
///
/// # Example
///
/// ```
/// use basement_config::Configuration;
///
/// let config = Configuration::default();
/// assert_eq!(config.server.port, 8080);
/// assert_eq!(config.telemetry.service_name, "basement");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Telemetry export configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Local log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Cross-origin policy.
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Configuration {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use basement_config::{Configuration, ServerConfig};
    ///
    /// let config = Configuration::builder()
    ///     .server(ServerConfig {
    ///         port: 9000,
    ///         disable_tls: true,
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.server.port, 9000);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if:
    /// - TLS is enabled and the certificate or key path is missing
    /// - The service name is empty
    /// - The shutdown timeout is zero
    /// - The log filter directives cannot be parsed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.tls_enabled() {
            if self.server.tls_cert_file.is_none() {
                return Err(ConfigError::missing_field("server.tls_cert_file"));
            }
            if self.server.tls_cert_key_file.is_none() {
                return Err(ConfigError::missing_field("server.tls_cert_key_file"));
            }
        }

        if self.telemetry.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.service_name",
                "must not be empty",
            ));
        }

        if self.server.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.shutdown_timeout_secs",
                "must be greater than zero",
            ));
        }

        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            return Err(ConfigError::invalid_value("logging.level", e.to_string()));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Plain HTTP, pretty logs and no telemetry export.
    ///
    /// # Example
    ///
    /// ```
    /// use basement_config::Configuration;
    ///
    /// let config = Configuration::development();
    /// assert!(config.server.disable_tls);
    /// assert!(config.telemetry.disabled);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.disable_tls = true;
        config.telemetry.disabled = true;
        config.logging.format = crate::LogFormat::Pretty;
        config
    }
}

/// Builder for [`Configuration`].
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    server: Option<ServerConfig>,
    telemetry: Option<TelemetryConfig>,
    logging: Option<LoggingConfig>,
    cors: Option<CorsConfig>,
}

impl ConfigurationBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the cross-origin policy.
    #[must_use]
    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> Configuration {
        Configuration {
            server: self.server.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            cors: self.cors.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_http() -> Configuration {
        Configuration::builder()
            .server(ServerConfig {
                disable_tls: true,
                ..Default::default()
            })
            .build()
    }

    #[test]
    fn test_default_requires_tls_material() {
        let err = Configuration::default().validate().unwrap_err();
        assert!(err.to_string().contains("server.tls_cert_file"));
    }

    #[test]
    fn test_tls_key_missing() {
        let config = Configuration::builder()
            .server(ServerConfig {
                tls_cert_file: Some("cert.pem".into()),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.tls_cert_key_file"));
    }

    #[test]
    fn test_plain_http_is_valid() {
        assert!(plain_http().validate().is_ok());
    }

    #[test]
    fn test_empty_service_name_rejected() {
        let mut config = plain_http();
        config.telemetry.service_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_shutdown_timeout_rejected() {
        let mut config = plain_http();
        config.server.shutdown_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let mut config = plain_http();
        config.logging.level = "basement=loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_development_preset() {
        let config = Configuration::development();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.format, crate::LogFormat::Pretty);
    }
}
