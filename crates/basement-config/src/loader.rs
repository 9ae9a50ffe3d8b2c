//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, environment variables and explicit
//! command-line overrides.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{ConfigError, Configuration};

/// Standard OpenTelemetry switch that disables telemetry publishing.
pub const ENV_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";

/// Standard OpenTelemetry collector endpoint variable.
pub const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Prefixed environment variables (`BASEMENT__SERVER__PORT`)
/// 4. Standard OpenTelemetry variables (`OTEL_SDK_DISABLED`,
///    `OTEL_EXPORTER_OTLP_ENDPOINT`)
/// 5. Explicit [`Overrides`] (command-line flags)
///
/// # Example
///
/// ```no_run
/// use basement_config::ConfigLoader;
///
/// # fn main() -> Result<(), basement_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("basement.toml")?
///     .with_env_prefix("BASEMENT")
///     .with_standard_env()
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: Configuration,
    env_prefix: Option<String>,
    standard_env: bool,
    overrides: Option<Overrides>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
            env_prefix: None,
            standard_env: false,
            overrides: None,
            file_loaded: false,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = Configuration::default();
        self
    }

    /// Start with the development preset (plain HTTP, no export).
    ///
    /// # Example
    ///
    /// ```
    /// use basement_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(config.server.disable_tls);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = Configuration::development();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats.
    /// The file format is determined by the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields (strict mode)
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let file_config = Self::parse_file(&content, path)?;
        self.merge_config(file_config);
        self.file_loaded = true;

        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string.
    ///
    /// # Arguments
    ///
    /// * `content` - Configuration content as a string
    /// * `format` - File format ("toml" or "json")
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use basement_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     port = 9443
    ///     disable_tls = true
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, 9443);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let file_config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };

        self.merge_config(file_config);
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    /// For example, with prefix "BASEMENT":
    /// - `BASEMENT__SERVER__PORT=9000`
    /// - `BASEMENT__TELEMETRY__SERVICE_NAME=my-service`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Honor the standard OpenTelemetry variables `OTEL_SDK_DISABLED` and
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`.
    #[must_use]
    pub fn with_standard_env(mut self) -> Self {
        self.standard_env = true;
        self
    }

    /// Apply explicit overrides after every other layer.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Load a `.env` file for environment variables.
    ///
    /// Uses the `dotenvy` crate to load variables from a file. A missing
    /// file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::validation_error(format!(
                "failed to load .env file: {e}"
            ))),
        }
    }

    /// Returns `true` if a configuration file has been merged.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable layers and overrides, then validates the
    /// final configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Environment variable parsing fails
    /// - Configuration validation fails
    pub fn load(self) -> Result<Configuration, ConfigError> {
        let config = self.resolve()?;
        config.validate()?;
        Ok(config)
    }

    /// Finalize without validation.
    ///
    /// Environment layers and overrides are still applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed.
    pub fn load_unvalidated(self) -> Result<Configuration, ConfigError> {
        self.resolve()
    }

    fn resolve(mut self) -> Result<Configuration, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        if self.standard_env {
            self.apply_standard_env(|key| env::var(key).ok())?;
        }

        if let Some(overrides) = self.overrides.take() {
            overrides.apply(&mut self.config);
        }

        Ok(self.config)
    }

    // Parse configuration file based on extension
    fn parse_file(content: &str, path: &Path) -> Result<Configuration, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    // Every section carries serde defaults, so a full replace keeps unset fields at their defaults.
    fn merge_config(&mut self, file_config: Configuration) {
        self.config = file_config;
    }

    // Apply environment variable overrides
    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(prefix)).collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    // Apply a single environment variable
    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();

        match parts.as_slice() {
            // Server section
            ["SERVER", "PORT"] => {
                self.config.server.port = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected port number"))?;
            }
            ["SERVER", "DISABLE_TLS"] => {
                self.config.server.disable_tls = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["SERVER", "TLS_CERT_FILE"] => {
                self.config.server.tls_cert_file = non_empty(value).map(PathBuf::from);
            }
            ["SERVER", "TLS_CERT_KEY_FILE"] => {
                self.config.server.tls_cert_key_file = non_empty(value).map(PathBuf::from);
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }

            // Telemetry section
            ["TELEMETRY", "DISABLED"] => {
                self.config.telemetry.disabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "COLLECTOR_ENDPOINT"] => {
                self.config.telemetry.collector_endpoint = non_empty(value).map(String::from);
            }
            ["TELEMETRY", "SERVICE_NAME"] => {
                self.config.telemetry.service_name = value.to_string();
            }

            // Logging section
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => crate::LogFormat::Json,
                    "pretty" => crate::LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            // CORS section
            ["CORS", "ALLOWED_ORIGINS"] => {
                self.config.cors.allowed_origins = split_list(value);
            }
            ["CORS", "ALLOW_CREDENTIALS"] => {
                self.config.cors.allow_credentials = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }

    // Apply the standard OpenTelemetry variables through `lookup`
    fn apply_standard_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SDK_DISABLED).filter(|v| !v.trim().is_empty()) {
            self.config.telemetry.disabled = parse_bool(value.trim())
                .ok_or_else(|| ConfigError::env_parse_error(ENV_SDK_DISABLED, "expected boolean"))?;
        }

        if let Some(value) = lookup(ENV_OTLP_ENDPOINT) {
            if let Some(endpoint) = non_empty(&value) {
                self.config.telemetry.collector_endpoint = Some(endpoint.to_string());
            }
        }

        Ok(())
    }
}

/// Explicit overrides, typically parsed from command-line flags.
///
/// Only fields that are `Some` replace the loaded value.
///
/// # Example
///
/// ```
/// use basement_config::{ConfigLoader, Overrides};
///
/// let config = ConfigLoader::new()
///     .with_overrides(Overrides {
///         port: Some(9000),
///         disable_tls: Some(true),
///         ..Default::default()
///     })
///     .load()
///     .unwrap();
///
/// assert_eq!(config.server.port, 9000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Listener port.
    pub port: Option<u16>,
    /// Serve plain HTTP.
    pub disable_tls: Option<bool>,
    /// TLS certificate file.
    pub tls_cert_file: Option<PathBuf>,
    /// TLS private key file.
    pub tls_cert_key_file: Option<PathBuf>,
    /// Disable telemetry publishing.
    pub disable_telemetry: Option<bool>,
    /// OTLP collector endpoint.
    pub telemetry_collector: Option<String>,
}

impl Overrides {
    /// Applies every set override to `config`.
    pub fn apply(&self, config: &mut Configuration) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(disable_tls) = self.disable_tls {
            config.server.disable_tls = disable_tls;
        }
        if let Some(path) = &self.tls_cert_file {
            config.server.tls_cert_file = Some(path.clone());
        }
        if let Some(path) = &self.tls_cert_key_file {
            config.server.tls_cert_key_file = Some(path.clone());
        }
        if let Some(disabled) = self.disable_telemetry {
            config.telemetry.disabled = disabled;
        }
        if let Some(endpoint) = self.telemetry_collector.as_deref().and_then(non_empty) {
            config.telemetry.collector_endpoint = Some(endpoint.to_string());
        }
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}
