//! Listener configuration.
//!
//! Timeouts follow a fixed policy: 60 s idle, 10 s read, 30 s write. Only
//! the address, TLS material and the drain bound come from configuration.
//!
//! # Example
//!
//! ```rust
//! use basement_server::ListenerConfig;
//! use std::time::Duration;
//!
//! let config = ListenerConfig::builder()
//!     .addr("127.0.0.1:0".parse().unwrap())
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert!(!config.tls_enabled());
//! assert_eq!(config.read_timeout(), Duration::from_secs(10));
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// Close keep-alive connections idle for this long.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound on reading request headers and collecting the body.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on producing a response.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default drain bound on interrupt.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Certificate chain and private key, both PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// Certificate chain file.
    pub cert: PathBuf,
    /// Private key file.
    pub key: PathBuf,
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    addr: SocketAddr,
    tls: Option<TlsPaths>,
    idle_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    shutdown_timeout: Duration,
}

impl ListenerConfig {
    /// Creates a new listener configuration builder.
    #[must_use]
    pub fn builder() -> ListenerConfigBuilder {
        ListenerConfigBuilder::default()
    }

    /// Derives the listener from the `server` configuration section.
    ///
    /// Binds `0.0.0.0:<port>`. With TLS enabled both certificate paths must
    /// be set.
    pub fn from_config(config: &basement_config::ServerConfig) -> ServerResult<Self> {
        let tls = if config.tls_enabled() {
            match (&config.tls_cert_file, &config.tls_cert_key_file) {
                (Some(cert), Some(key)) => Some(TlsPaths {
                    cert: cert.clone(),
                    key: key.clone(),
                }),
                _ => {
                    return Err(ServerError::InvalidConfig(
                        "TLS is enabled but the certificate or key file is not set".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        if config.shutdown_timeout_secs == 0 {
            return Err(ServerError::InvalidConfig(
                "shutdown timeout must be positive".to_string(),
            ));
        }

        Ok(Self::builder()
            .addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)))
            .tls(tls)
            .shutdown_timeout(Duration::from_secs(config.shutdown_timeout_secs))
            .build())
    }

    /// The address to bind.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// TLS material, if TLS is enabled.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsPaths> {
        self.tls.as_ref()
    }

    /// Returns `true` if the listener terminates TLS.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Keep-alive idle bound.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Header and body read bound.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Response production bound.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Graceful drain bound.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ListenerConfig`].
#[derive(Debug, Clone)]
pub struct ListenerConfigBuilder {
    config: ListenerConfig,
}

impl Default for ListenerConfigBuilder {
    fn default() -> Self {
        Self {
            config: ListenerConfig {
                addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
                tls: None,
                idle_timeout: DEFAULT_IDLE_TIMEOUT,
                read_timeout: DEFAULT_READ_TIMEOUT,
                write_timeout: DEFAULT_WRITE_TIMEOUT,
                shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            },
        }
    }
}

impl ListenerConfigBuilder {
    /// Sets the bind address.
    #[must_use]
    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.config.addr = addr;
        self
    }

    /// Sets or clears the TLS material.
    #[must_use]
    pub fn tls(mut self, tls: Option<TlsPaths>) -> Self {
        self.config.tls = tls;
        self
    }

    /// Overrides the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Overrides the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Overrides the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Sets the graceful drain bound.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ListenerConfig {
        self.config
    }
}
