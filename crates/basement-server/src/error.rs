//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors from starting, serving and stopping the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TLS material is missing or unusable.
    #[error("tls: {0}")]
    Tls(String),

    /// The listener failed after binding.
    #[error("listener failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The listener configuration is inconsistent.
    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),

    /// Connections were still open when the grace period ran out.
    #[error("graceful shutdown timed out with {remaining} connection(s) still open")]
    ShutdownTimeout {
        /// Connections still open at the deadline.
        remaining: usize,
    },

    /// The serve task ended without reporting a result.
    #[error("serve task ended unexpectedly: {0}")]
    ServeTaskLost(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
