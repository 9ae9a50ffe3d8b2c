//! Shutdown registry: ordered release callbacks accumulated while providers
//! are created, drained by one aggregate shutdown.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{BoxError, ShutdownError};

type Callback = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// Ordered sequence of named, fallible release callbacks.
///
/// [`shutdown`](Self::shutdown) drains the registry, so a second call finds
/// nothing to do and returns `Ok(())`.
#[derive(Default)]
pub struct ShutdownRegistry {
    entries: Vec<(String, Callback)>,
}

impl std::fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("entries", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ShutdownRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a release callback.
    pub fn register<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.entries.push((name.into(), Box::new(callback)));
    }

    /// Number of callbacks still pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` once drained (or if nothing was registered).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of pending callbacks in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Runs every pending callback in registration order.
    ///
    /// Each callback runs on a blocking thread; the whole drain is bounded by
    /// `deadline`. A callback still running at the deadline is recorded as a
    /// timeout failure and left to finish in the background. Every callback
    /// is attempted regardless of earlier failures.
    ///
    /// # Errors
    ///
    /// Returns a [`ShutdownError`] listing each failed callback by name.
    pub async fn shutdown(&mut self, deadline: Duration) -> Result<(), ShutdownError> {
        let entries = mem::take(&mut self.entries);
        if entries.is_empty() {
            return Ok(());
        }

        let expires = Instant::now() + deadline;
        let mut failures = Vec::new();

        for (name, callback) in entries {
            let task = tokio::task::spawn_blocking(callback);
            let outcome = match tokio::time::timeout_at(expires, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(Box::new(join_err) as BoxError),
                Err(_) => Err(format!("timed out after {deadline:?}").into()),
            };

            match outcome {
                Ok(()) => tracing::debug!(component = %name, "telemetry component shut down"),
                Err(e) => {
                    tracing::warn!(component = %name, error = %e, "telemetry component shutdown failed");
                    failures.push((name, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError::new(failures))
        }
    }
}

/// Cloneable handle to the aggregate shutdown of a [`ShutdownRegistry`].
///
/// Safe to call from both the normal exit path and a cleanup path: only
/// the first call does any work.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    registry: Arc<Mutex<ShutdownRegistry>>,
}

impl ShutdownHandle {
    /// Wraps a populated registry.
    #[must_use]
    pub fn new(registry: ShutdownRegistry) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
        }
    }

    /// A handle with nothing to release.
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    /// Drains and runs the registry, bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns a [`ShutdownError`] if any callback failed or timed out.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ShutdownError> {
        self.registry.lock().await.shutdown(deadline).await
    }

    /// Number of callbacks not yet run.
    pub async fn pending(&self) -> usize {
        self.registry.lock().await.len()
    }
}
