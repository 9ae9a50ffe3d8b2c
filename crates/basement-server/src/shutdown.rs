//! Shutdown coordination.
//!
//! [`ShutdownSignal`] is the root cancellation for the server: the accept
//! loop, every connection and every request context observe the same
//! signal. [`ConnectionTracker`] counts open connections so the drain can
//! wait for them.
//!
//! # Example
//!
//! ```rust
//! use basement_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let observer = shutdown.clone();
//!
//! shutdown.trigger();
//! assert!(observer.is_shutdown());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// A cloneable, trigger-once cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the signal. Later calls do nothing.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the signal has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that completes when the signal is triggered, immediately if
    /// it already was.
    ///
    /// The future owns its handle, so it can be held across `await` points
    /// and outlive the signal it came from.
    pub fn recv(&self) -> ShutdownReceiver {
        self.token.clone().cancelled_owned()
    }
}

/// Created by [`ShutdownSignal::recv()`].
pub type ShutdownReceiver = WaitForCancellationFutureOwned;

/// Counts open connections.
///
/// ```rust
/// use basement_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Registers a connection until the returned token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until no connection is open.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();
            if self.active_connections() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits until no connection is open or `deadline` passes.
    ///
    /// Returns the number of connections still open on timeout.
    pub async fn drain(&self, deadline: Instant) -> Result<(), usize> {
        match tokio::time::timeout_at(deadline, self.wait_idle()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(self.active_connections()),
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// An open connection; dropping it releases the slot.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_idempotent() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ShutdownSignal::default();
        let observer = signal.clone();

        assert!(!observer.is_shutdown());
        signal.trigger();
        assert!(observer.is_shutdown());
    }

    #[tokio::test]
    async fn test_recv_completes_when_triggered() {
        let signal = ShutdownSignal::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .expect("recv should complete");
    }

    #[tokio::test]
    async fn test_recv_after_trigger_is_immediate() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        tokio::time::timeout(Duration::from_millis(10), signal.recv())
            .await
            .expect("recv should complete immediately");
    }

    #[test]
    fn test_receiver_wakes_on_trigger() {
        let signal = ShutdownSignal::new();
        let mut recv = tokio_test::task::spawn(signal.recv());

        tokio_test::assert_pending!(recv.poll());
        signal.trigger();
        assert!(recv.is_woken());
        tokio_test::assert_ready!(recv.poll());
    }

    #[tokio::test]
    async fn test_receiver_held_across_trigger() {
        let signal = ShutdownSignal::new();
        let first = signal.recv();
        let second = signal.clone().recv();

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.trigger();
        });
        drop(signal);

        tokio::time::timeout(Duration::from_secs(1), async {
            first.await;
            second.await;
        })
        .await
        .expect("both receivers should complete");
    }

    #[test]
    fn test_tracker_counts_tokens() {
        let tracker = ConnectionTracker::new();
        let first = tracker.acquire();
        let second = tracker.acquire();
        assert_eq!(tracker.active_connections(), 2);

        drop(first);
        assert_eq!(tracker.active_connections(), 1);
        drop(second);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_without_connections() {
        let tracker = ConnectionTracker::new();

        tokio::time::timeout(Duration::from_millis(10), tracker.wait_idle())
            .await
            .expect("should complete immediately");
    }

    #[tokio::test]
    async fn test_drain_waits_for_release() {
        let tracker = ConnectionTracker::new();
        let token = tracker.acquire();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(token);
        });

        let deadline = Instant::now() + Duration::from_secs(1);
        assert_eq!(tracker.drain(deadline).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_reports_remaining() {
        let tracker = ConnectionTracker::new();
        let _held = tracker.acquire();

        let deadline = Instant::now() + Duration::from_secs(30);
        assert_eq!(tracker.drain(deadline).await, Err(1));
    }
}
