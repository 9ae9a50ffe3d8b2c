//! Observable server state.
//!
//! ```text
//! Starting ──► Serving ──► ShuttingDown ──► Stopped
//!     └────────────────────────────────────────▲   (bind or serve failure)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServerState {
    /// Configured, listener not yet bound.
    Starting,
    /// Accepting connections.
    Serving,
    /// No longer accepting; draining open connections.
    ShuttingDown,
    /// Terminal.
    Stopped,
}

impl ServerState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared view of the server state plus its transition history.
#[derive(Debug, Clone)]
pub struct StateTracker {
    current: Arc<watch::Sender<ServerState>>,
    history: Arc<Mutex<Vec<(ServerState, Instant)>>>,
}

impl StateTracker {
    /// Starts in [`ServerState::Starting`].
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(ServerState::Starting);
        Self {
            current: Arc::new(current),
            history: Arc::new(Mutex::new(vec![(ServerState::Starting, Instant::now())])),
        }
    }

    /// The current state.
    #[must_use]
    pub fn current(&self) -> ServerState {
        *self.current.borrow()
    }

    /// Every state entered so far, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ServerState> {
        self.history.lock().iter().map(|(state, _)| *state).collect()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.current.subscribe()
    }

    /// Moves forward to `next`.
    ///
    /// States only advance; a transition to the current or an earlier state
    /// is ignored and returns `false`.
    pub fn advance(&self, next: ServerState) -> bool {
        let mut history = self.history.lock();
        let moved = self.current.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!(state = %next, "server state changed");
            history.push((next, Instant::now()));
        }
        moved
    }

    /// Waits until the state is at least `target`.
    pub async fn reached(&self, target: ServerState) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state >= target).await;
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
