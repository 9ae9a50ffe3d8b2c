//! Server lifecycle control.
//!
//! [`run`] starts the server and then waits on whichever comes first:
//!
//! - the accept loop ending on its own (bind failure or a fatal listener
//!   error), which is returned to the caller unretried;
//! - the interrupt future completing, which starts a graceful drain
//!   bounded by the configured shutdown timeout.
//!
//! The interrupt future is consumed by the race. Callers that want a second
//! interrupt to terminate the process must arm their own watcher after
//! `run` begins draining.
//!
//! # Example
//!
//! ```rust,no_run
//! use basement_server::{lifecycle, Server};
//!
//! # async fn example() -> basement_server::ServerResult<()> {
//! let server = Server::builder().build()?;
//! lifecycle::run(server, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

use std::future::Future;

use crate::error::ServerResult;
use crate::server::{ServeHandle, Server};
use crate::state::ServerState;

/// Serves until the accept loop fails or `interrupt` completes, then drains.
///
/// # Errors
///
/// Returns the listener error if serving ended first, or
/// [`ServerError::ShutdownTimeout`](crate::ServerError::ShutdownTimeout) if
/// the drain did not finish within the grace period.
pub async fn run<F>(server: Server, interrupt: F) -> ServerResult<()>
where
    F: Future<Output = ()>,
{
    supervise(server.spawn(), interrupt).await
}

/// Like [`run`], for a server that was already spawned.
pub async fn supervise<F>(mut handle: ServeHandle, interrupt: F) -> ServerResult<()>
where
    F: Future<Output = ()>,
{
    let grace = handle.grace();

    tokio::select! {
        served = handle.serve_result() => {
            if let Err(e) = served {
                tracing::error!(error = %e, "server failed");
                handle.state().advance(ServerState::Stopped);
                return Err(e);
            }
            // Stopped by a trigger from elsewhere; finish the drain.
            tracing::info!("accept loop ended, draining");
        }
        () = interrupt => {
            tracing::info!(grace_secs = grace.as_secs(), "interrupt received, shutting down");
        }
    }

    let result = handle.shutdown(grace).await;
    if let Err(e) = &result {
        tracing::warn!(error = %e, "graceful shutdown incomplete");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ListenerConfig, ServerError};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_interrupt_drains_and_stops() {
        let server = Server::builder()
            .config(
                ListenerConfig::builder()
                    .addr("127.0.0.1:0".parse().unwrap())
                    .shutdown_timeout(Duration::from_secs(1))
                    .build(),
            )
            .build()
            .unwrap();
        let state = server.state().clone();
        let (tx, rx) = oneshot::channel::<()>();

        let running = tokio::spawn(run(server, async {
            let _ = rx.await;
        }));

        state.reached(ServerState::Serving).await;
        tx.send(()).unwrap();

        running.await.unwrap().unwrap();
        assert_eq!(
            state.history(),
            vec![
                ServerState::Starting,
                ServerState::Serving,
                ServerState::ShuttingDown,
                ServerState::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_bind_failure_wins_race() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let server = Server::builder()
            .config(ListenerConfig::builder().addr(addr).build())
            .build()
            .unwrap();
        let state = server.state().clone();

        let result = run(server, std::future::pending()).await;

        assert!(matches!(result, Err(ServerError::Bind { addr: a, .. }) if a == addr));
        assert!(!state.history().contains(&ServerState::Serving));
        assert_eq!(state.current(), ServerState::Stopped);
    }
}
