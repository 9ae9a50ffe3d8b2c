//! Interrupt handling.
//!
//! The first Ctrl-C starts a graceful shutdown. Tokio cannot hand the signal
//! back to the default handler, so after the first one a watcher exits the
//! process on the next.

use std::io;

use tokio::sync::mpsc;

/// Exit status after a second interrupt (128 + SIGINT).
pub const FORCED_EXIT_CODE: i32 = 130;

/// Completes on the first interrupt and arms the force-exit watcher.
pub async fn interrupt() {
    match listen() {
        Ok(interrupts) => {
            interrupt_from(interrupts, |code| {
                std::process::exit(code);
            })
            .await;
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for interrupts");
            std::future::pending::<()>().await;
        }
    }
}

/// Completes on the first interrupt from `interrupts`, then calls `exit`
/// with [`FORCED_EXIT_CODE`] on the next one.
///
/// Interrupts delivered between the two stay queued in the channel. A closed
/// source never completes.
pub async fn interrupt_from<X>(mut interrupts: mpsc::UnboundedReceiver<()>, exit: X)
where
    X: FnOnce(i32) + Send + 'static,
{
    if interrupts.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
    tracing::info!("interrupt received");

    tokio::spawn(async move {
        if interrupts.recv().await.is_some() {
            tracing::warn!("second interrupt, exiting immediately");
            exit(FORCED_EXIT_CODE);
        }
    });
}

// The OS listener is registered here, before the first interrupt is awaited,
// and forwards every delivery for the life of the process.
fn listen() -> io::Result<mpsc::UnboundedReceiver<()>> {
    #[cfg(unix)]
    let mut signals = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    #[cfg(windows)]
    let mut signals = tokio::signal::windows::ctrl_c()?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while signals.recv().await.is_some() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::oneshot;

    fn exit_recorder() -> (impl FnOnce(i32) + Send + 'static, oneshot::Receiver<i32>) {
        let (tx, rx) = oneshot::channel();
        (
            move |code| {
                let _ = tx.send(code);
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_second_interrupt_forces_exit() {
        let (tx, interrupts) = mpsc::unbounded_channel();
        let (exit, mut exited) = exit_recorder();

        tx.send(()).unwrap();
        interrupt_from(interrupts, exit).await;

        tokio::task::yield_now().await;
        assert!(exited.try_recv().is_err(), "first interrupt must not exit");

        tx.send(()).unwrap();
        let code = tokio::time::timeout(Duration::from_secs(1), exited)
            .await
            .expect("second interrupt should exit")
            .unwrap();
        assert_eq!(code, FORCED_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_back_to_back_interrupts_are_not_lost() {
        let (tx, interrupts) = mpsc::unbounded_channel();
        let (exit, exited) = exit_recorder();

        tx.send(()).unwrap();
        tx.send(()).unwrap();
        interrupt_from(interrupts, exit).await;

        let code = tokio::time::timeout(Duration::from_secs(1), exited)
            .await
            .expect("queued interrupt should exit")
            .unwrap();
        assert_eq!(code, FORCED_EXIT_CODE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_source_never_completes() {
        let (tx, interrupts) = mpsc::unbounded_channel::<()>();
        drop(tx);
        let (exit, _exited) = exit_recorder();

        let waited =
            tokio::time::timeout(Duration::from_secs(60), interrupt_from(interrupts, exit)).await;
        assert!(waited.is_err());
    }
}
