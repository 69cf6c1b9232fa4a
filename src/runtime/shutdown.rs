//! OS signal handling for the daemon.
//!
//! [`wait_for_shutdown_signal`] completes on SIGINT, SIGTERM or SIGQUIT on
//! Unix and on Ctrl-C elsewhere. [`cancel_on_signal`] bridges that into a
//! [`CancellationToken`] for the orchestrator loop.

use tokio_util::sync::CancellationToken;

/// Wait for a termination signal.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Wait for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Spawn a task cancelling `token` on the first termination signal.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            res = wait_for_shutdown_signal() => {
                match res {
                    Ok(()) => tracing::info!("termination signal received"),
                    Err(e) => tracing::error!(error = %e, "signal handler failed, shutting down"),
                }
                token.cancel();
            }
        }
    })
}
