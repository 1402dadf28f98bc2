//! OS signal handling.
//!
//! SIGTERM and SIGINT both request a graceful shutdown.

use super::Shutdown;

/// Wait for SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM, using Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!(signal = "SIGINT", "Termination requested"),
        _ = terminate.recv() => tracing::info!(signal = "SIGTERM", "Termination requested"),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Termination requested");
}

/// Trigger `shutdown` on the first termination signal.
pub fn spawn_signal_handler(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_termination().await;
        shutdown.trigger();
    })
}
