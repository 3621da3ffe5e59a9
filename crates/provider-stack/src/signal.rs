//! Process signal trapping for the stack's shutdown trigger.

use tracing::info;

/// Resolves on SIGINT (ctrl-c) or, on unix, SIGTERM. Returns the signal name.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let received = tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT")?,
        _ = sigterm.recv() => "SIGTERM",
    };
    info!(signal = received, "Received shutdown signal");
    Ok(received)
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl-c", "Received shutdown signal");
    Ok("ctrl-c")
}
