//! Signal handling for graceful server shutdown.
//!
//! The first SIGINT/SIGTERM (Ctrl+C on Windows) stops the tick loop and lets
//! queued updates drain. A second one exits immediately.

use tokio::signal;
use tracing::{info, warn};

/// Waits for a termination signal and logs it.
pub async fn setup_signal_handlers() -> Result<(), Box<dyn std::error::Error>> {
    setup_signal_handlers_silent().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    Ok(())
}

pub async fn setup_signal_handlers_silent() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Exits the process on the next termination signal.
pub fn spawn_merciless_shutdown() {
    tokio::spawn(async move {
        if let Err(e) = setup_signal_handlers_silent().await {
            warn!("Failed to set up merciless shutdown signal handler: {e}");
            return;
        }

        warn!("Shutdown handler received again! I'll make this quick.");
        std::process::exit(1);
    });
}
