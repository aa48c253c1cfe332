//! Graceful shutdown utilities
//!
//! Provides unified shutdown signal handling for all services.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for shutdown signal (Ctrl+C or SIGTERM on Unix)
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(mut sig) = term_signal {
                    sig.recv().await;
                } else {
                    std::future::pending::<()>().await
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` when an OS shutdown signal arrives
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}
