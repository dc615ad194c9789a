//! Graceful shutdown handling for the web server.

use std::time::Duration;

use crate::server::ServerState;

/// Time allowed for the worker to finish its current command.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Stop the worker and abandon whatever is still queued.
pub async fn cleanup_resources(state: &ServerState) {
    tracing::info!("Cleaning up resources...");

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, state.processor.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Command worker did not stop in time"
        );
    }

    let stats = state.dispatcher().stats();
    tracing::info!(
        processed = stats.commands_processed_total,
        dropped = stats.commands_dropped_total,
        debounced = stats.commands_debounced_total,
        "Dispatcher totals"
    );

    let uptime = chrono::Utc::now().timestamp() - state.started_at;
    tracing::info!("Server uptime: {} seconds", uptime);
}
