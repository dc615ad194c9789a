//! Web server for the command dispatcher.

pub mod router;
pub mod types;

pub use router::create_router_with_state;
pub use types::{ServerState, MAX_REQUEST_BODY_SIZE};

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Start the worker and serve the API on `bind` until Ctrl+C or SIGTERM.
pub async fn run(bind: SocketAddr, state: ServerState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "MeshLink API listening");
    serve(listener, state, crate::shutdown::shutdown_signal()).await
}

/// Serve on an existing listener until `signal` resolves, then drain the
/// worker.
pub async fn serve<F>(listener: TcpListener, state: ServerState, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.processor.start().await;

    let app = create_router_with_state(state.clone());

    // Run with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await?;

    // Clean up resources after server shuts down
    crate::shutdown::cleanup_resources(&state).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
