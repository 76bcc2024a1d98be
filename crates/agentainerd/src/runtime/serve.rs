//! Serve — bind the listener and run until a shutdown signal.

use anyhow::{Context, Result};
use tracing::info;

use crate::api;
use crate::state::AppState;

use super::shutdown::shutdown_signal;

pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.server.bind_address();
    let app = api::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("agentainerd is ready");
    info!("Listening on: http://{}", addr);
    info!("  - Control API: http://{}/agents (bearer token required)", addr);
    info!("  - Agent proxy: http://{}/agent/{{id}}/", addr);
    info!("  - Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Signal the reconcile and replay loops to stop.
    state.shutdown();

    info!("Server shut down gracefully");
    Ok(())
}
