//! MCP pipe
//!
//! Bridges the Xiaozhi WebSocket endpoint and a local stdio MCP server,
//! reconnecting with exponential backoff until asked to stop.

pub mod backoff;
pub mod bridge;
pub mod process;

pub use bridge::{McpPipe, SessionEnd};

use tracing::info;

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = terminate.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => tracing::warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received SIGINT");
    }
}
