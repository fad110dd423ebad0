//! Server execution logic.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::config::ChatConfig;

use super::{
    handler::{health_check, room_snapshot, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket エンドポイント
        .route("/ws", get(websocket_handler))
        // HTTP エンドポイント
        .route("/api/health", get(health_check))
        .route("/api/room", get(room_snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// WebSocket chat server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(ChatConfig::default());
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    config: ChatConfig,
}

impl Server {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }

    /// Run the WebSocket chat server
    ///
    /// On Ctrl+C or SIGTERM every open session is cancelled before the
    /// listener stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        tracing::info!(config = ?self.config, "Room created");
        let state = Arc::new(AppState::new(self.config));
        let shutdown = state.shutdown.clone();
        let app = router(state);

        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!(
            "WebSocket chat server listening on {}",
            listener.local_addr()?
        );
        tracing::info!("Connect to: ws://{}/ws?name=<name>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                shutdown.cancel();
            })
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
