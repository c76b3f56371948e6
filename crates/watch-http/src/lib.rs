//! HTTP transport for the watch server.
//!
//! Serves MCP over HTTP in two flavours: the stateless `POST /mcp` endpoint
//! and the legacy SSE session transport (`GET /sse` + `POST /messages`).

mod routes;
mod sse;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

pub use sse::{SessionRegistry, MESSAGES_PATH};
pub use state::SharedState;

/// Handle to a running HTTP server.
#[derive(Default)]
pub struct HttpServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl HttpServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop the server gracefully.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Build the router with all MCP routes.
pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(routes::mcp_handler)
                .get(routes::method_not_allowed)
                .delete(routes::method_not_allowed),
        )
        .route("/sse", get(sse::sse_handler))
        .route(MESSAGES_PATH, post(routes::messages_handler))
        .route("/health", get(routes::health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the HTTP server on the given host and port.
///
/// Binds before returning so address errors surface to the caller. The
/// server itself runs as a task on the current tokio runtime.
pub async fn start(state: Arc<SharedState>, host: &str, port: u16) -> Result<HttpServerHandle, String> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .map_err(|e| format!("Failed to bind HTTP server to {}:{}: {}", host, port, e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to read bound address: {}", e))?;

    log::info!("MCP server running on http://localhost:{}", local_addr.port());

    let app = router(state);
    let task = tokio::spawn(async move {
        // Run with graceful shutdown
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                log::info!("HTTP server shutting down");
            })
            .await
        {
            log::error!("HTTP server error: {}", e);
        }
    });

    Ok(HttpServerHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
        local_addr: Some(local_addr),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use watch_core::store::LogStore;

    fn state() -> Arc<SharedState> {
        Arc::new(SharedState::for_store(Arc::new(LogStore::new(10))))
    }

    #[tokio::test]
    async fn default_handle_stops_without_a_server() {
        let mut handle = HttpServerHandle::default();
        assert!(handle.local_addr().is_none());
        handle.stop().await;
    }

    #[tokio::test]
    async fn server_starts_and_stops() {
        let mut handle = start(state(), "127.0.0.1", 0).await.unwrap();
        let port = handle.local_addr().unwrap().port();
        assert_ne!(port, 0);

        handle.stop().await;

        // The listener is released once the server has shut down.
        let mut again = start(state(), "127.0.0.1", port).await.unwrap();
        again.stop().await;
    }

    #[tokio::test]
    async fn port_in_use_is_an_error() {
        let mut first = start(state(), "127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let second = start(state(), "127.0.0.1", port).await;
        assert!(second.is_err());

        first.stop().await;
    }
}
