//! Admin and read API over the sync orchestrator.

pub mod handlers;
pub mod routes;
pub mod types;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use handlers::AppState;
pub use routes::create_router;

pub struct HttpServer {
    listen_addr: String,
    state: AppState,
}

impl HttpServer {
    pub fn new(listen_addr: impl Into<String>, state: AppState) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            state,
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr: SocketAddr = self
            .listen_addr
            .parse()
            .context("invalid HTTP listen address")?;
        let app = create_router(self.state.clone()).layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(&addr)
            .await
            .context("failed to bind HTTP server")?;
        info!("HTTP API listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("HTTP server shutting down");
            })
            .await
            .context("HTTP server error")?;
        Ok(())
    }
}
