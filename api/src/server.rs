//! API Server Module
//!
//! Router wiring and server lifecycle.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use codemend_core::ServerSettings;

use crate::handlers::{
    debug_code, debug_code_stream, health_check, rate_limit_status, ApiState,
};

/// Main API server
pub struct ApiServer {
    settings: ServerSettings,
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(settings: ServerSettings, state: Arc<ApiState>) -> Self {
        Self { settings, state }
    }

    /// Start serving; returns when the process receives ctrl-c.
    pub async fn start(&self) -> Result<()> {
        let app = Router::new()
            .route("/api/debug", post(debug_code))
            .route("/api/debug/stream", post(debug_code_stream))
            .route("/api/limits", get(rate_limit_status))
            .route("/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone());

        let addr: SocketAddr = format!("{}:{}", self.settings.host, self.settings.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;

        info!("Codemend API server listening on {addr}");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("API server failed: {e}"))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install ctrl-c handler: {e}");
    }
    info!("Shutdown signal received");
}
