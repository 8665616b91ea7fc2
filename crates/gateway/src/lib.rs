//! HTTP API gateway for ragachat.
//!
//! Exposes the chat session API under `/api/v1/chat/session` and a health
//! check. Answers stream back as server-sent events.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use ragachat_chat::ChatRuntime;
use ragachat_config::AppConfig;

/// Build the full router: health check plus the v1 API.
pub fn build_router(api_state: api_v1::SharedApiState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(api_v1::v1_router(api_state))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = ChatRuntime::from_config(&config).await?;
    serve(&config, runtime).await
}

/// Serve an already assembled runtime.
pub async fn serve(
    config: &AppConfig,
    runtime: ChatRuntime,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let api_state = Arc::new(api_v1::ApiV1State {
        orchestrator: runtime.orchestrator,
    });
    let app = build_router(api_state, config.gateway.max_body_bytes);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
