/// HTTP Server Module
///
/// Provides a liveness endpoint and per-chat session statistics.

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::Utc;
use std::sync::Arc;

use crate::session::SessionRegistry;
use crate::store::VectorStore;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub store: Arc<VectorStore>,
}

/// Create and configure the HTTP server router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/session-stats", get(session_stats_endpoint))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "tg_rag_bot",
        "timestamp": Utc::now().to_rfc3339()
    })))
}

/// Session statistics endpoint
async fn session_stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let stats = state.sessions.stats().await;

    // A failing store should not take the stats endpoint down with it
    let indexed = match state.store.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            log::warn!("Failed to count records in {}: {}", state.store.collection(), e);
            None
        }
    };

    Ok(Json(serde_json::json!({
        "chats": stats.chats,
        "tracked_ids": stats.tracked_ids,
        "collection": state.store.collection(),
        "indexed_records": indexed
    })))
}

/// Start the HTTP server
pub async fn start_server(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .context("Failed to bind HTTP server")?;

    log::info!("HTTP server listening on port {}", port);

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}
