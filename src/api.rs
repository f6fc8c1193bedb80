//! HTTP surface: the WebSocket endpoint, a health check and the static frontend.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::state::AppState;
use crate::ws;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Registered players
    pub players: usize,
    /// Connections bound to a player
    pub connections: usize,
}

/// GET /healthz
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.stats().await;
    Json(HealthResponse {
        status: "ok",
        players: stats.players,
        connections: stats.connections,
    })
}

/// Assemble the application router
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
