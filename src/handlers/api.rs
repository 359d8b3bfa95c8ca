//! Health and status handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
/// Returns a simple JSON response indicating the server is running
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Gateway status snapshot.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active_sessions: usize,
    pub epd_connected: bool,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        active_sessions: state.manager.active_sessions(),
        epd_connected: state.epd.is_connected(),
    })
}
