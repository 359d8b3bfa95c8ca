use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router.
///
/// The `/ws` endpoint is unauthenticated: the gateway is a processing
/// pipeline for ephemeral audio, deployed behind network-level protection.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws::ws_gateway_handler))
        .layer(TraceLayer::new_for_http())
}
