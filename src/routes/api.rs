use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::api;
use crate::state::AppState;

/// Health and status routes.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/status", get(api::status))
}
