use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, providers};
use crate::state::AppState;
use std::sync::Arc;

/// Create the public API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/status", get(api::status))
        .route("/providers", get(providers::list_providers))
        .route("/providers/{id}", get(providers::get_provider))
        .layer(TraceLayer::new_for_http())
}
