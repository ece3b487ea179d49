//! Router construction

pub mod api;
pub mod device;

use axum::Router;
use http::{HeaderValue, header};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::state::AppState;

/// Build the complete application: public API plus the device WebSocket.
pub fn create_app(state: Arc<AppState>) -> Router {
    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    api::create_api_router()
        .merge(device::create_device_router())
        .with_state(state)
        .layer(security_headers)
}
