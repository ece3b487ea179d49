use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint
///
/// Returns `{"status":"OK"}` while the server is accepting connections.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "OK" })
}

/// Gateway status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub v2v_enabled: bool,
    pub provider: String,
    pub credentials_configured: bool,
    pub active_sessions: usize,
}

/// Runtime status of the voice-to-voice path
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let v2v = &state.config.v2v;
    Json(StatusResponse {
        v2v_enabled: v2v.enabled,
        provider: v2v.provider.clone(),
        credentials_configured: v2v.has_credentials(),
        active_sessions: state.active_session_count(),
    })
}
