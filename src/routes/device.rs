//! Device WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::device_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the device WebSocket router
///
/// # Endpoint
///
/// `GET /ws/v2v` - WebSocket upgrade for a voice-to-voice session
///
/// An optional `device-id` header identifies the device in logs.
///
/// # Example
///
/// ```json
/// // Device starts speaking
/// {"type": "listen", "state": "start", "mode": "auto"}
/// // Device streams Opus frames as binary messages
///
/// // Server brackets agent audio
/// {"type": "tts", "state": "start", "session_id": "..."}
/// // Server streams paced Opus frames as binary messages
/// {"type": "tts", "state": "stop", "session_id": "..."}
/// ```
pub fn create_device_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/v2v", get(device_handler))
        .layer(TraceLayer::new_for_http())
}
