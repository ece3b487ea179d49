//! Device WebSocket handler
//!
//! One connection is one voice-to-voice session. The handler owns the socket
//! halves and translates frames to session commands; all turn-taking lives in
//! the session actor.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::core::relay::{DeviceOutput, Session, SessionError, SessionHandle};
use crate::state::AppState;

use super::messages::{
    DeviceIncomingMessage, DeviceMessageRoute, DeviceOutgoingMessage, MAX_TEXT_MESSAGE_SIZE,
};

/// Channel buffer size for outgoing socket traffic
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Header carrying the device identifier
pub const DEVICE_ID_HEADER: &str = "device-id";

/// How often we check if the connection is stale
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum idle time before closing the connection
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Time allowed for queued output to drain after the session ends
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Device WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket for a voice-to-voice session.
pub async fn device_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let device_id = headers
        .get(DEVICE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    info!(device_id = ?device_id, "Device WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| {
            let span = info_span!("device", device_id = device_id.as_deref().unwrap_or("-"));
            handle_device_socket(socket, state, device_id).instrument(span)
        })
}

/// Handle the device WebSocket connection
async fn handle_device_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    device_id: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    let backend = match app_state.create_backend() {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to create backend: {}", e);
            let message = DeviceOutgoingMessage::error(format!("Backend unavailable: {e}"));
            if let Ok(json) = serde_json::to_string(&message) {
                let _ = sender.send(Message::Text(json.into())).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let (message_tx, mut message_rx) = mpsc::channel::<DeviceMessageRoute>(CHANNEL_BUFFER_SIZE);
    let (output_tx, mut output_rx) = mpsc::channel::<DeviceOutput>(CHANNEL_BUFFER_SIZE);

    let session = Session::new(backend, output_tx, app_state.session_settings(device_id))
        .with_collaborator(app_state.collaborator());
    let session_id = session.id().to_string();
    let handle = session.spawn();
    app_state.register_session(handle.clone());

    info!(session_id = %session_id, "Device WebSocket connection established");

    // Sender task for outgoing messages
    let sender_session_id = session_id.clone();
    let mut sender_task = tokio::spawn(async move {
        loop {
            let route = select! {
                Some(route) = message_rx.recv() => route,
                Some(output) = output_rx.recv() => {
                    DeviceMessageRoute::from_output(output, &sender_session_id)
                }
                else => break,
            };
            let should_close = matches!(route, DeviceMessageRoute::Close);

            let result = match route {
                DeviceMessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                DeviceMessageRoute::Audio(data) => sender.send(Message::Binary(data)).await,
                DeviceMessageRoute::Close => {
                    info!("Closing device WebSocket connection");
                    sender.send(Message::Close(None)).await
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    if app_state.config.v2v.enabled
        && let Err(e) = handle.start_conversation().await
    {
        warn!("Conversation not started, will retry on listen start: {}", e);
        let _ = message_tx
            .send(DeviceMessageRoute::Outgoing(DeviceOutgoingMessage::error(
                format!("Failed to start conversation: {e}"),
            )))
            .await;
    }

    // Track last activity time for idle connection detection
    let mut last_activity = std::time::Instant::now();

    loop {
        select! {
            msg_result = receiver.next() => {
                last_activity = std::time::Instant::now();

                match msg_result {
                    Some(Ok(msg)) => {
                        if !process_device_message(msg, &handle, &message_tx).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Device WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!("Device WebSocket connection closed by client");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {
                if last_activity.elapsed() > IDLE_TIMEOUT {
                    warn!(
                        "Device WebSocket connection idle for {}s, closing stale connection",
                        last_activity.elapsed().as_secs()
                    );
                    let _ = message_tx
                        .send(DeviceMessageRoute::Outgoing(DeviceOutgoingMessage::error(
                            "Connection closed due to inactivity",
                        )))
                        .await;
                    break;
                }
                debug!("Device WebSocket connection idle check - still active");
            }
        }
    }

    // Cleanup
    handle.cleanup().await;
    app_state.remove_session(&session_id);

    let _ = message_tx.send(DeviceMessageRoute::Close).await;
    drop(message_tx);
    if tokio::time::timeout(SENDER_DRAIN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }

    info!(session_id = %session_id, "Device WebSocket connection terminated");
}

/// Process incoming WebSocket message. Returns `false` to end the connection.
async fn process_device_message(
    msg: Message,
    handle: &SessionHandle,
    message_tx: &mpsc::Sender<DeviceMessageRoute>,
) -> bool {
    let result = match msg {
        Message::Text(text) => {
            if text.len() > MAX_TEXT_MESSAGE_SIZE {
                warn!("Control message too large: {} bytes", text.len());
                send_error(message_tx, "Message too large").await;
                return true;
            }

            let incoming: DeviceIncomingMessage = match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Failed to parse device message: {}", e);
                    send_error(message_tx, format!("Invalid message format: {e}")).await;
                    return true;
                }
            };

            handle_incoming(incoming, handle, message_tx).await
        }
        Message::Binary(data) => handle.audio(data).await,
        Message::Ping(_) | Message::Pong(_) => Ok(()),
        Message::Close(_) => {
            info!("Device WebSocket close received");
            return false;
        }
    };

    match result {
        Ok(()) => true,
        Err(SessionError::Closed) => {
            warn!("Session ended, closing device connection");
            false
        }
        Err(e) => {
            send_error(message_tx, e.to_string()).await;
            true
        }
    }
}

/// Handle typed incoming messages
async fn handle_incoming(
    msg: DeviceIncomingMessage,
    handle: &SessionHandle,
    message_tx: &mpsc::Sender<DeviceMessageRoute>,
) -> Result<(), SessionError> {
    match msg {
        DeviceIncomingMessage::Hello { audio_params } => {
            debug!(audio_params = ?audio_params, "Device hello");
            let _ = message_tx
                .send(DeviceMessageRoute::Outgoing(DeviceOutgoingMessage::hello(
                    handle.id(),
                )))
                .await;
            Ok(())
        }
        DeviceIncomingMessage::Listen { state, mode, text } => {
            debug!(state = ?state, "Device listen");
            handle.listen(state, mode, text).await
        }
        DeviceIncomingMessage::Abort { reason } => {
            debug!(reason = ?reason, "Device abort");
            handle.abort().await
        }
    }
}

async fn send_error(message_tx: &mpsc::Sender<DeviceMessageRoute>, message: impl Into<String>) {
    let _ = message_tx
        .send(DeviceMessageRoute::Outgoing(DeviceOutgoingMessage::error(
            message,
        )))
        .await;
}
