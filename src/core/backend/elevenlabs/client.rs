//! ElevenLabs Conversational AI client.
//!
//! One WebSocket per conversation. A spawned receive loop owns both halves of
//! the socket: it forwards queued client messages, answers keepalive pings on
//! the same connection, and translates server messages into [`BackendEvent`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::config::{ELEVENLABS_WS_BASE_URL, ElevenLabsConfig};
use super::messages::{ClientEvent, MessageTypeHint, ServerEvent};
use crate::core::backend::base::{
    BackendConfig, BackendError, BackendEvent, BackendEvents, BackendResult, BaseBackend,
    ConnectionState,
};

/// Channel capacity for outgoing client messages.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// =============================================================================
// ElevenLabs Client
// =============================================================================

/// ElevenLabs Conversational AI backend.
///
/// Connection state, the active flag and the conversation id are shared with
/// the receive loop. The loop never reconnects; a dropped transport marks the
/// backend inactive and ends the event sequence.
pub struct ElevenLabsBackend {
    config: ElevenLabsConfig,
    state: Arc<RwLock<ConnectionState>>,
    active: Arc<AtomicBool>,
    session_id: Arc<RwLock<Option<String>>>,
    ws_sender: Option<mpsc::Sender<ClientEvent>>,
    cancel: Option<CancellationToken>,
    receive_task: Option<JoinHandle<()>>,
}

impl ElevenLabsBackend {
    /// Queue a client message for the receive loop to write.
    async fn send_event(&self, event: ClientEvent) -> BackendResult<()> {
        let Some(sender) = self.ws_sender.as_ref() else {
            return Err(BackendError::NotConnected);
        };
        sender
            .send(event)
            .await
            .map_err(|_| BackendError::NotConnected)
    }
}

#[async_trait]
impl BaseBackend for ElevenLabsBackend {
    fn new(config: BackendConfig) -> BackendResult<Self> {
        let config = ElevenLabsConfig::from_backend_config(&config)?;

        if !config.is_complete() {
            tracing::warn!(
                "ElevenLabs configuration incomplete: set api_key and agent_id, or signed_url"
            );
        }

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            active: Arc::new(AtomicBool::new(false)),
            session_id: Arc::new(RwLock::new(None)),
            ws_sender: None,
            cancel: None,
            receive_task: None,
        })
    }

    async fn open(&mut self) -> BackendResult<BackendEvents> {
        if self.receive_task.is_some() {
            self.close().await?;
        }

        let url = self.config.websocket_url()?;
        *self.state.write() = ConnectionState::Connecting;

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let connected = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str()))
            .await;
        let ws_stream = match connected {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                *self.state.write() = ConnectionState::Failed;
                return Err(BackendError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                *self.state.write() = ConnectionState::Failed;
                return Err(BackendError::Timeout(format!(
                    "ElevenLabs connection after {}s",
                    self.config.connect_timeout_secs
                )));
            }
        };

        tracing::info!(host = ?url.host_str(), "Connected to ElevenLabs Conversational AI");

        let (mut ws_sink, ws_stream) = ws_stream.split();

        let init = serde_json::to_string(&ClientEvent::initiation(self.config.audio_format))
            .map_err(|e| BackendError::SerializationError(e.to_string()))?;
        if let Err(e) = ws_sink.send(Message::Text(init.into())).await {
            *self.state.write() = ConnectionState::Failed;
            return Err(BackendError::WebSocketError(e.to_string()));
        }

        let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (event_tx, events) = BackendEvents::channel();
        let cancel = CancellationToken::new();

        *self.session_id.write() = None;
        self.active.store(true, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Connected;

        let receive_loop = ReceiveLoop {
            sink: ws_sink,
            events: event_tx,
            session_id: self.session_id.clone(),
        };
        let handle = tokio::spawn(receive_loop.run(
            ws_stream,
            rx,
            cancel.clone(),
            self.active.clone(),
            self.state.clone(),
        ));

        self.ws_sender = Some(tx);
        self.cancel = Some(cancel);
        self.receive_task = Some(handle);

        tracing::info!("ElevenLabs conversation started");
        Ok(events)
    }

    async fn send_audio(&mut self, pcm: Bytes) -> BackendResult<()> {
        if !self.is_active() {
            return Err(BackendError::NotConnected);
        }
        self.send_event(ClientEvent::audio_chunk(&pcm)).await
    }

    async fn notify_user_activity(&mut self) -> BackendResult<()> {
        if !self.is_active() {
            return Err(BackendError::NotConnected);
        }
        self.send_event(ClientEvent::user_activity()).await
    }

    async fn close(&mut self) -> BackendResult<()> {
        self.active.store(false, Ordering::SeqCst);
        self.ws_sender = None;

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        if let Some(handle) = self.receive_task.take() {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!("ElevenLabs receive loop ended abnormally: {}", e),
            }
            tracing::info!("ElevenLabs conversation stopped");
        }

        *self.state.write() = ConnectionState::Disconnected;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "elevenlabs",
            "api_type": "WebSocket Conversational AI",
            "version": "1.0.0",
            "endpoint": ELEVENLABS_WS_BASE_URL,
            "supported_audio_formats": ["pcm_16000", "pcm_22050", "pcm_24000", "pcm_44100"],
            "audio_format": self.config.audio_format.as_str(),
            "features": {
                "bidirectional_audio": true,
                "user_activity": true,
                "interruption": true,
                "signed_url": true
            },
            "documentation": "https://elevenlabs.io/docs/agents-platform/overview"
        })
    }
}

// =============================================================================
// Receive Loop
// =============================================================================

/// What the loop should do after handling one frame.
enum Flow {
    Continue,
    Stop,
}

struct ReceiveLoop {
    sink: WsSink,
    events: mpsc::UnboundedSender<BackendEvent>,
    session_id: Arc<RwLock<Option<String>>>,
}

impl ReceiveLoop {
    async fn run(
        mut self,
        mut ws_stream: futures_util::stream::SplitStream<WsStream>,
        mut rx: mpsc::Receiver<ClientEvent>,
        cancel: CancellationToken,
        active: Arc<AtomicBool>,
        state: Arc<RwLock<ConnectionState>>,
    ) {
        let mut transport_lost = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                Some(event) = rx.recv() => {
                    if let Flow::Stop = self.write(&event).await {
                        transport_lost = true;
                        break;
                    }
                }

                msg = ws_stream.next() => {
                    let flow = match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                        Some(Ok(Message::Binary(data))) => self.handle_binary(data).await,
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = self.sink.send(Message::Pong(data)).await {
                                tracing::error!("Failed to send pong: {}", e);
                            }
                            Flow::Continue
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "ElevenLabs WebSocket closed by server");
                            transport_lost = true;
                            Flow::Stop
                        }
                        Some(Ok(_)) => Flow::Continue,
                        Some(Err(e)) => {
                            tracing::error!("ElevenLabs WebSocket error: {}", e);
                            transport_lost = true;
                            Flow::Stop
                        }
                        None => {
                            tracing::info!("ElevenLabs WebSocket stream ended");
                            transport_lost = true;
                            Flow::Stop
                        }
                    };
                    if let Flow::Stop = flow {
                        break;
                    }
                }
            }
        }

        active.store(false, Ordering::SeqCst);

        if transport_lost {
            *state.write() = ConnectionState::Failed;
            let _ = self.events.send(BackendEvent::Disconnected);
        } else {
            match tokio::time::timeout(CLOSE_TIMEOUT, self.sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("ElevenLabs close handshake failed: {}", e),
                Err(_) => tracing::debug!("ElevenLabs close handshake timed out"),
            }
        }

        tracing::debug!("ElevenLabs receive loop ended");
    }

    async fn write(&mut self, event: &ClientEvent) -> Flow {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("Failed to serialize client message: {}", e);
                return Flow::Continue;
            }
        };

        match self.sink.send(Message::Text(json.into())).await {
            Ok(()) => Flow::Continue,
            Err(e) => {
                tracing::error!("Failed to send ElevenLabs message: {}", e);
                Flow::Stop
            }
        }
    }

    async fn handle_binary(&mut self, data: Bytes) -> Flow {
        if let Ok(text) = std::str::from_utf8(&data) {
            if text.trim_start().starts_with('{') {
                return self.handle_text(text).await;
            }
        }
        self.emit(BackendEvent::AudioChunk(data))
    }

    async fn handle_text(&mut self, text: &str) -> Flow {
        let event = match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Failed to parse ElevenLabs message: {} - {}", e, text);
                return Flow::Continue;
            }
        };

        match event {
            ServerEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: meta,
            } => {
                let session_id = meta.conversation_id.unwrap_or_default();
                tracing::info!(conversation_id = %session_id, "ElevenLabs conversation ready");
                *self.session_id.write() = Some(session_id.clone());
                self.emit(BackendEvent::SessionReady { session_id })
            }
            ServerEvent::UserTranscript {
                user_transcription_event,
            } => {
                let text = user_transcription_event.user_transcript;
                tracing::info!(transcript = %text, "User");
                self.emit(BackendEvent::UserTranscript { text })
            }
            ServerEvent::AgentResponse {
                agent_response_event,
            }
            | ServerEvent::AgentResponseTranscript {
                agent_response_event,
            } => {
                let text = agent_response_event.agent_response.trim().to_string();
                tracing::info!(response = %text, "Agent");
                self.emit(BackendEvent::AgentResponse { text })
            }
            ServerEvent::Interruption => self.emit(BackendEvent::Interruption),
            ServerEvent::Audio { audio_event } => {
                if audio_event.audio_base_64.is_empty() {
                    return Flow::Continue;
                }
                match ServerEvent::decode_audio(&audio_event.audio_base_64) {
                    Ok(pcm) => self.emit(BackendEvent::AudioChunk(Bytes::from(pcm))),
                    Err(e) => {
                        tracing::warn!("Failed to decode ElevenLabs audio: {}", e);
                        Flow::Continue
                    }
                }
            }
            ServerEvent::Ping { ping_event } => {
                let event_id = ping_event.event_id;
                if let Flow::Stop = self.write(&ClientEvent::pong(event_id.clone())).await {
                    return Flow::Stop;
                }
                let event_id = match event_id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                self.emit(BackendEvent::Keepalive { event_id })
            }
            ServerEvent::Unknown => {
                let kind = serde_json::from_str::<MessageTypeHint>(text)
                    .ok()
                    .and_then(|p| p.kind);
                tracing::debug!(message_type = ?kind, "Ignoring ElevenLabs message");
                Flow::Continue
            }
        }
    }

    /// Forward an event to the session. A dropped receiver ends the loop.
    fn emit(&self, event: BackendEvent) -> Flow {
        match self.events.send(event) {
            Ok(()) => Flow::Continue,
            Err(_) => {
                tracing::debug!("Backend event receiver dropped");
                Flow::Stop
            }
        }
    }
}
