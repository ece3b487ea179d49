//! Base traits and types for conversational agent backends.
//!
//! A backend owns one bidirectional streaming connection to a remote agent
//! service. It accepts PCM audio and user-activity hints, and produces a lazy
//! sequence of [`BackendEvent`]s from a receive loop that runs for the life of
//! the connection.
//!
//! # Audio Format
//!
//! Audio in both directions is PCM 16-bit signed little-endian at 16kHz mono.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Missing or invalid credentials or endpoint
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// No live connection
    #[error("Not connected")]
    NotConnected,
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Default timeout for establishing the backend connection.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Provider-neutral backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Provider name (e.g., "elevenlabs")
    #[serde(default)]
    pub provider: String,

    /// API key for authentication
    #[serde(default)]
    pub api_key: String,

    /// Agent identifier on the remote platform
    #[serde(default)]
    pub agent_id: String,

    /// Pre-signed connection URL; takes precedence over `api_key`/`agent_id`
    #[serde(default)]
    pub signed_url: Option<String>,

    /// Override for the provider's WebSocket base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// PCM encoding declared to the backend
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_audio_format() -> String {
    "pcm_16000".to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_key: String::new(),
            agent_id: String::new(),
            signed_url: None,
            base_url: None,
            audio_format: default_audio_format(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state for backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never opened, or closed by the caller
    #[default]
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and relaying
    Connected,
    /// Transport dropped or the connection attempt failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Provider-neutral events produced by a backend receive loop.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The remote session is established
    SessionReady { session_id: String },
    /// The user's utterance was recognized
    UserTranscript { text: String },
    /// Agent utterance text; also marks the end of the agent's turn
    AgentResponse { text: String },
    /// The remote side acknowledged an interruption
    Interruption,
    /// A chunk of agent PCM audio of arbitrary size
    AudioChunk(Bytes),
    /// A keepalive ping was answered
    Keepalive { event_id: String },
    /// The transport dropped; no further events follow
    Disconnected,
}

/// Lazy sequence of events from a backend connection.
///
/// The sequence ends (`next` returns `None`) once the receive loop stops.
/// The channel is unbounded: a receive loop must never wait on its session,
/// since the session may itself be waiting on the connection.
#[derive(Debug)]
pub struct BackendEvents {
    rx: mpsc::UnboundedReceiver<BackendEvent>,
}

impl BackendEvents {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (mpsc::UnboundedSender<BackendEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next event.
    pub async fn next(&mut self) -> Option<BackendEvent> {
        self.rx.recv().await
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for conversational agent backends.
///
/// # Example
///
/// ```rust,ignore
/// use v2v_gateway::core::backend::{create_backend, BackendConfig};
///
/// let config = BackendConfig {
///     api_key: "xi-...".to_string(),
///     agent_id: "agent_123".to_string(),
///     ..Default::default()
/// };
///
/// let mut backend = create_backend("elevenlabs", config)?;
/// let mut events = backend.open().await?;
///
/// backend.send_audio(pcm_frame).await?;
/// while let Some(event) = events.next().await {
///     println!("{event:?}");
/// }
/// backend.close().await?;
/// ```
#[async_trait]
pub trait BaseBackend: Send + Sync {
    /// Create a new backend instance.
    ///
    /// Incomplete credentials are logged here; they only fail in [`open`](Self::open).
    fn new(config: BackendConfig) -> BackendResult<Self>
    where
        Self: Sized;

    /// Open the streaming connection and start the receive loop.
    async fn open(&mut self) -> BackendResult<BackendEvents>;

    /// Send one PCM frame to the backend.
    async fn send_audio(&mut self, pcm: Bytes) -> BackendResult<()>;

    /// Tell the backend the user has started speaking.
    async fn notify_user_activity(&mut self) -> BackendResult<()>;

    /// Stop the receive loop and close the connection. Safe to call repeatedly.
    async fn close(&mut self) -> BackendResult<()>;

    /// Whether the connection is open and the receive loop is running.
    fn is_active(&self) -> bool;

    /// Get the current connection state.
    fn get_connection_state(&self) -> ConnectionState;

    /// Remote session id, once the backend has announced it.
    fn session_id(&self) -> Option<String>;

    /// Get provider information.
    fn get_provider_info(&self) -> serde_json::Value;
}

/// Boxed backend for dynamic dispatch.
pub type BoxedBackend = Box<dyn BaseBackend>;
