//! ElevenLabs Conversational AI backend.
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian; 16kHz by default to match device framing.
//!
//! # Example
//!
//! ```rust,ignore
//! use v2v_gateway::core::backend::{BackendConfig, BaseBackend, ElevenLabsBackend};
//!
//! let mut backend = ElevenLabsBackend::new(BackendConfig {
//!     api_key: "xi-...".to_string(),
//!     agent_id: "agent_123".to_string(),
//!     ..Default::default()
//! })?;
//! let mut events = backend.open().await?;
//! ```

mod client;
mod config;
mod messages;

pub use client::ElevenLabsBackend;
pub use config::{
    ELEVENLABS_CONVERSATION_PATH, ELEVENLABS_WS_BASE_URL, ElevenLabsAudioFormat, ElevenLabsConfig,
};
pub use messages::{ClientEvent, ServerEvent};
