//! Device WebSocket message types
//!
//! Control messages are JSON text frames tagged by `type`. Audio travels as
//! binary frames holding one Opus packet each.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::audio::{CHANNELS, FRAME_DURATION_MS, SAMPLE_RATE};
use crate::core::relay::{DeviceOutput, ListenState, PlaybackIndication};

/// Maximum allowed size for a text control message (16 KB)
pub const MAX_TEXT_MESSAGE_SIZE: usize = 16 * 1024;

// =============================================================================
// Incoming Messages (Device -> Server)
// =============================================================================

/// Incoming WebSocket messages from a device
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceIncomingMessage {
    /// Handshake announcing the device's audio parameters
    Hello {
        #[serde(default)]
        audio_params: Option<AudioParams>,
    },

    /// Listening state change
    Listen {
        state: ListenState,
        /// Listening mode ("auto", "manual", "realtime")
        #[serde(default)]
        mode: Option<String>,
        /// Wake word text for `detect`
        #[serde(default)]
        text: Option<String>,
    },

    /// Stop agent playback
    Abort {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Audio stream parameters
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub frame_duration: u64,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: "opus".to_string(),
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            frame_duration: FRAME_DURATION_MS,
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Device)
// =============================================================================

/// Playback state carried by `tts` messages
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsState {
    Start,
    Stop,
}

impl From<PlaybackIndication> for TtsState {
    fn from(indication: PlaybackIndication) -> Self {
        match indication {
            PlaybackIndication::Start => TtsState::Start,
            PlaybackIndication::Stop => TtsState::Stop,
        }
    }
}

/// Outgoing WebSocket messages to a device
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceOutgoingMessage {
    /// Handshake reply; the device plays audio with these parameters
    Hello {
        session_id: String,
        transport: String,
        audio_params: AudioParams,
    },

    /// Agent playback boundary
    Tts {
        state: TtsState,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Error message
    Error { message: String },
}

impl DeviceOutgoingMessage {
    pub fn hello(session_id: &str) -> Self {
        Self::Hello {
            session_id: session_id.to_string(),
            transport: "websocket".to_string(),
            audio_params: AudioParams::default(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Message routing for the WebSocket sender task
#[derive(Debug)]
pub enum DeviceMessageRoute {
    Outgoing(DeviceOutgoingMessage),
    Audio(Bytes),
    Close,
}

impl DeviceMessageRoute {
    /// Route a session output to the socket.
    pub fn from_output(output: DeviceOutput, session_id: &str) -> Self {
        match output {
            DeviceOutput::Playback(indication) => Self::Outgoing(DeviceOutgoingMessage::Tts {
                state: indication.into(),
                session_id: Some(session_id.to_string()),
            }),
            DeviceOutput::Audio(opus) => Self::Audio(opus),
        }
    }
}
