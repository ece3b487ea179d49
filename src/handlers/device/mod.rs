//! Device voice-to-voice WebSocket handler
//!
//! # Protocol
//!
//! ## Device → Server
//!
//! - **hello**: Handshake with the device's audio parameters
//! - **listen**: `state` is `start`, `stop` or `detect`; optional `mode` and `text`
//! - **abort**: Stop agent playback
//! - **Binary frames**: One Opus packet (16 kHz, mono, 60 ms)
//!
//! ## Server → Device
//!
//! - **hello**: Session id and the audio parameters of agent playback
//! - **tts**: `state` is `start` or `stop`, bracketing agent audio
//! - **error**: Error message; the connection stays open
//! - **Binary frames**: Opus packets of agent audio, paced at playback speed

mod handler;
pub mod messages;

pub use handler::{DEVICE_ID_HEADER, device_handler};
