//! ElevenLabs Conversational AI configuration types.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::backend::base::{BackendConfig, BackendError, BackendResult};

/// Default ElevenLabs WebSocket host.
pub const ELEVENLABS_WS_BASE_URL: &str = "wss://api.elevenlabs.io";

/// Conversation endpoint path on the ElevenLabs host.
pub const ELEVENLABS_CONVERSATION_PATH: &str = "/v1/convai/conversation";

// =============================================================================
// Audio Formats
// =============================================================================

/// PCM encoding negotiated with the conversation endpoint.
///
/// Device frames are 16 kHz and nothing resamples between the two sides, so
/// this is the only encoding the relay can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ElevenLabsAudioFormat {
    /// 16-bit PCM at 16kHz
    #[default]
    #[serde(rename = "pcm_16000")]
    Pcm16000,
}

impl ElevenLabsAudioFormat {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16000 => "pcm_16000",
        }
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Pcm16000 => 16000,
        }
    }

    /// Parse a configured format name. Anything the relay cannot frame is rejected.
    pub fn parse(s: &str) -> BackendResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "pcm_16000" => Ok(Self::Pcm16000),
            other => Err(BackendError::InvalidConfiguration(format!(
                "unsupported audio_format '{other}', only pcm_16000 matches the 16kHz device framing"
            ))),
        }
    }
}

impl std::fmt::Display for ElevenLabsAudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Connection Settings
// =============================================================================

/// ElevenLabs-specific view of a [`BackendConfig`].
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub agent_id: String,
    pub signed_url: Option<String>,
    pub base_url: String,
    pub audio_format: ElevenLabsAudioFormat,
    pub connect_timeout_secs: u64,
}

impl ElevenLabsConfig {
    pub fn from_backend_config(config: &BackendConfig) -> BackendResult<Self> {
        Ok(Self {
            api_key: config.api_key.clone(),
            agent_id: config.agent_id.clone(),
            signed_url: config.signed_url.clone().filter(|u| !u.is_empty()),
            base_url: config
                .base_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| ELEVENLABS_WS_BASE_URL.to_string()),
            audio_format: ElevenLabsAudioFormat::parse(&config.audio_format)?,
            connect_timeout_secs: config.connect_timeout_secs,
        })
    }

    /// Whether enough is configured to attempt a connection.
    pub fn is_complete(&self) -> bool {
        self.signed_url.is_some() || (!self.api_key.is_empty() && !self.agent_id.is_empty())
    }

    /// Build the WebSocket URL. A signed URL is used verbatim.
    pub fn websocket_url(&self) -> BackendResult<Url> {
        if let Some(signed) = &self.signed_url {
            return Url::parse(signed)
                .map_err(|e| BackendError::InvalidConfiguration(format!("signed_url: {e}")));
        }

        if !self.is_complete() {
            return Err(BackendError::InvalidConfiguration(
                "ElevenLabs requires api_key and agent_id, or signed_url".to_string(),
            ));
        }

        let base = self.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{ELEVENLABS_CONVERSATION_PATH}"))
            .map_err(|e| BackendError::InvalidConfiguration(format!("base_url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("agent_id", &self.agent_id)
            .append_pair("api_key", &self.api_key);
        Ok(url)
    }
}
