//! Conversational agent backends.
//!
//! A backend is the remote half of a voice-to-voice session: it receives the
//! user's PCM audio and returns agent audio plus turn-taking events.
//!
//! # Supported Providers
//!
//! - **ElevenLabs Conversational AI** - Agents Platform over WebSocket
//!
//! # Architecture
//!
//! - `BaseBackend` trait for provider abstraction
//! - `BackendEvents` as the lazy event sequence of one connection
//! - Factory functions delegating to the plugin registry

mod base;
pub mod elevenlabs;

pub use base::{
    BackendConfig, BackendError, BackendEvent, BackendEvents, BackendResult, BaseBackend,
    BoxedBackend, ConnectionState, DEFAULT_CONNECT_TIMEOUT_SECS,
};
pub use elevenlabs::ElevenLabsBackend;

/// Supported backend providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendProvider {
    /// ElevenLabs Conversational AI
    ElevenLabs,
}

impl BackendProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "elevenlabs" | "eleven_labs" | "eleven-labs" | "11labs" => {
                Some(BackendProvider::ElevenLabs)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendProvider::ElevenLabs => write!(f, "elevenlabs"),
        }
    }
}

/// Factory function to create a backend.
///
/// # Supported Providers
///
/// - `"elevenlabs"` / `"11labs"` - ElevenLabs Conversational AI
pub fn create_backend(provider_type: &str, config: BackendConfig) -> BackendResult<BoxedBackend> {
    crate::plugin::global_registry().create_backend(provider_type, config)
}

/// Create a backend from enum.
pub fn create_backend_from_enum(
    provider: BackendProvider,
    config: BackendConfig,
) -> BackendResult<BoxedBackend> {
    crate::plugin::global_registry().create_backend(&provider.to_string(), config)
}

/// Get list of supported backend providers.
pub fn get_supported_backends() -> Vec<String> {
    crate::plugin::global_registry().get_backend_provider_names()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_backend() {
        let config = BackendConfig {
            api_key: "test_key".to_string(),
            agent_id: "agent".to_string(),
            ..Default::default()
        };
        assert!(create_backend("elevenlabs", config.clone()).is_ok());
        assert!(create_backend("ELEVENLABS", config.clone()).is_ok());
        assert!(create_backend_from_enum(BackendProvider::ElevenLabs, config).is_ok());
    }

    #[test]
    fn test_invalid_backend_error_message() {
        match create_backend("invalid_provider", BackendConfig::default()) {
            Err(BackendError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("elevenlabs"));
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }

    #[test]
    fn test_get_supported_backends() {
        assert!(get_supported_backends().contains(&"elevenlabs".to_string()));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(
            BackendProvider::parse("ElevenLabs"),
            Some(BackendProvider::ElevenLabs)
        );
        assert_eq!(
            BackendProvider::parse("11labs"),
            Some(BackendProvider::ElevenLabs)
        );
        assert_eq!(BackendProvider::parse("openai"), None);
        assert_eq!(BackendProvider::ElevenLabs.to_string(), "elevenlabs");
    }
}
