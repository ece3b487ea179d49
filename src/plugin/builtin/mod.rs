//! Built-in Provider Registrations
//!
//! This module registers all built-in backend providers with the plugin
//! registry using the `inventory` crate.
//!
//! # Providers
//!
//! ## Backend Providers (1)
//! - ElevenLabs Conversational AI

use crate::core::backend::{BackendConfig, BackendError, BaseBackend, ElevenLabsBackend};
use crate::plugin::metadata::ProviderMetadata;
use crate::plugin::registry::PluginConstructor;

// ============================================================================
// Backend Provider Metadata Functions
// ============================================================================

fn elevenlabs_backend_metadata() -> ProviderMetadata {
    ProviderMetadata::new("elevenlabs", "ElevenLabs Conversational AI")
        .with_description("ElevenLabs Agents Platform over WebSocket with PCM 16kHz audio")
        .with_required_config(["api_key", "agent_id"])
        .with_optional_config(["signed_url", "base_url", "audio_format"])
        .with_features(["full-duplex", "user-activity", "interruption", "signed-url"])
}

// ============================================================================
// Backend Factory Functions
// ============================================================================

fn create_elevenlabs_backend(config: BackendConfig) -> Result<Box<dyn BaseBackend>, BackendError> {
    Ok(Box::new(ElevenLabsBackend::new(config)?))
}

// ============================================================================
// Backend Provider Registrations
// ============================================================================

inventory::submit! {
    PluginConstructor::backend("elevenlabs", elevenlabs_backend_metadata, create_elevenlabs_backend)
        .with_aliases(&["eleven_labs", "eleven-labs", "11labs"])
}
