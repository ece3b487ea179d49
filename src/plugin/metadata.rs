//! Provider Metadata Types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Provider metadata for discovery and documentation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Provider identifier (e.g., "elevenlabs")
    pub name: String,

    /// Display name (e.g., "ElevenLabs Conversational AI")
    pub display_name: String,

    /// Brief description
    pub description: String,

    /// Version string
    pub version: String,

    /// Required configuration keys (for validation)
    pub required_config_keys: Vec<String>,

    /// Optional configuration keys
    pub optional_config_keys: Vec<String>,

    /// Provider aliases (e.g., ["11labs"])
    pub aliases: Vec<String>,

    /// Provider features (e.g., "interruption", "signed-url")
    #[serde(default)]
    pub features: HashSet<String>,
}

impl ProviderMetadata {
    /// Create new provider metadata with minimal required fields
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            version: "1.0.0".to_string(),
            required_config_keys: vec!["api_key".to_string()],
            ..Default::default()
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add multiple aliases
    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Set required config keys
    pub fn with_required_config(
        mut self,
        keys: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.required_config_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set optional config keys
    pub fn with_optional_config(
        mut self,
        keys: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.optional_config_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Add multiple features
    pub fn with_features(mut self, features: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }
}
