//! Configuration module for the V2V gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use v2v_gateway::config::ServerConfig;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(Path::new("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, bail};

use crate::core::backend::{BackendConfig, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::core::relay::{DEFAULT_INTERRUPTION_THRESHOLD, SessionSettings};

mod yaml;

pub use yaml::{ServerYaml, V2VYaml, YamlConfig};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_PROVIDER: &str = "elevenlabs";
const DEFAULT_AUDIO_FORMAT: &str = "pcm_16000";

/// Voice-to-voice backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2VConfig {
    /// Route device audio to the agent backend
    pub enabled: bool,
    /// Registry id of the backend provider
    pub provider: String,
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    /// Pre-authorized conversation URL, used verbatim when set
    pub signed_url: Option<String>,
    /// Override of the provider's WebSocket base URL
    pub base_url: Option<String>,
    pub audio_format: String,
    pub connect_timeout_secs: u64,
    /// Inbound chunks before a user is treated as talking over the agent
    pub interruption_threshold: u32,
}

impl Default for V2VConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: DEFAULT_PROVIDER.to_string(),
            api_key: None,
            agent_id: None,
            signed_url: None,
            base_url: None,
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            interruption_threshold: DEFAULT_INTERRUPTION_THRESHOLD,
        }
    }
}

/// Implement Drop to zeroize secret fields when V2VConfig is dropped.
impl Drop for V2VConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
        if let Some(ref mut url) = self.signed_url {
            url.zeroize();
        }
    }
}

impl V2VConfig {
    /// Provider-neutral backend configuration for this section.
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            provider: self.provider.clone(),
            api_key: self.api_key.clone().unwrap_or_default(),
            agent_id: self.agent_id.clone().unwrap_or_default(),
            signed_url: self.signed_url.clone(),
            base_url: self.base_url.clone(),
            audio_format: self.audio_format.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }

    /// Relay settings for sessions created from this section.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            v2v_enabled: self.enabled,
            interruption_threshold: self.interruption_threshold,
            ..SessionSettings::default()
        }
    }

    /// Whether enough credentials are present to open a conversation.
    pub fn has_credentials(&self) -> bool {
        self.signed_url.is_some() || (self.api_key.is_some() && self.agent_id.is_some())
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Some(enabled) = env_bool("V2V_ENABLED")? {
            self.enabled = enabled;
        }
        if let Some(provider) = env_string("V2V_PROVIDER") {
            self.provider = provider;
        }
        if let Some(key) = env_string("ELEVENLABS_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(agent) = env_string("ELEVENLABS_AGENT_ID") {
            self.agent_id = Some(agent);
        }
        if let Some(url) = env_string("ELEVENLABS_SIGNED_URL") {
            self.signed_url = Some(url);
        }
        if let Some(url) = env_string("ELEVENLABS_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Some(format) = env_string("V2V_AUDIO_FORMAT") {
            self.audio_format = format;
        }
        if let Some(secs) = env_parse("V2V_CONNECT_TIMEOUT_SECS")? {
            self.connect_timeout_secs = secs;
        }
        if let Some(threshold) = env_parse("V2V_INTERRUPTION_THRESHOLD")? {
            self.interruption_threshold = threshold;
        }
        Ok(())
    }

    fn apply_yaml(&mut self, yaml: V2VYaml) {
        if let Some(enabled) = yaml.enabled {
            self.enabled = enabled;
        }
        if let Some(provider) = non_empty(yaml.provider) {
            self.provider = provider;
        }
        if let Some(key) = non_empty(yaml.api_key) {
            self.api_key = Some(key);
        }
        if let Some(agent) = non_empty(yaml.agent_id) {
            self.agent_id = Some(agent);
        }
        if let Some(url) = non_empty(yaml.signed_url) {
            self.signed_url = Some(url);
        }
        if let Some(url) = non_empty(yaml.base_url) {
            self.base_url = Some(url);
        }
        if let Some(format) = non_empty(yaml.audio_format) {
            self.audio_format = format;
        }
        if let Some(secs) = yaml.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(threshold) = yaml.interruption_threshold {
            self.interruption_threshold = threshold;
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub v2v: V2VConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            v2v: V2VConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables over defaults.
    ///
    /// The .env file is loaded into the environment by `main` before this runs,
    /// so real environment variables take precedence over it.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(host) = env_string("HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse("PORT")? {
            config.port = port;
        }
        config.v2v.apply_env()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = Self::from_env()?;

        if let Some(server) = yaml.server {
            if let Some(host) = non_empty(server.host) {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
        }
        if let Some(v2v) = yaml.v2v {
            config.v2v.apply_yaml(v2v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the server address as a string ("host:port")
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.v2v.connect_timeout_secs == 0 {
            bail!("V2V connect timeout must be greater than zero");
        }
        if self.v2v.interruption_threshold == 0 {
            bail!("V2V interruption threshold must be greater than zero");
        }
        // Device frames are 16 kHz PCM and are relayed without resampling
        if !self.v2v.audio_format.trim().eq_ignore_ascii_case(DEFAULT_AUDIO_FORMAT) {
            bail!(
                "Unsupported V2V audio format '{}' (only {DEFAULT_AUDIO_FORMAT} is supported)",
                self.v2v.audio_format
            );
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_string(name: &str) -> Option<String> {
    non_empty(env::var(name).ok())
}

fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display + Send + Sync + std::error::Error + 'static,
{
    env_string(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {name}: '{raw}'"))
        })
        .transpose()
}

fn env_bool(name: &str) -> anyhow::Result<Option<bool>> {
    let Some(raw) = env_string(name) else {
        return Ok(None);
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => bail!("Invalid value for {name}: '{raw}' (expected true/false)"),
    }
}
