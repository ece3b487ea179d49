use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// v2v:
///   enabled: true
///   provider: "elevenlabs"
///   api_key: "your-elevenlabs-key"
///   agent_id: "your-agent-id"
///   signed_url: "wss://api.elevenlabs.io/v1/convai/conversation?conversation_signature=..."
///   base_url: "wss://api.elevenlabs.io"
///   audio_format: "pcm_16000"
///   connect_timeout_secs: 10
///   interruption_threshold: 5
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub v2v: Option<V2VYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Voice-to-voice configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct V2VYaml {
    pub enabled: Option<bool>,
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    /// Pre-authorized conversation URL; replaces `agent_id`/`api_key` when set
    pub signed_url: Option<String>,
    pub base_url: Option<String>,
    pub audio_format: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub interruption_threshold: Option<u32>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: YamlConfig =
            serde_yaml::from_str(&contents).context("Failed to parse YAML config")?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

v2v:
  enabled: true
  provider: "11labs"
  api_key: "xi-test"
  agent_id: "agent_123"
  base_url: "ws://localhost:9000"
  audio_format: "pcm_16000"
  connect_timeout_secs: 3
  interruption_threshold: 7
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));

        let v2v = config.v2v.unwrap();
        assert_eq!(v2v.enabled, Some(true));
        assert_eq!(v2v.provider.as_deref(), Some("11labs"));
        assert_eq!(v2v.api_key.as_deref(), Some("xi-test"));
        assert_eq!(v2v.agent_id.as_deref(), Some("agent_123"));
        assert_eq!(v2v.signed_url, None);
        assert_eq!(v2v.base_url.as_deref(), Some("ws://localhost:9000"));
        assert_eq!(v2v.connect_timeout_secs, Some(3));
        assert_eq!(v2v.interruption_threshold, Some(7));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
v2v:
  signed_url: "wss://example.com/signed"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.server.is_none());

        let v2v = config.v2v.unwrap();
        assert_eq!(v2v.signed_url.as_deref(), Some("wss://example.com/signed"));
        assert!(v2v.enabled.is_none());
        assert!(v2v.api_key.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.v2v.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "server:\n  port: 4000\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(config.server.unwrap().port, Some(4000));
    }

    #[test]
    fn test_from_file_not_found() {
        let result = YamlConfig::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "server: [not: valid").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML config")
        );
    }
}
