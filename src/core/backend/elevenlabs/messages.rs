//! ElevenLabs Conversational AI WebSocket message types.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - conversation_initiation_client_data - Declare the PCM audio format
//! - user_audio_chunk - Base64 PCM from the user (no `type` field)
//! - user_activity - The user started speaking
//! - pong - Answer to a keepalive ping
//!
//! Server messages (received from server):
//! - conversation_initiation_metadata - Conversation id
//! - user_transcript - Recognized user utterance
//! - agent_response / agent_response_transcript - Agent utterance text
//! - interruption - Agent speech was interrupted
//! - audio - Base64 PCM from the agent
//! - ping - Keepalive; must be answered with a pong carrying the same event id

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::ElevenLabsAudioFormat;

// =============================================================================
// Client Messages (sent to server)
// =============================================================================

/// Messages sent to the ElevenLabs conversation endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClientEvent {
    /// User audio; this message has no `type` discriminant
    UserAudioChunk {
        /// Base64-encoded PCM
        user_audio_chunk: String,
    },

    /// Messages carrying a `type` discriminant
    Typed(TypedClientEvent),
}

/// Client messages with a `type` discriminant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedClientEvent {
    /// First message after connecting
    ConversationInitiationClientData {
        conversation_config_override: ConversationConfigOverride,
    },

    /// The user started speaking
    UserActivity,

    /// Answer to a keepalive ping
    Pong {
        /// Event id copied verbatim from the ping
        event_id: serde_json::Value,
    },
}

impl ClientEvent {
    /// Create an audio chunk message from raw PCM.
    pub fn audio_chunk(pcm: &[u8]) -> Self {
        ClientEvent::UserAudioChunk {
            user_audio_chunk: BASE64_STANDARD.encode(pcm),
        }
    }

    /// Create the initiation message declaring the same format both ways.
    pub fn initiation(format: ElevenLabsAudioFormat) -> Self {
        let audio = AudioFormatOverride {
            encoding: format.as_str().to_string(),
            sample_rate: format.sample_rate(),
        };
        ClientEvent::Typed(TypedClientEvent::ConversationInitiationClientData {
            conversation_config_override: ConversationConfigOverride {
                audio: AudioOverride {
                    input: audio.clone(),
                    output: audio,
                },
            },
        })
    }

    pub fn user_activity() -> Self {
        ClientEvent::Typed(TypedClientEvent::UserActivity)
    }

    pub fn pong(event_id: serde_json::Value) -> Self {
        ClientEvent::Typed(TypedClientEvent::Pong { event_id })
    }
}

/// Conversation overrides sent at initiation. Only audio is overridden.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationConfigOverride {
    pub audio: AudioOverride,
}

/// Input and output audio formats.
#[derive(Debug, Clone, Serialize)]
pub struct AudioOverride {
    pub input: AudioFormatOverride,
    pub output: AudioFormatOverride,
}

/// One direction's audio format.
#[derive(Debug, Clone, Serialize)]
pub struct AudioFormatOverride {
    pub encoding: String,
    pub sample_rate: u32,
}

// =============================================================================
// Server Messages (received from server)
// =============================================================================

/// Messages received from the ElevenLabs conversation endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Conversation established
    ConversationInitiationMetadata {
        #[serde(default)]
        conversation_initiation_metadata_event: InitiationMetadataEvent,
    },

    /// Recognized user utterance
    UserTranscript {
        #[serde(default)]
        user_transcription_event: UserTranscriptionEvent,
    },

    /// Agent utterance text
    AgentResponse {
        #[serde(default)]
        agent_response_event: AgentResponseEvent,
    },

    /// Agent utterance text, transcript flavor
    AgentResponseTranscript {
        #[serde(default)]
        agent_response_event: AgentResponseEvent,
    },

    /// Agent speech was interrupted
    Interruption,

    /// Agent audio
    Audio { audio_event: AudioEvent },

    /// Keepalive
    Ping {
        #[serde(default)]
        ping_event: PingEvent,
    },

    /// Any message type this client does not handle
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode base64 audio from an Audio event.
    pub fn decode_audio(audio_base_64: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(audio_base_64)
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitiationMetadataEvent {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
    #[serde(default)]
    pub user_input_audio_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserTranscriptionEvent {
    #[serde(default)]
    pub user_transcript: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentResponseEvent {
    #[serde(default)]
    pub agent_response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioEvent {
    #[serde(default)]
    pub audio_base_64: String,
    #[serde(default)]
    pub event_id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PingEvent {
    /// Correlation id; numeric or string depending on server version, null when absent
    #[serde(default)]
    pub event_id: serde_json::Value,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

/// Minimal view used to name unhandled message types in logs.
#[derive(Debug, Deserialize)]
pub struct MessageTypeHint {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audio_chunk_has_no_type_field() {
        let value = serde_json::to_value(ClientEvent::audio_chunk(&[0, 1, 2, 3])).unwrap();
        assert_eq!(value, json!({"user_audio_chunk": "AAECAw=="}));
    }

    #[test]
    fn test_initiation_serialization() {
        let value =
            serde_json::to_value(ClientEvent::initiation(ElevenLabsAudioFormat::Pcm16000)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "conversation_initiation_client_data",
                "conversation_config_override": {
                    "audio": {
                        "input": {"encoding": "pcm_16000", "sample_rate": 16000},
                        "output": {"encoding": "pcm_16000", "sample_rate": 16000}
                    }
                }
            })
        );
    }

    #[test]
    fn test_user_activity_and_pong_serialization() {
        assert_eq!(
            serde_json::to_value(ClientEvent::user_activity()).unwrap(),
            json!({"type": "user_activity"})
        );
        assert_eq!(
            serde_json::to_value(ClientEvent::pong(json!("abc"))).unwrap(),
            json!({"type": "pong", "event_id": "abc"})
        );
        assert_eq!(
            serde_json::to_value(ClientEvent::pong(json!(42))).unwrap(),
            json!({"type": "pong", "event_id": 42})
        );
    }

    #[test]
    fn test_server_event_deserialization() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv_1"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event,
            } => assert_eq!(
                conversation_initiation_metadata_event.conversation_id.as_deref(),
                Some("conv_1")
            ),
            other => panic!("Wrong event type: {other:?}"),
        }

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"user_transcript","user_transcription_event":{"user_transcript":"hello"}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ServerEvent::UserTranscript { user_transcription_event } if user_transcription_event.user_transcript == "hello"
        ));

        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"interruption","interruption_event":{"event_id":3}}"#)
                .unwrap();
        assert!(matches!(event, ServerEvent::Interruption));
    }

    #[test]
    fn test_agent_response_variants() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"agent_response_transcript","agent_response_event":{"agent_response":" hi "}}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::AgentResponseTranscript { .. }));

        let event: ServerEvent = serde_json::from_str(r#"{"type":"agent_response"}"#).unwrap();
        assert!(matches!(
            event,
            ServerEvent::AgentResponse { agent_response_event } if agent_response_event.agent_response.is_empty()
        ));
    }

    #[test]
    fn test_ping_keeps_event_id_verbatim() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"ping","ping_event":{"event_id":"abc","ping_ms":50}}"#)
                .unwrap();
        match event {
            ServerEvent::Ping { ping_event } => {
                assert_eq!(ping_event.event_id, json!("abc"));
                assert_eq!(ping_event.ping_ms, Some(50));
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_ping_without_event_id_still_parses() {
        for raw in [
            r#"{"type":"ping"}"#,
            r#"{"type":"ping","ping_event":{}}"#,
            r#"{"type":"ping","ping_event":{"ping_ms":20}}"#,
        ] {
            let event: ServerEvent = serde_json::from_str(raw).unwrap();
            match event {
                ServerEvent::Ping { ping_event } => assert!(ping_event.event_id.is_null()),
                other => panic!("Wrong event type for {raw}: {other:?}"),
            }
        }

        let pong = serde_json::to_value(ClientEvent::pong(serde_json::Value::Null)).unwrap();
        assert_eq!(pong, json!({"type": "pong", "event_id": null}));
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"vad_score","vad_score_event":{"vad_score":0.9}}"#)
                .unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn test_malformed_audio_is_an_error() {
        assert!(serde_json::from_str::<ServerEvent>(r#"{"type":"audio"}"#).is_err());
        assert!(serde_json::from_str::<ServerEvent>(r#"{"no_type":true}"#).is_err());
    }

    #[test]
    fn test_audio_decode() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"audio","audio_event":{"audio_base_64":"AAECAw==","event_id":1}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Audio { audio_event } => {
                let pcm = ServerEvent::decode_audio(&audio_event.audio_base_64).unwrap();
                assert_eq!(pcm, vec![0, 1, 2, 3]);
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_type_hint() {
        let monitor: MessageTypeHint = serde_json::from_str(r#"{"type":"vad_score"}"#).unwrap();
        assert_eq!(monitor.kind.as_deref(), Some("vad_score"));
    }
}
