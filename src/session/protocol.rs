//! JSON message protocol between a session and its peer.
//!
//! Outbound events are tagged by `type`; audio payloads travel as base64.
//! Inbound control frames use the same tagging; binary frames carry raw
//! PCM16 little-endian audio and are represented by [`InboundEvent::Audio`].

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};

/// Control commands sent by the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Begin listening
    Start,
    /// Stop listening; flush any utterance in progress
    Stop,
    /// Cancel playback or the turn in flight
    Interrupt,
    /// Liveness check, answered with `pong`
    Ping,
}

impl ClientCommand {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an inbound text frame. Malformed input is a protocol violation.
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| SessionError::Protocol {
            message: format!("unrecognized frame: {}", e),
        })
    }
}

/// Everything the transport layer can hand to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Binary frame: mono PCM16 little-endian audio
    Audio(Vec<u8>),
    /// Audio already normalized to [-1, 1]
    Samples(Vec<f32>),
    /// Unparsed text frame
    Text(String),
    /// Parsed control command
    Command(ClientCommand),
}

impl From<ClientCommand> for InboundEvent {
    fn from(command: ClientCommand) -> Self {
        InboundEvent::Command(command)
    }
}

/// Status values reported to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Connected,
    Listening,
    Processing,
    Speaking,
    Interrupted,
    Idle,
}

/// Events sent to the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Status {
        status: Status,
        message: String,
    },
    Backchannel {
        text: String,
    },
    Transcript {
        text: String,
    },
    AudioChunk {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(rename = "final")]
        is_final: bool,
    },
    StopAudio {
        reason: String,
    },
    Pong,
}

impl ServerEvent {
    pub fn status(status: Status, message: impl Into<String>) -> Self {
        ServerEvent::Status {
            status,
            message: message.into(),
        }
    }

    /// Status carried by this event, if it is a status event.
    pub fn as_status(&self) -> Option<Status> {
        match self {
            ServerEvent::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        assert_eq!(ClientCommand::Start.to_json().unwrap(), r#"{"type":"start"}"#);
        assert_eq!(
            ClientCommand::from_json(r#"{"type":"interrupt"}"#).unwrap(),
            ClientCommand::Interrupt
        );
        assert_eq!(
            ClientCommand::from_json(r#"{"type":"ping"}"#).unwrap(),
            ClientCommand::Ping
        );
    }

    #[test]
    fn test_malformed_command_is_protocol_violation() {
        for frame in ["not json", r#"{"type":"dance"}"#, r#"{"kind":"start"}"#, ""] {
            match ClientCommand::from_json(frame) {
                Err(SessionError::Protocol { .. }) => {}
                other => panic!("Expected Protocol error for {:?}, got {:?}", frame, other),
            }
        }
    }

    #[test]
    fn test_status_event_json() {
        let event = ServerEvent::status(Status::Interrupted, "User started speaking");
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"type":"status","status":"interrupted","message":"User started speaking"}"#
        );
        assert_eq!(event.as_status(), Some(Status::Interrupted));
    }

    #[test]
    fn test_audio_chunk_is_base64_with_final_flag() {
        let event = ServerEvent::AudioChunk {
            data: vec![0x00, 0x01, 0xff],
            is_final: true,
        };
        let json = event.to_json().unwrap();
        assert_eq!(json, r#"{"type":"audio_chunk","data":"AAH/","final":true}"#);
        assert_eq!(ServerEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn test_other_events_json() {
        assert_eq!(ServerEvent::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(
            ServerEvent::StopAudio {
                reason: "barge_in".into()
            }
            .to_json()
            .unwrap(),
            r#"{"type":"stop_audio","reason":"barge_in"}"#
        );
        assert_eq!(
            ServerEvent::Backchannel { text: "mhm".into() }.to_json().unwrap(),
            r#"{"type":"backchannel","text":"mhm"}"#
        );
        assert_eq!(ServerEvent::Pong.as_status(), None);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(ServerEvent::from_json(r#"{"type":"audio_chunk","data":"!!","final":false}"#).is_err());
    }
}
