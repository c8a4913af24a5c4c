//! Control message types and decoding.

use crate::errors::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire names of the five control message kinds.
pub const KNOWN_TYPES: [&str; 5] = ["userCall", "userJoin", "userLeave", "userVideo", "userAudio"];

/// Payload of a `userVideo` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoState {
    /// Number of the peer whose video changed.
    pub user: String,
    /// Enabled flag after the toggle.
    pub video: bool,
}

/// Payload of a `userAudio` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioState {
    /// Number of the peer whose audio changed.
    pub user: String,
    /// Enabled flag after the toggle.
    pub audio: bool,
}

/// A signaling message published on a peer's control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Reserved for call authentication. Carries no defined semantics.
    UserCall(Value),
    /// The sender (number in payload) wants to join the recipient's call or stream.
    UserJoin(String),
    /// The sender (number in payload) left.
    UserLeave(String),
    /// The sender toggled its video.
    UserVideo(VideoState),
    /// The sender toggled its audio.
    UserAudio(AudioState),
}

impl ControlMessage {
    /// Wire name of this message's kind.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            ControlMessage::UserCall(_) => "userCall",
            ControlMessage::UserJoin(_) => "userJoin",
            ControlMessage::UserLeave(_) => "userLeave",
            ControlMessage::UserVideo(_) => "userVideo",
            ControlMessage::UserAudio(_) => "userAudio",
        }
    }

    /// Encode to the JSON wire form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(value) => value,
            // Every variant holds JSON-representable data.
            Err(_) => Value::Null,
        }
    }
}

/// Result of decoding an inbound control-channel payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// One of the five known message kinds.
    Known(ControlMessage),
    /// A `type` this protocol does not define. Ignored by the engine.
    Unknown { kind: String },
}

/// Decode a control-channel payload.
///
/// Unknown `type` values are not an error. A missing `data` field is read as
/// `null`, which only the reserved `userCall` kind accepts.
///
/// # Errors
///
/// `ProtocolError::MissingType` when there is no string `type`, and
/// `ProtocolError::Malformed` when a known kind carries the wrong payload.
pub fn decode(payload: &Value) -> Result<Inbound, ProtocolError> {
    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    if !KNOWN_TYPES.contains(&kind) {
        return Ok(Inbound::Unknown {
            kind: kind.to_string(),
        });
    }

    let data = payload.get("data").cloned().unwrap_or(Value::Null);
    let normalized = serde_json::json!({ "type": kind, "data": data });

    serde_json::from_value(normalized)
        .map(Inbound::Known)
        .map_err(|source| ProtocolError::Malformed {
            kind: kind.to_string(),
            source,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            ControlMessage::UserJoin("555".to_string()).to_value(),
            json!({"type": "userJoin", "data": "555"})
        );
        assert_eq!(
            ControlMessage::UserVideo(VideoState {
                user: "555".to_string(),
                video: false,
            })
            .to_value(),
            json!({"type": "userVideo", "data": {"user": "555", "video": false}})
        );
        assert_eq!(
            ControlMessage::UserAudio(AudioState {
                user: "777".to_string(),
                audio: true,
            })
            .to_value(),
            json!({"type": "userAudio", "data": {"user": "777", "audio": true}})
        );
    }

    #[test]
    fn test_decode_known_kinds() {
        let decoded = decode(&json!({"type": "userLeave", "data": "555"})).unwrap();
        assert_eq!(
            decoded,
            Inbound::Known(ControlMessage::UserLeave("555".to_string()))
        );

        let decoded = decode(&json!({"type": "userAudio", "data": {"user": "1", "audio": false}}))
            .unwrap();
        assert!(matches!(
            decoded,
            Inbound::Known(ControlMessage::UserAudio(AudioState { ref user, audio: false })) if user == "1"
        ));
    }

    #[test]
    fn test_decode_user_call_without_data() {
        let decoded = decode(&json!({"type": "userCall"})).unwrap();
        assert_eq!(decoded, Inbound::Known(ControlMessage::UserCall(Value::Null)));
    }

    #[test]
    fn test_decode_unknown_kind_is_not_an_error() {
        let decoded = decode(&json!({"type": "userWave", "data": "555"})).unwrap();
        assert_eq!(
            decoded,
            Inbound::Unknown {
                kind: "userWave".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        assert!(matches!(
            decode(&json!({"data": "555"})),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            decode(&json!("userJoin")),
            Err(ProtocolError::MissingType)
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_payload_shape() {
        let err = decode(&json!({"type": "userVideo", "data": "555"})).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref kind, .. } if kind == "userVideo"));

        assert!(decode(&json!({"type": "userJoin"})).is_err());
    }

    #[test]
    fn test_type_names_match_wire_tags() {
        let messages = [
            ControlMessage::UserCall(Value::Null),
            ControlMessage::UserJoin("a".to_string()),
            ControlMessage::UserLeave("a".to_string()),
            ControlMessage::UserVideo(VideoState {
                user: "a".to_string(),
                video: true,
            }),
            ControlMessage::UserAudio(AudioState {
                user: "a".to_string(),
                audio: true,
            }),
        ];
        for message in messages {
            let value = message.to_value();
            assert_eq!(
                value.get("type").and_then(Value::as_str),
                Some(message.type_name())
            );
        }
    }
}
