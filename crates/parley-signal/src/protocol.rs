//! Wire protocol: inbound client messages and outbound events.
//!
//! Frames are JSON objects discriminated by a `type` field. Two client
//! conventions coexist on the same socket (room pairing and direct calls), so
//! several message kinds accept both a dashed and an underscored spelling.
//! Relayed ICE candidates keep the spelling the sender used.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SignalError;
use crate::types::{CallId, Payload, RoomId, UserId, UserStatus};

/// Which spelling of a message type the client used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spelling {
    /// `ice-candidate`
    #[default]
    Dashed,
    /// `ice_candidate`
    Underscored,
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Join (or create) a room, optionally carrying an offer.
    JoinRoom { room_id: RoomId, offer: Payload },
    /// Leave the current room.
    LeaveRoom,
    /// Session description offer.
    Offer {
        offer: Payload,
        target: Option<UserId>,
    },
    /// Session description answer; with a `call_id` it accepts a direct call.
    Answer {
        answer: Payload,
        call_id: Option<CallId>,
        target: Option<UserId>,
    },
    /// Connectivity candidate.
    IceCandidate {
        candidate: Payload,
        target: Option<UserId>,
        spelling: Spelling,
    },
    /// Place a direct call.
    CallUser { target: UserId, offer: Payload },
    /// Decline a pending direct call.
    RejectCall { call_id: CallId },
    /// End an accepted direct call.
    HangUp,
}

#[derive(Debug, Deserialize)]
struct JoinRoomBody {
    #[serde(default, alias = "roomId")]
    room_id: Option<String>,
    #[serde(default)]
    offer: Payload,
}

#[derive(Debug, Deserialize)]
struct OfferBody {
    #[serde(default)]
    offer: Payload,
    #[serde(default)]
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerBody {
    #[serde(default)]
    answer: Payload,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IceCandidateBody {
    #[serde(default)]
    candidate: Payload,
    #[serde(default)]
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallUserBody {
    #[serde(default, alias = "to")]
    target: Option<String>,
    #[serde(default)]
    offer: Payload,
}

#[derive(Debug, Deserialize)]
struct RejectCallBody {
    #[serde(default)]
    call_id: Option<String>,
}

impl InboundMessage {
    /// Parse a text frame.
    ///
    /// Returns `MalformedMessage` for frames that should be logged and ignored
    /// and `MissingField` for recognizable messages lacking a required field,
    /// which the client is told about.
    pub fn parse(frame: &str) -> Result<Self, SignalError> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| SignalError::malformed(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Classify an already decoded JSON object.
    pub fn from_value(value: Value) -> Result<Self, SignalError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SignalError::malformed("missing \"type\" field"))?
            .to_string();

        match kind.as_str() {
            "join-room" | "join_room" => {
                let body: JoinRoomBody = decode(value)?;
                let room_id = required(body.room_id, "room_id")?;
                Ok(Self::JoinRoom {
                    room_id: RoomId::from(room_id),
                    offer: body.offer,
                })
            }
            "leave-room" | "leave_room" => Ok(Self::LeaveRoom),
            "offer" => {
                let body: OfferBody = decode(value)?;
                Ok(Self::Offer {
                    offer: body.offer,
                    target: optional(body.target).map(UserId::from),
                })
            }
            "answer" => {
                let body: AnswerBody = decode(value)?;
                Ok(Self::Answer {
                    answer: body.answer,
                    call_id: optional(body.call_id).map(CallId::from),
                    target: optional(body.target).map(UserId::from),
                })
            }
            "ice-candidate" | "ice_candidate" => {
                let body: IceCandidateBody = decode(value)?;
                let spelling = if kind == "ice_candidate" {
                    Spelling::Underscored
                } else {
                    Spelling::Dashed
                };
                Ok(Self::IceCandidate {
                    candidate: body.candidate,
                    target: optional(body.target).map(UserId::from),
                    spelling,
                })
            }
            "call-user" | "call_user" => {
                let body: CallUserBody = decode(value)?;
                let target = required(body.target, "target")?;
                Ok(Self::CallUser {
                    target: UserId::from(target),
                    offer: body.offer,
                })
            }
            "reject-call" | "reject_call" => {
                let body: RejectCallBody = decode(value)?;
                let call_id = required(body.call_id, "call_id")?;
                Ok(Self::RejectCall {
                    call_id: CallId::from(call_id),
                })
            }
            "hang-up" | "hangup" | "hang_up" => Ok(Self::HangUp),
            other => Err(SignalError::malformed(format!(
                "unrecognized message type \"{}\"",
                other
            ))),
        }
    }

    /// Wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::CallUser { .. } => "call-user",
            Self::RejectCall { .. } => "reject-call",
            Self::HangUp => "hang-up",
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, SignalError> {
    serde_json::from_value(value).map_err(|e| SignalError::malformed(e.to_string()))
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn required(value: Option<String>, field: &'static str) -> Result<String, SignalError> {
    optional(value).ok_or(SignalError::MissingField(field))
}

/// Outcome fields reported to a joiner in a `room-joined` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinReport {
    pub success: bool,
    pub room_id: RoomId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user_count: usize,
    pub other_users: Vec<UserId>,
    pub is_room_full: bool,
    pub matched: bool,
    pub waiting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<UserId>,
}

impl JoinReport {
    /// Report for a rejected join.
    pub fn failed(room_id: RoomId, err: &SignalError) -> Self {
        Self {
            success: false,
            room_id,
            message: Some(err.to_string()),
            user_count: 0,
            other_users: Vec::new(),
            is_room_full: matches!(err, SignalError::RoomFull(_)),
            matched: false,
            waiting: false,
            peer_id: None,
        }
    }
}

/// Events pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "user_status")]
    UserStatus { user_id: UserId, status: UserStatus },

    #[serde(rename = "room_matched")]
    RoomMatched {
        room_id: RoomId,
        peer_id: UserId,
        peer_offer: Payload,
    },

    #[serde(rename = "peer_left")]
    PeerLeft { user_id: UserId, room_id: RoomId },

    #[serde(rename = "room-joined")]
    RoomJoined(JoinReport),

    #[serde(rename = "user-joined")]
    UserJoined { user_id: UserId, message: String },

    #[serde(rename = "user-left")]
    UserLeft { user_id: UserId, message: String },

    #[serde(rename = "offer")]
    Offer { from: UserId, offer: Payload },

    #[serde(rename = "answer")]
    Answer { from: UserId, answer: Payload },

    #[serde(rename = "ice-candidate")]
    IceCandidate { from: UserId, candidate: Payload },

    #[serde(rename = "ice_candidate")]
    IceCandidateUnderscored { from: UserId, candidate: Payload },

    #[serde(rename = "incoming_call")]
    IncomingCall {
        call_id: CallId,
        from: UserId,
        offer: Payload,
    },

    #[serde(rename = "call_placed")]
    CallPlaced { call_id: CallId, to: UserId },

    #[serde(rename = "call_accepted")]
    CallAccepted {
        call_id: CallId,
        from: UserId,
        answer: Payload,
    },

    #[serde(rename = "call_rejected")]
    CallRejected { call_id: CallId, from: UserId },

    #[serde(rename = "call_cancelled")]
    CallCancelled { call_id: CallId, from: UserId },

    #[serde(rename = "call_ended")]
    CallEnded { call_id: CallId, from: UserId },

    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<&'static str>,
    },

    #[serde(rename = "rooms-reset")]
    RoomsReset { message: String },

    #[serde(rename = "room-reset")]
    RoomReset { room_id: RoomId, message: String },
}

impl OutboundEvent {
    /// Build an `error` event from a signaling error.
    pub fn error(err: &SignalError) -> Self {
        Self::Error {
            message: err.to_string(),
            code: Some(err.code()),
        }
    }

    /// Build an ICE candidate relay in the sender's spelling.
    pub fn ice_candidate(from: UserId, candidate: Payload, spelling: Spelling) -> Self {
        match spelling {
            Spelling::Dashed => Self::IceCandidate { from, candidate },
            Spelling::Underscored => Self::IceCandidateUnderscored { from, candidate },
        }
    }

    /// Wire name of the event type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserStatus { .. } => "user_status",
            Self::RoomMatched { .. } => "room_matched",
            Self::PeerLeft { .. } => "peer_left",
            Self::RoomJoined(_) => "room-joined",
            Self::UserJoined { .. } => "user-joined",
            Self::UserLeft { .. } => "user-left",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::IceCandidateUnderscored { .. } => "ice_candidate",
            Self::IncomingCall { .. } => "incoming_call",
            Self::CallPlaced { .. } => "call_placed",
            Self::CallAccepted { .. } => "call_accepted",
            Self::CallRejected { .. } => "call_rejected",
            Self::CallCancelled { .. } => "call_cancelled",
            Self::CallEnded { .. } => "call_ended",
            Self::Error { .. } => "error",
            Self::RoomsReset { .. } => "rooms-reset",
            Self::RoomReset { .. } => "room-reset",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_room() {
        let msg = InboundMessage::parse(r#"{"type":"join-room","room_id":"r1","offer":{"sdp":"A"}}"#)
            .unwrap();
        assert_eq!(
            msg,
            InboundMessage::JoinRoom {
                room_id: RoomId::from("r1"),
                offer: json!({"sdp": "A"}),
            }
        );
    }

    #[test]
    fn test_parse_join_room_without_offer() {
        let msg = InboundMessage::parse(r#"{"type":"join-room","room_id":"r1"}"#).unwrap();
        assert!(matches!(msg, InboundMessage::JoinRoom { offer: Value::Null, .. }));
    }

    #[test]
    fn test_parse_join_room_empty_id_is_missing_field() {
        let err = InboundMessage::parse(r#"{"type":"join-room","room_id":""}"#).unwrap_err();
        assert_eq!(err, SignalError::MissingField("room_id"));
    }

    #[test]
    fn test_parse_answer_with_call_id() {
        let msg = InboundMessage::parse(
            r#"{"type":"answer","call_id":"c-1","answer":{"sdp":"B","type":"answer"}}"#,
        )
        .unwrap();
        match msg {
            InboundMessage::Answer {
                call_id, target, ..
            } => {
                assert_eq!(call_id, Some(CallId::from("c-1")));
                assert!(target.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ice_candidate_spellings() {
        let dashed =
            InboundMessage::parse(r#"{"type":"ice-candidate","candidate":"c"}"#).unwrap();
        let underscored =
            InboundMessage::parse(r#"{"type":"ice_candidate","candidate":"c","target":"bob"}"#)
                .unwrap();

        assert!(matches!(
            dashed,
            InboundMessage::IceCandidate { spelling: Spelling::Dashed, target: None, .. }
        ));
        match underscored {
            InboundMessage::IceCandidate {
                spelling, target, ..
            } => {
                assert_eq!(spelling, Spelling::Underscored);
                assert_eq!(target, Some(UserId::from("bob")));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_call_user_accepts_to_alias() {
        let msg = InboundMessage::parse(r#"{"type":"call_user","to":"bob","offer":{}}"#).unwrap();
        assert!(matches!(msg, InboundMessage::CallUser { ref target, .. } if target.as_str() == "bob"));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err = InboundMessage::parse(r#"{"type":"dance"}"#).unwrap_err();
        assert_eq!(err.code(), "malformed_message");
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = InboundMessage::parse("{not json").unwrap_err();
        assert!(matches!(err, SignalError::MalformedMessage(_)));
    }

    #[test]
    fn test_parse_rejects_missing_type() {
        let err = InboundMessage::parse(r#"{"room_id":"r1"}"#).unwrap_err();
        assert!(matches!(err, SignalError::MalformedMessage(_)));
    }

    #[test]
    fn test_room_matched_serialization() {
        let event = OutboundEvent::RoomMatched {
            room_id: RoomId::from("r1"),
            peer_id: UserId::from("alice"),
            peer_offer: json!({"sdp": "A"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "room_matched",
                "room_id": "r1",
                "peer_id": "alice",
                "peer_offer": {"sdp": "A"}
            })
        );
    }

    #[test]
    fn test_room_joined_flattens_report() {
        let report = JoinReport::failed(RoomId::from("r1"), &SignalError::RoomFull(RoomId::from("r1")));
        let value = serde_json::to_value(OutboundEvent::RoomJoined(report)).unwrap();
        assert_eq!(value["type"], "room-joined");
        assert_eq!(value["success"], false);
        assert_eq!(value["is_room_full"], true);
        assert!(value.get("peer_id").is_none());
    }

    #[test]
    fn test_ice_candidate_keeps_spelling() {
        let event = OutboundEvent::ice_candidate(
            UserId::from("alice"),
            json!("candidate:1"),
            Spelling::Underscored,
        );
        assert_eq!(event.kind(), "ice_candidate");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ice_candidate");
        assert_eq!(value["from"], "alice");
    }

    #[test]
    fn test_error_event_carries_code() {
        let event = OutboundEvent::error(&SignalError::NotInRoom);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "Not in a room", "code": "not_in_room"}));
    }
}
