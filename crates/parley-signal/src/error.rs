//! Error types for the signaling engine.
//!
//! Every variant is recoverable: it is reported back to the client that caused
//! it, either as an `error` event on its connection or as a structured result
//! on the administrative surface. None of them tear down the process.

use thiserror::Error;

use crate::types::{CallId, RoomId, UserId};

/// Signaling errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The room already holds two members.
    #[error("Room {0} is full (at most 2 members)")]
    RoomFull(RoomId),

    /// The room does not exist.
    #[error("Room {0} does not exist")]
    RoomNotFound(RoomId),

    /// The user is not a member of any room.
    #[error("Not in a room")]
    NotInRoom,

    /// The user is already a member of this room.
    #[error("Already in room {0}")]
    AlreadyInRoom(RoomId),

    /// The user is engaged in a direct call and cannot take this action.
    #[error("User {0} is busy")]
    UserBusy(UserId),

    /// The user is not connected.
    #[error("User {0} is not connected")]
    UnknownUser(UserId),

    /// The call identifier is not pending.
    #[error("Call {0} does not exist")]
    CallNotFound(CallId),

    /// The call target is offline or not available.
    #[error("User {0} is offline or busy")]
    TargetUnavailable(UserId),

    /// An outbound event could not be handed to the user's transport.
    #[error("Delivery to {0} failed")]
    TransportDeliveryFailed(UserId),

    /// The inbound frame could not be understood.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A required field was absent or empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

impl SignalError {
    /// Create a new malformed message error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomFull(_) => "room_full",
            Self::RoomNotFound(_) => "room_not_found",
            Self::NotInRoom => "not_in_room",
            Self::AlreadyInRoom(_) => "already_in_room",
            Self::UserBusy(_) => "user_busy",
            Self::UnknownUser(_) => "unknown_user",
            Self::CallNotFound(_) => "call_not_found",
            Self::TargetUnavailable(_) => "target_unavailable",
            Self::TransportDeliveryFailed(_) => "transport_delivery_failed",
            Self::MalformedMessage(_) => "malformed_message",
            Self::MissingField(_) => "missing_field",
        }
    }

    /// Whether the failure is a missing resource (room or call) rather than a
    /// conflict with current state.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RoomNotFound(_) | Self::CallNotFound(_) | Self::UnknownUser(_)
        )
    }
}
