//! Common types for the signaling engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::OutboundEvent;

/// Opaque negotiation payload (SDP offer/answer, ICE candidate).
///
/// Relayed verbatim; `Value::Null` stands for "no payload".
pub type Payload = serde_json::Value;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Externally supplied user identifier, taken from the connection path.
    UserId
);
string_id!(
    /// Caller-supplied room code.
    RoomId
);
string_id!(
    /// Server-generated direct call identifier.
    CallId
);

impl CallId {
    /// Allocate a fresh, globally unique call identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Identifies one specific transport connection of a user.
///
/// A user reconnecting gets a new id; cleanup keyed on the old id must not
/// touch the new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// User availability as seen by other users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Connected and free
    Online,
    /// Paired in a full room or an accepted call
    Busy,
    /// Placed a direct call that is not yet answered
    Calling,
    /// Has an unanswered incoming direct call
    ReceivingCall,
    /// Not connected
    Offline,
}

impl UserStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "online",
            UserStatus::Busy => "busy",
            UserStatus::Calling => "calling",
            UserStatus::ReceivingCall => "receiving_call",
            UserStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound event addressed to one user.
///
/// Coordinators produce these while holding their locks; the router hands them
/// to the connection registry afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Recipient
    pub to: UserId,
    /// Event to deliver
    pub event: OutboundEvent,
}

impl Delivery {
    /// Create a new delivery.
    pub fn new(to: UserId, event: OutboundEvent) -> Self {
        Self { to, event }
    }
}
