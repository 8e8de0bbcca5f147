//! Parley signaling engine.
//!
//! Brokers connection metadata between clients that want to open a direct
//! peer-to-peer media session. Two rendezvous styles share one engine:
//!
//! - **Rooms**: two users join the same room code and are matched as soon as
//!   the second one arrives.
//! - **Direct calls**: an initiator invites a specific online user by id; the
//!   target accepts or rejects.
//!
//! The engine only relays opaque negotiation payloads (session descriptions,
//! ICE candidates). It never inspects media. All state is in memory and lost
//! on restart.
//!
//! The engine is transport agnostic: each connection hands
//! [`SessionRouter::connect`] the sender half of a bounded channel and feeds
//! inbound text frames to [`SessionRouter::handle_frame`].

pub mod call;
pub mod error;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod router;
pub mod types;

pub use call::{CallCoordinator, Resolution};
pub use error::SignalError;
pub use presence::PresenceTracker;
pub use protocol::{InboundMessage, JoinReport, OutboundEvent, Spelling};
pub use registry::{ConnectionRegistry, SendResult};
pub use room::{JoinOutcome, RoomCoordinator, RoomSummary, MAX_ROOM_MEMBERS};
pub use router::{RouterOptions, RouterStats, SessionRouter, SweepReport};
pub use types::{CallId, ConnectionId, Delivery, Payload, RoomId, UserId, UserStatus};
