//! Room Coordinator
//!
//! Pairs two users that share a room code. A room is created by its first
//! join, triggers a match on its second join, and is deleted as soon as its
//! last member leaves.
//!
//! Membership changes for one room run under that room's DashMap entry guard,
//! so the size check, the append and the match notification form a single
//! step: a room can go from waiting to matched only once, and a third join
//! sees a full room.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::SignalError;
use crate::presence::PresenceTracker;
use crate::protocol::{JoinReport, OutboundEvent};
use crate::types::{Delivery, Payload, RoomId, UserId, UserStatus};

/// Maximum number of members in a room.
pub const MAX_ROOM_MEMBERS: usize = 2;

/// A room member and the payload it joined with.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub user_id: UserId,
    pub payload: Payload,
}

/// A rendezvous room holding at most two members.
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: RoomId,
    pub members: Vec<RoomMember>,
    pub created_at: DateTime<Utc>,
    /// When the room last dropped to a single member
    waiting_since: Instant,
}

impl Room {
    fn new(room_id: RoomId, first: RoomMember) -> Self {
        Self {
            room_id,
            members: vec![first],
            created_at: Utc::now(),
            waiting_since: Instant::now(),
        }
    }

    fn position(&self, user_id: &UserId) -> Option<usize> {
        self.members.iter().position(|m| &m.user_id == user_id)
    }

    fn member_ids(&self) -> Vec<UserId> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }

    fn is_full(&self) -> bool {
        self.members.len() >= MAX_ROOM_MEMBERS
    }

    fn waiting_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.members.len() == 1 && now.saturating_duration_since(self.waiting_since) >= timeout
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// First member; waiting for a peer
    Waiting,
    /// Second member; paired with the given peer
    Matched(UserId),
}

/// A successful join and the notifications it produced.
#[derive(Debug, Clone)]
pub struct Joined {
    pub room_id: RoomId,
    pub outcome: JoinOutcome,
    /// Members after the join, in join order
    pub members: Vec<UserId>,
    /// `room_matched` notifications for both members, empty while waiting
    pub deliveries: Vec<Delivery>,
}

impl Joined {
    /// Outcome fields for the joiner's `room-joined` event.
    pub fn report(&self, joiner: &UserId) -> JoinReport {
        let peer_id = match &self.outcome {
            JoinOutcome::Matched(peer) => Some(peer.clone()),
            JoinOutcome::Waiting => None,
        };
        JoinReport {
            success: true,
            room_id: self.room_id.clone(),
            message: None,
            user_count: self.members.len(),
            other_users: self
                .members
                .iter()
                .filter(|m| *m != joiner)
                .cloned()
                .collect(),
            is_room_full: self.members.len() == MAX_ROOM_MEMBERS,
            matched: peer_id.is_some(),
            waiting: peer_id.is_none(),
            peer_id,
        }
    }
}

/// Room listing entry for the administrative surface.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub users: Vec<UserId>,
    pub user_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Owns room lifecycle.
#[derive(Debug)]
pub struct RoomCoordinator {
    rooms: DashMap<RoomId, Room>,
    presence: Arc<PresenceTracker>,
}

impl RoomCoordinator {
    pub fn new(presence: Arc<PresenceTracker>) -> Self {
        Self {
            rooms: DashMap::new(),
            presence,
        }
    }

    /// Add a user to a room, creating it if absent.
    ///
    /// The user must not currently belong to any room; switching rooms is a
    /// `leave` followed by a `join`.
    #[instrument(skip(self, payload), fields(user_id = %user_id, room_id = %room_id))]
    pub fn join(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        payload: Payload,
    ) -> Result<Joined, SignalError> {
        let member = RoomMember {
            user_id: user_id.clone(),
            payload,
        };

        match self.rooms.entry(room_id.clone()) {
            Entry::Vacant(vacant) => {
                self.presence.enter_room(user_id, room_id)?;
                vacant.insert(Room::new(room_id.clone(), member));
                info!("Created room, waiting for a peer");
                Ok(Joined {
                    room_id: room_id.clone(),
                    outcome: JoinOutcome::Waiting,
                    members: vec![user_id.clone()],
                    deliveries: Vec::new(),
                })
            }
            Entry::Occupied(mut occupied) => {
                let room = occupied.get_mut();
                if room.position(user_id).is_some() {
                    return Err(SignalError::AlreadyInRoom(room_id.clone()));
                }
                if room.is_full() {
                    debug!("Room is full");
                    return Err(SignalError::RoomFull(room_id.clone()));
                }
                self.presence.enter_room(user_id, room_id)?;

                // Non-empty and not full: this join is the second one.
                let first = room.members[0].clone();
                let offer = member.payload.clone();
                room.members.push(member);

                self.presence
                    .set_pair_status(&first.user_id, user_id, UserStatus::Busy);

                let deliveries = vec![
                    Delivery::new(
                        user_id.clone(),
                        OutboundEvent::RoomMatched {
                            room_id: room_id.clone(),
                            peer_id: first.user_id.clone(),
                            peer_offer: first.payload,
                        },
                    ),
                    Delivery::new(
                        first.user_id.clone(),
                        OutboundEvent::RoomMatched {
                            room_id: room_id.clone(),
                            peer_id: user_id.clone(),
                            peer_offer: offer,
                        },
                    ),
                ];

                info!(peer_id = %first.user_id, "Room matched");
                Ok(Joined {
                    room_id: room_id.clone(),
                    outcome: JoinOutcome::Matched(first.user_id),
                    members: room.member_ids(),
                    deliveries,
                })
            }
        }
    }

    /// Remove a user from a room.
    ///
    /// Remaining members are told the peer left and become available again.
    /// The room is deleted when it empties. Leaving a room the user is not a
    /// member of is a no-op.
    #[instrument(skip(self), fields(user_id = %user_id, room_id = %room_id))]
    pub fn leave(&self, user_id: &UserId, room_id: &RoomId) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        if let Entry::Occupied(mut occupied) = self.rooms.entry(room_id.clone()) {
            let room = occupied.get_mut();
            if let Some(index) = room.position(user_id) {
                room.members.remove(index);
                self.presence.leave_room(user_id, room_id);

                for member in &room.members {
                    self.presence.unpair(&member.user_id, room_id);
                    deliveries.push(Delivery::new(
                        member.user_id.clone(),
                        OutboundEvent::PeerLeft {
                            user_id: user_id.clone(),
                            room_id: room_id.clone(),
                        },
                    ));
                    deliveries.push(Delivery::new(
                        member.user_id.clone(),
                        OutboundEvent::UserLeft {
                            user_id: user_id.clone(),
                            message: format!("User {} left the room", user_id),
                        },
                    ));
                }

                if room.members.is_empty() {
                    occupied.remove();
                    info!("Deleted empty room");
                } else {
                    room.waiting_since = Instant::now();
                    debug!("Left room");
                }
            } else {
                debug!("User is not a member of this room");
            }
        }

        // Clears a reference left behind by a concurrent reset or expiry.
        self.presence.leave_room(user_id, room_id);
        deliveries
    }

    /// The other member of a room, if present.
    pub fn peer_of(&self, room_id: &RoomId, user_id: &UserId) -> Option<UserId> {
        self.rooms.get(room_id).and_then(|room| {
            room.members
                .iter()
                .find(|m| &m.user_id != user_id)
                .map(|m| m.user_id.clone())
        })
    }

    /// Current members of a room.
    #[cfg(test)]
    pub fn members(&self, room_id: &RoomId) -> Option<Vec<UserId>> {
        self.rooms.get(room_id).map(|room| room.member_ids())
    }

    /// Check if a room exists.
    #[cfg(test)]
    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Get the number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Snapshot of every room.
    pub fn list(&self) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .map(|entry| {
                let room = entry.value();
                RoomSummary {
                    room_id: room.room_id.clone(),
                    users: room.member_ids(),
                    user_count: room.members.len(),
                    created_at: room.created_at,
                }
            })
            .collect()
    }

    /// Delete every room and clear its members' room references.
    ///
    /// Returns the number of rooms deleted.
    pub fn reset_all(&self) -> usize {
        let room_ids: Vec<RoomId> = self.rooms.iter().map(|r| r.key().clone()).collect();
        let mut cleared = 0;
        for room_id in room_ids {
            if let Some((_, room)) = self.rooms.remove(&room_id) {
                for member in &room.members {
                    self.presence.leave_room(&member.user_id, &room_id);
                }
                cleared += 1;
            }
        }
        info!(count = cleared, "Reset all rooms");
        cleared
    }

    /// Delete one room, telling its members.
    pub fn reset(&self, room_id: &RoomId) -> Result<Vec<Delivery>, SignalError> {
        let (_, room) = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| SignalError::RoomNotFound(room_id.clone()))?;

        let deliveries = room
            .members
            .iter()
            .map(|member| {
                self.presence.leave_room(&member.user_id, room_id);
                Delivery::new(
                    member.user_id.clone(),
                    OutboundEvent::RoomReset {
                        room_id: room_id.clone(),
                        message: format!("Room {} has been reset", room_id),
                    },
                )
            })
            .collect();

        info!(room_id = %room_id, "Reset room");
        Ok(deliveries)
    }

    /// Delete rooms whose single member has waited at least `timeout`.
    pub fn expire_waiting(&self, now: Instant, timeout: Duration) -> Vec<Delivery> {
        let candidates: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().waiting_expired(now, timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut deliveries = Vec::new();
        for room_id in candidates {
            let removed = self
                .rooms
                .remove_if(&room_id, |_, room| room.waiting_expired(now, timeout));
            if let Some((_, room)) = removed {
                for member in room.members {
                    self.presence.leave_room(&member.user_id, &room_id);
                    deliveries.push(Delivery::new(
                        member.user_id,
                        OutboundEvent::RoomReset {
                            room_id: room_id.clone(),
                            message: format!("Room {} expired waiting for a peer", room_id),
                        },
                    ));
                }
                info!(room_id = %room_id, "Expired waiting room");
            }
        }
        deliveries
    }
}
