//! Presence Tracker
//!
//! Owns each connected user's status and room association. Other components
//! read it before deciding whether a join or call is permitted, and the
//! compound transitions (`enter_room`, `begin_call`) check and update under a
//! single write lock so that two concurrent requests cannot both observe a
//! user as available.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, instrument};

use crate::error::SignalError;
use crate::types::{RoomId, UserId, UserStatus};

/// Tracked state of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub status: UserStatus,
    pub room: Option<RoomId>,
}

impl PresenceEntry {
    fn new() -> Self {
        Self {
            status: UserStatus::Online,
            room: None,
        }
    }

    /// Online and not waiting in or paired through a room.
    fn is_available(&self) -> bool {
        self.status == UserStatus::Online && self.room.is_none()
    }

    /// Taking part in a direct call, pending or accepted.
    fn in_direct_call(&self) -> bool {
        match self.status {
            UserStatus::Calling | UserStatus::ReceivingCall => true,
            UserStatus::Busy => self.room.is_none(),
            UserStatus::Online | UserStatus::Offline => false,
        }
    }
}

/// Tracks status and room association for every connected user.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: RwLock<HashMap<UserId, PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a user as online.
    ///
    /// A user that is already tracked (a reconnect replacing a live
    /// connection) keeps its current status and room.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn mark_online(&self, user_id: &UserId) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users
            .entry(user_id.clone())
            .or_insert_with(PresenceEntry::new);
    }

    /// Set a user's status. No-op for users that are not tracked.
    pub fn mark_status(&self, user_id: &UserId, status: UserStatus) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        match users.get_mut(user_id) {
            Some(entry) => entry.status = status,
            None => debug!(user_id = %user_id, status = %status, "Ignoring status change for untracked user"),
        }
    }

    /// Set the status of both parties of a pairing.
    pub fn set_pair_status(&self, a: &UserId, b: &UserId, status: UserStatus) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        for user_id in [a, b] {
            if let Some(entry) = users.get_mut(user_id) {
                entry.status = status;
            }
        }
    }

    /// Current status; `Offline` for users that are not tracked.
    pub fn status_of(&self, user_id: &UserId) -> UserStatus {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users
            .get(user_id)
            .map(|entry| entry.status)
            .unwrap_or(UserStatus::Offline)
    }

    /// The room the user is currently a member of.
    pub fn room_of(&self, user_id: &UserId) -> Option<RoomId> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.get(user_id).and_then(|entry| entry.room.clone())
    }

    /// Whether the user is tracked at all.
    pub fn contains(&self, user_id: &UserId) -> bool {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.contains_key(user_id)
    }

    /// Users that can be called right now, optionally excluding one.
    ///
    /// Order is unspecified.
    pub fn list_online(&self, exclude: Option<&UserId>) -> Vec<UserId> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users
            .iter()
            .filter(|(id, entry)| Some(*id) != exclude && entry.is_available())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of tracked users.
    pub fn user_count(&self) -> usize {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.len()
    }

    /// Stop tracking a user.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn remove(&self, user_id: &UserId) -> Option<PresenceEntry> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.remove(user_id)
    }

    /// Associate a user with a room.
    ///
    /// Fails if the user is not tracked, already belongs to a room, or is
    /// taking part in a direct call.
    pub fn enter_room(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), SignalError> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let entry = users
            .get_mut(user_id)
            .ok_or_else(|| SignalError::UnknownUser(user_id.clone()))?;
        if let Some(current) = &entry.room {
            return Err(SignalError::AlreadyInRoom(current.clone()));
        }
        if entry.in_direct_call() {
            return Err(SignalError::UserBusy(user_id.clone()));
        }
        entry.room = Some(room_id.clone());
        Ok(())
    }

    /// Clear a user's association with `room_id` and make them available
    /// again. No-op if the user is gone or associated with another room.
    pub fn leave_room(&self, user_id: &UserId, room_id: &RoomId) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = users.get_mut(user_id) {
            if entry.room.as_ref() == Some(room_id) {
                entry.room = None;
                if entry.status == UserStatus::Busy {
                    entry.status = UserStatus::Online;
                }
            }
        }
    }

    /// A room member whose peer left is waiting again.
    pub fn unpair(&self, user_id: &UserId, room_id: &RoomId) {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = users.get_mut(user_id) {
            if entry.room.as_ref() == Some(room_id) && entry.status == UserStatus::Busy {
                entry.status = UserStatus::Online;
            }
        }
    }

    /// Check both parties of a direct call and mark them `calling` /
    /// `receiving_call` in one step.
    pub fn begin_call(&self, from: &UserId, to: &UserId) -> Result<(), SignalError> {
        if from == to {
            return Err(SignalError::TargetUnavailable(to.clone()));
        }

        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        match users.get(from) {
            None => return Err(SignalError::UnknownUser(from.clone())),
            Some(entry) if !entry.is_available() => {
                return Err(SignalError::UserBusy(from.clone()))
            }
            Some(_) => {}
        }
        match users.get(to) {
            Some(entry) if entry.is_available() => {}
            _ => return Err(SignalError::TargetUnavailable(to.clone())),
        }

        if let Some(entry) = users.get_mut(from) {
            entry.status = UserStatus::Calling;
        }
        if let Some(entry) = users.get_mut(to) {
            entry.status = UserStatus::ReceivingCall;
        }
        Ok(())
    }
}
