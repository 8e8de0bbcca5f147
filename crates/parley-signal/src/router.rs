//! Session Router
//!
//! Entry point for everything a connection does: connect, inbound frames and
//! disconnect, plus the administrative operations. It turns each request into
//! coordinator calls, collects the resulting deliveries and hands them to the
//! connection registry once no coordinator lock is held.
//!
//! A send that fails because a recipient's transport is saturated or gone
//! escalates into disconnect cleanup for that exact connection. Cleanup can
//! produce further deliveries (and further failures), so delivery runs as a
//! worklist rather than by recursion.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::call::{CallCoordinator, Resolution};
use crate::error::SignalError;
use crate::presence::PresenceTracker;
use crate::protocol::{InboundMessage, JoinReport, OutboundEvent};
use crate::registry::ConnectionRegistry;
use crate::room::{RoomCoordinator, RoomSummary};
use crate::types::{CallId, ConnectionId, Delivery, Payload, RoomId, UserId, UserStatus};

/// Default time a direct call may stay unanswered.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time a room may wait for its second member.
pub const DEFAULT_ROOM_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Router behaviour switches.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Answer an explicit-target relay to a user that is not connected with
    /// an `error` event instead of dropping it.
    pub report_undeliverable_relay: bool,
    /// Expiry for unanswered calls; `None` disables it.
    pub call_timeout: Option<Duration>,
    /// Expiry for single-occupant rooms; `None` disables it.
    pub room_timeout: Option<Duration>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            report_undeliverable_relay: false,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            room_timeout: Some(DEFAULT_ROOM_TIMEOUT),
        }
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub connected_users: usize,
    pub tracked_users: usize,
    pub rooms: usize,
    pub pending_calls: usize,
    pub active_calls: usize,
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub notifications: usize,
    pub stale_connections: usize,
}

/// Dispatches client messages to the coordinators and delivers the results.
#[derive(Debug)]
pub struct SessionRouter {
    connections: ConnectionRegistry,
    presence: Arc<PresenceTracker>,
    rooms: RoomCoordinator,
    calls: CallCoordinator,
    options: RouterOptions,
}

impl SessionRouter {
    pub fn new(options: RouterOptions) -> Self {
        let presence = Arc::new(PresenceTracker::new());
        Self {
            connections: ConnectionRegistry::new(),
            rooms: RoomCoordinator::new(Arc::clone(&presence)),
            calls: CallCoordinator::new(Arc::clone(&presence)),
            presence,
            options,
        }
    }

    /// Accept a new connection for `user_id`.
    ///
    /// Replaces any existing connection of the same user. Every other
    /// connected user is told the user is online.
    #[instrument(skip(self, sender), fields(user_id = %user_id))]
    pub fn connect(&self, user_id: &UserId, sender: mpsc::Sender<OutboundEvent>) -> ConnectionId {
        let connection = self.connections.register(user_id.clone(), sender);
        self.presence.mark_online(user_id);
        info!(connection = %connection, "User connected");

        self.deliver(self.status_broadcast(user_id, UserStatus::Online));
        connection
    }

    /// Tear down a connection after its transport closed.
    ///
    /// Runs at most once per connection; a stale id (the user has since
    /// reconnected) is ignored.
    pub fn disconnect(&self, user_id: &UserId, connection: ConnectionId) {
        let deliveries = self.cleanup(user_id, connection);
        self.deliver(deliveries);
    }

    /// Handle one inbound text frame.
    pub fn handle_frame(&self, user_id: &UserId, frame: &str) {
        match InboundMessage::parse(frame) {
            Ok(message) => self.handle_message(user_id, message),
            Err(err @ SignalError::MissingField(_)) => {
                warn!(user_id = %user_id, error = %err, "Inbound message missing a required field");
                self.deliver(vec![Delivery::new(
                    user_id.clone(),
                    OutboundEvent::error(&err),
                )]);
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Ignoring malformed inbound frame");
            }
        }
    }

    /// Handle one parsed message. Failures are reported to the sender.
    pub fn handle_message(&self, user_id: &UserId, message: InboundMessage) {
        let kind = message.kind();
        debug!(user_id = %user_id, kind, "Handling inbound message");

        if let Err(err) = self.dispatch(user_id, message) {
            debug!(user_id = %user_id, kind, error = %err, "Inbound message failed");
            self.deliver(vec![Delivery::new(
                user_id.clone(),
                OutboundEvent::error(&err),
            )]);
        }
    }

    fn dispatch(&self, user_id: &UserId, message: InboundMessage) -> Result<(), SignalError> {
        match message {
            InboundMessage::JoinRoom { room_id, offer } => {
                if let Err(err) = self.join_room(user_id, &room_id, offer) {
                    self.deliver(vec![Delivery::new(
                        user_id.clone(),
                        OutboundEvent::RoomJoined(JoinReport::failed(room_id, &err)),
                    )]);
                    return Err(err);
                }
                Ok(())
            }
            InboundMessage::LeaveRoom => {
                self.leave_room(user_id);
                Ok(())
            }
            InboundMessage::Offer { offer, target } => self.relay(
                user_id,
                target,
                OutboundEvent::Offer {
                    from: user_id.clone(),
                    offer,
                },
            ),
            InboundMessage::Answer {
                answer,
                call_id: Some(call_id),
                ..
            } => self
                .resolve_call(Some(user_id), &call_id, true, answer)
                .map(|_| ()),
            InboundMessage::Answer {
                answer,
                call_id: None,
                target,
            } => self.relay(
                user_id,
                target,
                OutboundEvent::Answer {
                    from: user_id.clone(),
                    answer,
                },
            ),
            InboundMessage::IceCandidate {
                candidate,
                target,
                spelling,
            } => self.relay(
                user_id,
                target,
                OutboundEvent::ice_candidate(user_id.clone(), candidate, spelling),
            ),
            InboundMessage::CallUser { target, offer } => {
                self.place_call(user_id, &target, offer).map(|_| ())
            }
            InboundMessage::RejectCall { call_id } => self
                .resolve_call(Some(user_id), &call_id, false, Payload::Null)
                .map(|_| ()),
            InboundMessage::HangUp => {
                self.hang_up(user_id);
                Ok(())
            }
        }
    }

    /// Forward a negotiation payload to an explicit target, or to the
    /// sender's room peer when no target is given.
    fn relay(
        &self,
        from: &UserId,
        target: Option<UserId>,
        event: OutboundEvent,
    ) -> Result<(), SignalError> {
        if let Some(target) = target {
            if !self.connections.is_registered(&target) {
                if self.options.report_undeliverable_relay {
                    return Err(SignalError::UnknownUser(target));
                }
                debug!(from = %from, to = %target, kind = event.kind(), "Dropping relay to unconnected user");
                return Ok(());
            }
            self.deliver(vec![Delivery::new(target, event)]);
            return Ok(());
        }

        let room_id = self.presence.room_of(from).ok_or(SignalError::NotInRoom)?;
        match self.rooms.peer_of(&room_id, from) {
            Some(peer) => self.deliver(vec![Delivery::new(peer, event)]),
            None => {
                debug!(from = %from, room_id = %room_id, kind = event.kind(), "No peer in room yet, dropping relay");
            }
        }
        Ok(())
    }

    /// Join a room on behalf of a user.
    ///
    /// A user already in another room leaves it first. The joiner receives
    /// `room-joined`, existing members `user-joined`, and on a match both
    /// members `room_matched`.
    pub fn join_room(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
        offer: Payload,
    ) -> Result<JoinReport, SignalError> {
        if let Some(current) = self.presence.room_of(user_id) {
            if &current == room_id {
                return Err(SignalError::AlreadyInRoom(current));
            }
            debug!(user_id = %user_id, from = %current, to = %room_id, "Switching rooms");
            self.deliver(self.rooms.leave(user_id, &current));
        }

        let joined = self.rooms.join(user_id, room_id, offer)?;
        let report = joined.report(user_id);

        let mut deliveries = vec![Delivery::new(
            user_id.clone(),
            OutboundEvent::RoomJoined(report.clone()),
        )];
        for member in joined.members.iter().filter(|m| *m != user_id) {
            deliveries.push(Delivery::new(
                member.clone(),
                OutboundEvent::UserJoined {
                    user_id: user_id.clone(),
                    message: format!("User {} joined the room", user_id),
                },
            ));
        }
        deliveries.extend(joined.deliveries);
        self.deliver(deliveries);
        Ok(report)
    }

    /// Leave the user's current room. No-op outside a room.
    pub fn leave_room(&self, user_id: &UserId) {
        match self.presence.room_of(user_id) {
            Some(room_id) => self.deliver(self.rooms.leave(user_id, &room_id)),
            None => debug!(user_id = %user_id, "Leave requested outside any room"),
        }
    }

    /// Place a direct call.
    pub fn place_call(
        &self,
        from: &UserId,
        to: &UserId,
        offer: Payload,
    ) -> Result<CallId, SignalError> {
        let placed = self.calls.place(from, to, offer)?;
        self.deliver(placed.deliveries);
        Ok(placed.call_id)
    }

    /// Resolve a pending call.
    ///
    /// With a `resolver`, only the call's target may resolve it; any other
    /// user sees `CallNotFound`.
    pub fn resolve_call(
        &self,
        resolver: Option<&UserId>,
        call_id: &CallId,
        accept: bool,
        answer: Payload,
    ) -> Result<Resolution, SignalError> {
        if let Some(resolver) = resolver {
            if self.calls.pending_target(call_id).as_ref() != Some(resolver) {
                return Err(SignalError::CallNotFound(call_id.clone()));
            }
        }
        let resolved = self.calls.resolve(call_id, accept, answer)?;
        self.deliver(resolved.deliveries);
        Ok(resolved.resolution)
    }

    /// End or withdraw from the user's direct call.
    pub fn hang_up(&self, user_id: &UserId) {
        let deliveries = self.calls.hang_up(user_id);
        if deliveries.is_empty() {
            debug!(user_id = %user_id, "Hang-up without a call");
        }
        self.deliver(deliveries);
    }

    /// Users available for a call, excluding `user_id`.
    pub fn online_users(&self, user_id: &UserId) -> Vec<UserId> {
        self.presence.list_online(Some(user_id))
    }

    /// A user's status; `offline` if not connected.
    pub fn user_status(&self, user_id: &UserId) -> UserStatus {
        self.presence.status_of(user_id)
    }

    /// Whether the user has a live connection.
    pub fn is_connected(&self, user_id: &UserId) -> bool {
        self.connections.is_registered(user_id)
    }

    /// Snapshot of every room.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.rooms.list()
    }

    /// Delete every room. Every connected user receives `rooms-reset`.
    ///
    /// Returns the number of rooms deleted.
    pub fn reset_rooms(&self) -> usize {
        let cleared = self.rooms.reset_all();
        let deliveries = self
            .connections
            .connected_users()
            .into_iter()
            .map(|user_id| {
                Delivery::new(
                    user_id,
                    OutboundEvent::RoomsReset {
                        message: "All rooms have been reset".to_string(),
                    },
                )
            })
            .collect();
        self.deliver(deliveries);
        cleared
    }

    /// Delete one room. Its members receive `room-reset`.
    pub fn reset_room(&self, room_id: &RoomId) -> Result<(), SignalError> {
        let deliveries = self.rooms.reset(room_id)?;
        self.deliver(deliveries);
        Ok(())
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            connected_users: self.connections.connection_count(),
            tracked_users: self.presence.user_count(),
            rooms: self.rooms.room_count(),
            pending_calls: self.calls.pending_count(),
            active_calls: self.calls.active_count(),
        }
    }

    /// Expire unanswered calls and lonely rooms, and clean up connections
    /// whose transport closed without a disconnect.
    pub fn sweep_expired(&self, now: Instant) -> SweepReport {
        let mut deliveries = Vec::new();
        if let Some(timeout) = self.options.call_timeout {
            deliveries.extend(self.calls.expire_pending(now, timeout));
        }
        if let Some(timeout) = self.options.room_timeout {
            deliveries.extend(self.rooms.expire_waiting(now, timeout));
        }
        let notifications = deliveries.len();
        self.deliver(deliveries);

        let stale_connections = self.cleanup_stale();
        if notifications > 0 || stale_connections > 0 {
            debug!(notifications, stale_connections, "Sweep finished");
        }
        SweepReport {
            notifications,
            stale_connections,
        }
    }

    /// Run disconnect cleanup for every connection whose channel has closed.
    pub fn cleanup_stale(&self) -> usize {
        let stale = self.connections.stale_connections();
        for (user_id, connection) in &stale {
            warn!(user_id = %user_id, connection = %connection, "Cleaning up stale connection");
            self.disconnect(user_id, *connection);
        }
        stale.len()
    }

    fn status_broadcast(&self, user_id: &UserId, status: UserStatus) -> Vec<Delivery> {
        self.connections
            .connected_users()
            .into_iter()
            .filter(|other| other != user_id)
            .map(|other| {
                Delivery::new(
                    other,
                    OutboundEvent::UserStatus {
                        user_id: user_id.clone(),
                        status,
                    },
                )
            })
            .collect()
    }

    /// Remove every trace of a connection and return the notifications owed
    /// to the other users.
    #[instrument(skip(self), fields(user_id = %user_id, connection = %connection))]
    fn cleanup(&self, user_id: &UserId, connection: ConnectionId) -> Vec<Delivery> {
        if !self.connections.unregister(user_id, connection) {
            debug!("Connection already cleaned up or replaced");
            return Vec::new();
        }

        // Presence goes first so a join or call racing with this cleanup
        // fails its availability check instead of outliving the user.
        let entry = self.presence.remove(user_id);

        let mut deliveries = Vec::new();
        if let Some(room_id) = entry.and_then(|e| e.room) {
            deliveries.extend(self.rooms.leave(user_id, &room_id));
        }
        deliveries.extend(self.calls.abandon(user_id));

        if self.connections.is_registered(user_id) {
            debug!("User reconnected during cleanup");
            self.presence.mark_online(user_id);
        } else {
            deliveries.extend(self.status_broadcast(user_id, UserStatus::Offline));
        }

        info!("User disconnected");
        deliveries
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        let mut queue: VecDeque<Delivery> = deliveries.into();
        let mut failed: Vec<(UserId, ConnectionId)> = Vec::new();

        loop {
            while let Some(Delivery { to, event }) = queue.pop_front() {
                if let Some(connection) = self.connections.send(&to, event).failed_connection() {
                    failed.push((to, connection));
                }
            }

            match failed.pop() {
                Some((user_id, connection)) => {
                    let err = SignalError::TransportDeliveryFailed(user_id.clone());
                    warn!(connection = %connection, error = %err, "Escalating to disconnect cleanup");
                    queue.extend(self.cleanup(&user_id, connection));
                }
                None => break,
            }
        }
    }
}

impl Default for SessionRouter {
    fn default() -> Self {
        Self::new(RouterOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connect(router: &SessionRouter, user: &str) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(32);
        router.connect(&UserId::from(user), tx);
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_connect_broadcasts_online_to_others() {
        let router = SessionRouter::default();
        let mut rx_a = connect(&router, "A");
        let mut rx_b = connect(&router, "B");

        assert_eq!(
            drain(&mut rx_a),
            vec![OutboundEvent::UserStatus {
                user_id: UserId::from("B"),
                status: UserStatus::Online,
            }]
        );
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(router.user_status(&UserId::from("A")), UserStatus::Online);
    }

    #[test]
    fn test_relay_without_room_reports_error() {
        let router = SessionRouter::default();
        let mut rx = connect(&router, "A");

        router.handle_frame(&UserId::from("A"), r#"{"type":"offer","offer":{"sdp":"x"}}"#);

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [OutboundEvent::Error { code: Some("not_in_room"), .. }]
        ));
    }

    #[test]
    fn test_rejected_join_reports_room_joined_failure() {
        let router = SessionRouter::default();
        let _rx_a = connect(&router, "A");
        let _rx_b = connect(&router, "B");
        let mut rx_c = connect(&router, "C");
        let r1 = RoomId::from("r1");
        router.join_room(&UserId::from("A"), &r1, json!(null)).unwrap();
        router.join_room(&UserId::from("B"), &r1, json!(null)).unwrap();
        drain(&mut rx_c);

        router.handle_frame(&UserId::from("C"), r#"{"type":"join-room","room_id":"r1"}"#);

        let events = drain(&mut rx_c);
        assert_eq!(events.len(), 2);
        match &events[0] {
            OutboundEvent::RoomJoined(report) => {
                assert!(!report.success);
                assert!(report.is_room_full);
                assert_eq!(report.room_id, r1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        let value = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(value["type"], "room-joined");
        assert_eq!(value["success"], false);
        assert_eq!(value["is_room_full"], true);
        assert!(matches!(
            events[1],
            OutboundEvent::Error { code: Some("room_full"), .. }
        ));
        assert_eq!(router.user_status(&UserId::from("C")), UserStatus::Online);
    }

    #[test]
    fn test_relay_to_room_peer() {
        let router = SessionRouter::default();
        let mut rx_a = connect(&router, "A");
        let mut rx_b = connect(&router, "B");
        let r1 = RoomId::from("r1");
        router.join_room(&UserId::from("A"), &r1, json!(null)).unwrap();
        router.join_room(&UserId::from("B"), &r1, json!(null)).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        router.handle_frame(&UserId::from("A"), r#"{"type":"ice-candidate","candidate":"c1"}"#);

        assert_eq!(
            drain(&mut rx_b),
            vec![OutboundEvent::IceCandidate {
                from: UserId::from("A"),
                candidate: json!("c1"),
            }]
        );
    }

    #[test]
    fn test_relay_without_peer_is_dropped() {
        let router = SessionRouter::default();
        let mut rx = connect(&router, "A");
        router
            .join_room(&UserId::from("A"), &RoomId::from("r1"), json!(null))
            .unwrap();
        drain(&mut rx);

        router.handle_frame(&UserId::from("A"), r#"{"type":"answer","answer":{}}"#);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_explicit_relay_to_offline_user() {
        let frame = r#"{"type":"offer","target":"ghost","offer":{}}"#;

        let router = SessionRouter::default();
        let mut rx = connect(&router, "A");
        router.handle_frame(&UserId::from("A"), frame);
        assert!(drain(&mut rx).is_empty());

        let router = SessionRouter::new(RouterOptions {
            report_undeliverable_relay: true,
            ..RouterOptions::default()
        });
        let mut rx = connect(&router, "A");
        router.handle_frame(&UserId::from("A"), frame);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [OutboundEvent::Error { code: Some("unknown_user"), .. }]
        ));
    }

    #[test]
    fn test_malformed_frames_are_ignored() {
        let router = SessionRouter::default();
        let mut rx = connect(&router, "A");

        router.handle_frame(&UserId::from("A"), "not json");
        router.handle_frame(&UserId::from("A"), r#"{"type":"teleport"}"#);

        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_missing_room_id_is_reported() {
        let router = SessionRouter::default();
        let mut rx = connect(&router, "A");

        router.handle_frame(&UserId::from("A"), r#"{"type":"join-room"}"#);

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [OutboundEvent::Error { code: Some("missing_field"), .. }]
        ));
    }

    #[test]
    fn test_switching_rooms_leaves_old_room() {
        let router = SessionRouter::default();
        let (a, b) = (UserId::from("A"), UserId::from("B"));
        let _rx_a = connect(&router, "A");
        let mut rx_b = connect(&router, "B");
        router.join_room(&a, &RoomId::from("r1"), json!(null)).unwrap();
        router.join_room(&b, &RoomId::from("r1"), json!(null)).unwrap();
        drain(&mut rx_b);

        router.join_room(&a, &RoomId::from("r2"), json!(null)).unwrap();

        let events = drain(&mut rx_b);
        assert!(events
            .iter()
            .any(|e| matches!(e, OutboundEvent::PeerLeft { user_id, .. } if user_id == &a)));
        assert_eq!(router.user_status(&b), UserStatus::Online);
        assert_eq!(router.rooms().len(), 2);
    }

    #[test]
    fn test_only_target_can_resolve_call() {
        let router = SessionRouter::default();
        let (a, b) = (UserId::from("A"), UserId::from("B"));
        let _rx_a = connect(&router, "A");
        let _rx_b = connect(&router, "B");
        let call_id = router.place_call(&a, &b, json!({"sdp": "A"})).unwrap();

        let err = router
            .resolve_call(Some(&a), &call_id, true, json!({}))
            .unwrap_err();
        assert_eq!(err, SignalError::CallNotFound(call_id.clone()));

        let resolution = router
            .resolve_call(Some(&b), &call_id, true, json!({"sdp": "B"}))
            .unwrap();
        assert_eq!(resolution, Resolution::Accepted);
    }

    #[test]
    fn test_failed_send_escalates_to_cleanup() {
        let router = SessionRouter::default();
        let (a, b) = (UserId::from("A"), UserId::from("B"));
        let mut rx_a = connect(&router, "A");
        let rx_b = connect(&router, "B");
        router.join_room(&a, &RoomId::from("r1"), json!(null)).unwrap();
        router.join_room(&b, &RoomId::from("r1"), json!(null)).unwrap();
        drain(&mut rx_a);

        drop(rx_b);
        router.handle_frame(&a, r#"{"type":"offer","offer":{}}"#);

        assert!(!router.is_connected(&b));
        assert_eq!(router.user_status(&b), UserStatus::Offline);
        let events = drain(&mut rx_a);
        assert!(events
            .iter()
            .any(|e| matches!(e, OutboundEvent::PeerLeft { user_id, .. } if user_id == &b)));
        assert!(events.iter().any(|e| matches!(
            e,
            OutboundEvent::UserStatus { user_id, status: UserStatus::Offline } if user_id == &b
        )));
    }

    #[test]
    fn test_stale_disconnect_keeps_new_connection() {
        let router = SessionRouter::default();
        let a = UserId::from("A");
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        let first = router.connect(&a, tx1);
        router.join_room(&a, &RoomId::from("r1"), json!(null)).unwrap();
        let _second = router.connect(&a, tx2);

        router.disconnect(&a, first);

        assert!(router.is_connected(&a));
        assert_eq!(router.user_status(&a), UserStatus::Online);
        assert_eq!(router.rooms().len(), 1);
    }

    #[test]
    fn test_sweep_expires_calls_and_rooms() {
        let router = SessionRouter::new(RouterOptions {
            call_timeout: Some(Duration::from_secs(10)),
            room_timeout: Some(Duration::from_secs(10)),
            ..RouterOptions::default()
        });
        let (a, b, c) = (UserId::from("A"), UserId::from("B"), UserId::from("C"));
        let mut rx_a = connect(&router, "A");
        let _rx_b = connect(&router, "B");
        let mut rx_c = connect(&router, "C");
        router.place_call(&a, &b, json!(null)).unwrap();
        router.join_room(&c, &RoomId::from("lonely"), json!(null)).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_c);

        let report = router.sweep_expired(Instant::now() + Duration::from_secs(11));

        assert_eq!(report.notifications, 3);
        assert_eq!(router.stats().pending_calls, 0);
        assert_eq!(router.stats().rooms, 0);
        assert!(matches!(
            drain(&mut rx_a).as_slice(),
            [OutboundEvent::CallRejected { .. }]
        ));
        assert!(matches!(
            drain(&mut rx_c).as_slice(),
            [OutboundEvent::RoomReset { .. }]
        ));
    }

    #[test]
    fn test_sweep_disabled_timeouts() {
        let router = SessionRouter::new(RouterOptions {
            call_timeout: None,
            room_timeout: None,
            ..RouterOptions::default()
        });
        let _rx = connect(&router, "C");
        router
            .join_room(&UserId::from("C"), &RoomId::from("lonely"), json!(null))
            .unwrap();

        let report = router.sweep_expired(Instant::now() + Duration::from_secs(86_400));
        assert_eq!(report, SweepReport::default());
        assert_eq!(router.stats().rooms, 1);
    }

    #[test]
    fn test_cleanup_stale_connections() {
        let router = SessionRouter::default();
        let rx = connect(&router, "A");
        drop(rx);

        assert_eq!(router.cleanup_stale(), 1);
        assert!(!router.is_connected(&UserId::from("A")));
        assert_eq!(router.stats().tracked_users, 0);
    }
}
