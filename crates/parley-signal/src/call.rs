//! Call Coordinator
//!
//! Direct calls: an initiator invites a specific online user by id. A call is
//! pending until the target resolves it, either party disconnects, or the
//! sweep expires it. An accepted call stays recorded as an active pair until
//! one side hangs up or leaves.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, instrument};

use crate::error::SignalError;
use crate::presence::PresenceTracker;
use crate::protocol::OutboundEvent;
use crate::types::{CallId, Delivery, Payload, UserId, UserStatus};

/// An unanswered direct call.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub call_id: CallId,
    pub from: UserId,
    pub to: UserId,
    pub offer: Payload,
    created_at: Instant,
}

impl PendingCall {
    fn involves(&self, user_id: &UserId) -> bool {
        &self.from == user_id || &self.to == user_id
    }

    fn expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= timeout
    }
}

/// One side of an accepted call.
#[derive(Debug, Clone)]
struct ActiveCall {
    call_id: CallId,
    peer: UserId,
}

/// A successfully placed call.
#[derive(Debug, Clone)]
pub struct Placed {
    pub call_id: CallId,
    /// `incoming_call` for the target and `call_placed` for the initiator
    pub deliveries: Vec<Delivery>,
}

/// How a pending call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accepted,
    Rejected,
}

/// A resolved call.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub resolution: Resolution,
    pub initiator: UserId,
    pub deliveries: Vec<Delivery>,
}

/// Owns pending and active direct calls.
#[derive(Debug)]
pub struct CallCoordinator {
    pending: DashMap<CallId, PendingCall>,
    active: DashMap<UserId, ActiveCall>,
    presence: Arc<PresenceTracker>,
}

impl CallCoordinator {
    pub fn new(presence: Arc<PresenceTracker>) -> Self {
        Self {
            pending: DashMap::new(),
            active: DashMap::new(),
            presence,
        }
    }

    /// Invite `to` into a direct call.
    ///
    /// Both parties must be online and outside any room or call. No pending
    /// call is stored on failure.
    #[instrument(skip(self, offer), fields(from = %from, to = %to))]
    pub fn place(&self, from: &UserId, to: &UserId, offer: Payload) -> Result<Placed, SignalError> {
        self.presence.begin_call(from, to)?;

        let call_id = CallId::generate();
        self.pending.insert(
            call_id.clone(),
            PendingCall {
                call_id: call_id.clone(),
                from: from.clone(),
                to: to.clone(),
                offer: offer.clone(),
                created_at: Instant::now(),
            },
        );

        // A party that disconnected between the availability check and the
        // insert was not seen by its own cleanup.
        if !self.presence.contains(from) || !self.presence.contains(to) {
            if self.pending.remove(&call_id).is_some() {
                self.presence.set_pair_status(from, to, UserStatus::Online);
            }
            debug!("Party left while the call was being placed");
            return Err(SignalError::TargetUnavailable(to.clone()));
        }

        info!(call_id = %call_id, "Call placed");
        Ok(Placed {
            deliveries: vec![
                Delivery::new(
                    to.clone(),
                    OutboundEvent::IncomingCall {
                        call_id: call_id.clone(),
                        from: from.clone(),
                        offer,
                    },
                ),
                Delivery::new(
                    from.clone(),
                    OutboundEvent::CallPlaced {
                        call_id: call_id.clone(),
                        to: to.clone(),
                    },
                ),
            ],
            call_id,
        })
    }

    /// Accept or reject a pending call. Single-shot: a second resolution of
    /// the same id fails with `CallNotFound`.
    ///
    /// Accepting without an answer payload (null or empty) counts as a
    /// rejection.
    #[instrument(skip(self, answer), fields(call_id = %call_id))]
    pub fn resolve(
        &self,
        call_id: &CallId,
        accept: bool,
        answer: Payload,
    ) -> Result<Resolved, SignalError> {
        let (_, call) = self
            .pending
            .remove(call_id)
            .ok_or_else(|| SignalError::CallNotFound(call_id.clone()))?;

        if !accept || is_empty_payload(&answer) {
            self.presence
                .set_pair_status(&call.from, &call.to, UserStatus::Online);
            info!("Call rejected");
            return Ok(Resolved {
                resolution: Resolution::Rejected,
                deliveries: vec![Delivery::new(
                    call.from.clone(),
                    OutboundEvent::CallRejected {
                        call_id: call.call_id,
                        from: call.to,
                    },
                )],
                initiator: call.from,
            });
        }

        self.presence
            .set_pair_status(&call.from, &call.to, UserStatus::Busy);
        self.active.insert(
            call.from.clone(),
            ActiveCall {
                call_id: call.call_id.clone(),
                peer: call.to.clone(),
            },
        );
        self.active.insert(
            call.to.clone(),
            ActiveCall {
                call_id: call.call_id.clone(),
                peer: call.from.clone(),
            },
        );

        let mut deliveries = vec![Delivery::new(
            call.from.clone(),
            OutboundEvent::CallAccepted {
                call_id: call.call_id.clone(),
                from: call.to.clone(),
                answer,
            },
        )];

        // Same race as in `place`: a party already gone never ends the pair.
        for party in [&call.from, &call.to] {
            if !self.presence.contains(party) {
                deliveries.extend(self.end_all(party, false));
            }
        }

        info!("Call accepted");
        Ok(Resolved {
            resolution: Resolution::Accepted,
            initiator: call.from,
            deliveries,
        })
    }

    /// End the user's active call, or withdraw from a pending one.
    ///
    /// No-op if the user has no call.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn hang_up(&self, user_id: &UserId) -> Vec<Delivery> {
        self.end_all(user_id, true)
    }

    /// Cancel every pending or active call involving a departing user.
    ///
    /// Counterparts are told and restored to `online`. The departing user's
    /// own presence is left to the caller.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn abandon(&self, user_id: &UserId) -> Vec<Delivery> {
        self.end_all(user_id, false)
    }

    fn end_all(&self, user_id: &UserId, restore_self: bool) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        if let Some((_, active)) = self.active.remove(user_id) {
            self.active
                .remove_if(&active.peer, |_, other| other.call_id == active.call_id);
            self.presence.mark_status(&active.peer, UserStatus::Online);
            info!(call_id = %active.call_id, peer = %active.peer, "Call ended");
            deliveries.push(Delivery::new(
                active.peer,
                OutboundEvent::CallEnded {
                    call_id: active.call_id,
                    from: user_id.clone(),
                },
            ));
        }

        let involved: Vec<CallId> = self
            .pending
            .iter()
            .filter(|entry| entry.value().involves(user_id))
            .map(|entry| entry.key().clone())
            .collect();

        for call_id in involved {
            let Some((_, call)) = self.pending.remove(&call_id) else {
                continue;
            };
            let (peer, event) = if &call.from == user_id {
                (
                    call.to,
                    OutboundEvent::CallCancelled {
                        call_id: call.call_id,
                        from: user_id.clone(),
                    },
                )
            } else {
                (
                    call.from,
                    OutboundEvent::CallRejected {
                        call_id: call.call_id,
                        from: user_id.clone(),
                    },
                )
            };
            self.presence.mark_status(&peer, UserStatus::Online);
            info!(call_id = %call_id, peer = %peer, "Pending call withdrawn");
            deliveries.push(Delivery::new(peer, event));
        }

        if restore_self && !deliveries.is_empty() {
            self.presence.mark_status(user_id, UserStatus::Online);
        }
        deliveries
    }

    /// Expire calls that stayed unanswered for at least `timeout`.
    ///
    /// The initiator is told the call was rejected and the target that it was
    /// cancelled; both return to `online`.
    pub fn expire_pending(&self, now: Instant, timeout: Duration) -> Vec<Delivery> {
        let candidates: Vec<CallId> = self
            .pending
            .iter()
            .filter(|entry| entry.value().expired(now, timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut deliveries = Vec::new();
        for call_id in candidates {
            let removed = self
                .pending
                .remove_if(&call_id, |_, call| call.expired(now, timeout));
            if let Some((_, call)) = removed {
                self.presence
                    .set_pair_status(&call.from, &call.to, UserStatus::Online);
                info!(call_id = %call_id, from = %call.from, to = %call.to, "Expired unanswered call");
                deliveries.push(Delivery::new(
                    call.from.clone(),
                    OutboundEvent::CallRejected {
                        call_id: call_id.clone(),
                        from: call.to.clone(),
                    },
                ));
                deliveries.push(Delivery::new(
                    call.to,
                    OutboundEvent::CallCancelled {
                        call_id,
                        from: call.from,
                    },
                ));
            }
        }
        deliveries
    }

    /// The target of a pending call.
    pub fn pending_target(&self, call_id: &CallId) -> Option<UserId> {
        self.pending.get(call_id).map(|call| call.to.clone())
    }

    /// The peer of the user's active call.
    #[cfg(test)]
    pub fn active_peer(&self, user_id: &UserId) -> Option<UserId> {
        self.active.get(user_id).map(|call| call.peer.clone())
    }

    /// Get the number of unanswered calls.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Get the number of accepted calls.
    pub fn active_count(&self) -> usize {
        self.active.len() / 2
    }
}

fn is_empty_payload(payload: &Payload) -> bool {
    match payload {
        Payload::Null => true,
        Payload::String(s) => s.is_empty(),
        Payload::Array(items) => items.is_empty(),
        Payload::Object(fields) => fields.is_empty(),
        _ => false,
    }
}
