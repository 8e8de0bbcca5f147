//! Connection Registry implementation.
//!
//! Tracks live user connections by user id for event delivery.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::protocol::OutboundEvent;
use crate::types::{ConnectionId, UserId};

/// Connection state stored in the registry.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Identifies this particular connection of the user
    pub id: ConnectionId,
    /// Channel drained by the connection's writer task
    pub sender: mpsc::Sender<OutboundEvent>,
}

/// Result of attempting to send an event to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Event was queued for delivery
    Sent,
    /// The recipient is not currently connected
    NotConnected,
    /// The recipient's channel is full; the client is not draining it
    ChannelFull(ConnectionId),
    /// The recipient's channel is closed; the transport is gone
    ChannelClosed(ConnectionId),
}

impl SendResult {
    /// Whether the event was queued.
    #[cfg(test)]
    pub fn is_sent(&self) -> bool {
        matches!(self, SendResult::Sent)
    }

    /// The connection whose transport failed, if this was a delivery failure.
    ///
    /// `NotConnected` is not a failure of any transport.
    pub fn failed_connection(&self) -> Option<ConnectionId> {
        match self {
            SendResult::ChannelFull(id) | SendResult::ChannelClosed(id) => Some(*id),
            SendResult::Sent | SendResult::NotConnected => None,
        }
    }
}

/// Registry for tracking live connections.
///
/// Thread-safe registry that maps user ids to connection entries.
/// Uses DashMap for concurrent access without explicit locking.
///
/// ## Usage
///
/// ```ignore
/// let registry = ConnectionRegistry::new();
///
/// // When a connection is established:
/// let (tx, rx) = mpsc::channel(256);
/// let conn_id = registry.register(user_id.clone(), tx);
///
/// // When delivering an event:
/// let result = registry.send(&peer_id, event);
///
/// // When the connection closes:
/// registry.unregister(&user_id, conn_id);
/// ```
pub struct ConnectionRegistry {
    connections: DashMap<UserId, ConnectionEntry>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create a new connection registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection with its outbound channel.
    ///
    /// If the user already has a connection, it is replaced (last connection
    /// wins). The previous connection's later cleanup is then a no-op because
    /// its id no longer matches.
    #[instrument(skip(self, sender), fields(user_id = %user_id))]
    pub fn register(&self, user_id: UserId, sender: mpsc::Sender<OutboundEvent>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let existing = self
            .connections
            .insert(user_id, ConnectionEntry { id, sender });
        if let Some(previous) = existing {
            debug!(previous = %previous.id, current = %id, "Replaced existing connection registration");
        } else {
            debug!(connection = %id, "Registered new connection");
        }
        id
    }

    /// Unregister a specific connection.
    ///
    /// Returns true only if that exact connection was registered and has now
    /// been removed. This is the guard that makes disconnect cleanup run once.
    #[instrument(skip(self), fields(user_id = %user_id, connection = %id))]
    pub fn unregister(&self, user_id: &UserId, id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(user_id, |_, entry| entry.id == id)
            .is_some();
        if removed {
            debug!("Unregistered connection");
        } else {
            debug!("Connection was not registered");
        }
        removed
    }

    /// Check if a user currently has a live connection.
    pub fn is_registered(&self, user_id: &UserId) -> bool {
        self.connections.contains_key(user_id)
    }

    /// The id of the user's current connection.
    #[cfg(test)]
    pub fn connection_id(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.connections.get(user_id).map(|entry| entry.id)
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Attempt to deliver an event to a connected user.
    ///
    /// Never blocks. A full or closed channel is reported as a failure of that
    /// connection; the caller escalates it into disconnect cleanup.
    #[instrument(skip(self, event), fields(to = %user_id, kind = event.kind()))]
    pub fn send(&self, user_id: &UserId, event: OutboundEvent) -> SendResult {
        let (id, sender) = match self.connections.get(user_id) {
            Some(entry) => (entry.id, entry.sender.clone()),
            None => {
                debug!("Recipient not connected");
                return SendResult::NotConnected;
            }
        };

        match sender.try_send(event) {
            Ok(()) => {
                debug!("Event queued for delivery");
                SendResult::Sent
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection = %id, "Outbound channel full, treating as delivery failure");
                SendResult::ChannelFull(id)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection = %id, "Outbound channel closed, connection may have dropped");
                SendResult::ChannelClosed(id)
            }
        }
    }

    /// List all connected user ids.
    pub fn connected_users(&self) -> Vec<UserId> {
        self.connections.iter().map(|r| r.key().clone()).collect()
    }

    /// Connections whose channel has closed without being unregistered.
    ///
    /// The router runs full cleanup for each of these.
    pub fn stale_connections(&self) -> Vec<(UserId, ConnectionId)> {
        self.connections
            .iter()
            .filter(|entry| entry.value().sender.is_closed())
            .map(|entry| (entry.key().clone(), entry.value().id))
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}
