//! Connection Registry for event delivery.
//!
//! Each WebSocket registers the sender half of a bounded channel when it is
//! accepted. Events are routed to a user by id; a writer task per connection
//! drains the channel into the socket.
//!
//! ```text
//! connection task (alice) <-> ConnectionRegistry <-> connection task (bob)
//!          |                          |                         |
//!          v                          v                         v
//!    mpsc::Sender             DashMap<UserId,             mpsc::Sender
//!                              ConnectionEntry>
//! ```

mod connection_registry;

pub use connection_registry::{ConnectionEntry, ConnectionRegistry, SendResult};
