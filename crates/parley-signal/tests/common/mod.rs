//! Test utilities for driving a `SessionRouter` with in-memory clients.

use std::time::Duration;

use parley_signal::{ConnectionId, OutboundEvent, SessionRouter, UserId};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Default timeout for waiting on an event.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// A connected client: the receiving end of its outbound channel.
pub struct TestClient {
    pub user_id: UserId,
    pub connection: ConnectionId,
    rx: mpsc::Receiver<OutboundEvent>,
}

impl TestClient {
    /// Connect `user` to the router and discard the presence broadcasts
    /// caused by earlier clients.
    pub fn connect(router: &SessionRouter, user: &str) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let user_id = UserId::from(user);
        let connection = router.connect(&user_id, tx);
        Self {
            user_id,
            connection,
            rx,
        }
    }

    /// Send a raw text frame as this client.
    pub fn send(&self, router: &SessionRouter, frame: serde_json::Value) {
        router.handle_frame(&self.user_id, &frame.to_string());
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> OutboundEvent {
        timeout(DEFAULT_TIMEOUT, self.rx.recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Channel closed")
    }

    /// Wait for the next event of the given kind, skipping others.
    pub async fn recv_kind(&mut self, kind: &str) -> OutboundEvent {
        loop {
            let event = self.recv().await;
            if event.kind() == kind {
                return event;
            }
        }
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Drop the receiving end, as a closed socket would.
    pub fn close(self) -> (UserId, ConnectionId) {
        (self.user_id, self.connection)
    }
}

/// Initialize tracing for a test run (idempotent).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("parley_signal=debug")
        .with_test_writer()
        .try_init();
}
