//! Signaling over WebSocket
//!
//! One socket per user at `/ws/:user_id`. Each accepted socket gets a bounded
//! outbound channel registered with the session router. A writer task drains
//! the channel into the socket while the reader loop feeds text frames to the
//! router. When either side stops, the other is aborted and the router runs
//! disconnect cleanup for this connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use parley_signal::{OutboundEvent, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::server::AppState;

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/:user_id", get(websocket_handler))
        .with_state(state)
}

/// GET /ws/:user_id
///
/// Upgrades the HTTP connection to a WebSocket for the given user.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(user_id = %user_id, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, UserId::from(user_id), state))
}

/// Handle a signaling WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: UserId, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundEvent>(state.config.outbound_buffer);

    let router = Arc::clone(&state.router);
    let connection = router.connect(&user_id, tx);
    info!(user_id = %user_id, connection = %connection, "WebSocket connection established");

    // Ends when the router drops the channel (replaced or failed connection)
    // or the socket stops accepting writes.
    let writer_user = user_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!(user_id = %writer_user, kind = event.kind(), error = %e, "Failed to encode event");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                debug!(user_id = %writer_user, error = %e, "Failed to send WebSocket message");
                break;
            }
        }
        if let Err(e) = sender.close().await {
            debug!(user_id = %writer_user, error = %e, "Failed to close WebSocket");
        }
    });

    let reader_router = Arc::clone(&router);
    let reader_user = user_id.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!(user_id = %reader_user, len = text.len(), "Received WebSocket message");
                    reader_router.handle_frame(&reader_user, &text);
                }
                Ok(Message::Binary(_)) => {
                    warn!(user_id = %reader_user, "Received binary WebSocket message (not supported)");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pongs are queued by the transport itself
                }
                Ok(Message::Close(_)) => {
                    info!(user_id = %reader_user, "WebSocket close requested");
                    break;
                }
                Err(e) => {
                    warn!(user_id = %reader_user, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
        _ = state.shutdown.cancelled() => {
            reader.abort();
            writer.abort();
        }
    }

    router.disconnect(&user_id, connection);
    info!(user_id = %user_id, connection = %connection, "WebSocket connection closed");
}
