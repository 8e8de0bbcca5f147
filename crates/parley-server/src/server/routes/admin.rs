//! Administrative REST Routes
//!
//! HTTP access to the same operations the WebSocket protocol offers, plus
//! inspection and reset of room state:
//! - POST /api/join-room - Join a connected user to a room
//! - POST /api/call-user - Place a direct call between connected users
//! - POST /api/answer-call - Accept or reject a pending call
//! - GET /api/online-users/:user_id - Users available for a call
//! - GET /api/user-status/:user_id - A user's status
//! - GET /api/rooms - List rooms
//! - DELETE /api/reset-rooms - Delete every room
//! - DELETE /api/reset-room/:room_id - Delete one room

use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use parley_signal::{
    CallId, Payload, Resolution, RoomId, RoomSummary, SignalError, UserId, UserStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Create the admin router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/join-room", post(join_room_handler))
        .route("/api/call-user", post(call_user_handler))
        .route("/api/answer-call", post(answer_call_handler))
        .route("/api/online-users/:user_id", get(online_users_handler))
        .route("/api/user-status/:user_id", get(user_status_handler))
        .route("/api/rooms", get(list_rooms_handler))
        .route("/api/reset-rooms", delete(reset_rooms_handler))
        .route("/api/reset-room/:room_id", delete(reset_room_handler))
        .with_state(state)
}

// === Request/Response Types ===

/// Request body for joining a room
#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    #[serde(rename = "roomId", alias = "room_id")]
    pub room_id: String,
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: String,
    #[serde(default)]
    pub offer: Payload,
}

/// Request body for placing a call
#[derive(Debug, Deserialize)]
pub struct CallUserRequest {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub offer: Payload,
}

/// Request body for resolving a call
#[derive(Debug, Deserialize)]
pub struct AnswerCallRequest {
    pub call_id: String,
    #[serde(default = "default_accept")]
    pub accept: bool,
    #[serde(default)]
    pub answer: Payload,
}

fn default_accept() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CallUserResponse {
    pub success: bool,
    pub call_id: CallId,
}

#[derive(Debug, Serialize)]
pub struct AnswerCallResponse {
    pub success: bool,
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct OnlineUser {
    pub id: UserId,
    pub status: UserStatus,
}

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    pub users: Vec<OnlineUser>,
}

#[derive(Debug, Serialize)]
pub struct UserStatusResponse {
    pub user_id: UserId,
    pub status: UserStatus,
}

#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomSummary>,
    pub total_rooms: usize,
    pub connected_users: usize,
}

#[derive(Debug, Serialize)]
pub struct ResetRoomsResponse {
    pub success: bool,
    pub message: String,
    pub rooms_cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct ResetRoomResponse {
    pub success: bool,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    fn new(error: &str, message: &str) -> Self {
        Self {
            success: false,
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// Convert a SignalError to an HTTP response
fn signal_error_to_response(err: SignalError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        SignalError::RoomNotFound(_) | SignalError::CallNotFound(_) | SignalError::UnknownUser(_) => {
            StatusCode::NOT_FOUND
        }
        SignalError::RoomFull(_)
        | SignalError::AlreadyInRoom(_)
        | SignalError::UserBusy(_)
        | SignalError::TargetUnavailable(_) => StatusCode::CONFLICT,
        SignalError::NotInRoom | SignalError::MissingField(_) | SignalError::MalformedMessage(_) => {
            StatusCode::BAD_REQUEST
        }
        SignalError::TransportDeliveryFailed(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ErrorResponse::new(err.code(), &err.to_string())))
}

fn require(value: String, field: &'static str) -> Result<String, SignalError> {
    if value.trim().is_empty() {
        Err(SignalError::MissingField(field))
    } else {
        Ok(value)
    }
}

// === Handlers ===

/// POST /api/join-room
///
/// Join a connected user to a room. Returns the same outcome fields the
/// user receives in its `room-joined` event.
#[instrument(skip(state, request), fields(room_id = %request.room_id, user_id = %request.user_id))]
pub async fn join_room_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JoinRoomRequest>,
) -> impl IntoResponse {
    let result = require(request.room_id, "roomId").and_then(|room_id| {
        let user_id = require(request.user_id, "userId")?;
        state
            .router
            .join_room(&UserId::from(user_id), &RoomId::from(room_id), request.offer)
    });

    match result {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            warn!(error = %err, "Join via API failed");
            signal_error_to_response(err).into_response()
        }
    }
}

/// POST /api/call-user
#[instrument(skip(state, request), fields(from = %request.from, to = %request.to))]
pub async fn call_user_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallUserRequest>,
) -> impl IntoResponse {
    let result = require(request.from, "from").and_then(|from| {
        let to = require(request.to, "to")?;
        state
            .router
            .place_call(&UserId::from(from), &UserId::from(to), request.offer)
    });

    match result {
        Ok(call_id) => {
            info!(call_id = %call_id, "Call placed via API");
            (
                StatusCode::OK,
                Json(CallUserResponse {
                    success: true,
                    call_id,
                }),
            )
                .into_response()
        }
        Err(err) => signal_error_to_response(err).into_response(),
    }
}

/// POST /api/answer-call
#[instrument(skip(state, request), fields(call_id = %request.call_id, accept = request.accept))]
pub async fn answer_call_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnswerCallRequest>,
) -> impl IntoResponse {
    let result = require(request.call_id, "call_id").and_then(|call_id| {
        state.router.resolve_call(
            None,
            &CallId::from(call_id),
            request.accept,
            request.answer,
        )
    });

    match result {
        Ok(resolution) => (
            StatusCode::OK,
            Json(AnswerCallResponse {
                success: true,
                accepted: resolution == Resolution::Accepted,
            }),
        )
            .into_response(),
        Err(err) => signal_error_to_response(err).into_response(),
    }
}

/// GET /api/online-users/:user_id
///
/// Users available for a call, excluding the requester.
pub async fn online_users_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let users = state
        .router
        .online_users(&UserId::from(user_id))
        .into_iter()
        .map(|id| OnlineUser {
            id,
            status: UserStatus::Online,
        })
        .collect();

    (StatusCode::OK, Json(OnlineUsersResponse { users }))
}

/// GET /api/user-status/:user_id
pub async fn user_status_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let user_id = UserId::from(user_id);
    let status = state.router.user_status(&user_id);
    (StatusCode::OK, Json(UserStatusResponse { user_id, status }))
}

/// GET /api/rooms
pub async fn list_rooms_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rooms = state.router.rooms();
    let stats = state.router.stats();
    (
        StatusCode::OK,
        Json(RoomsResponse {
            total_rooms: rooms.len(),
            rooms,
            connected_users: stats.connected_users,
        }),
    )
}

/// DELETE /api/reset-rooms
///
/// Delete every room. Every connected user receives `rooms-reset`.
pub async fn reset_rooms_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rooms_cleared = state.router.reset_rooms();
    info!(rooms_cleared, "Reset all rooms via API");
    (
        StatusCode::OK,
        Json(ResetRoomsResponse {
            success: true,
            message: format!("Reset {} rooms", rooms_cleared),
            rooms_cleared,
        }),
    )
}

/// DELETE /api/reset-room/:room_id
pub async fn reset_room_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> impl IntoResponse {
    let room_id = RoomId::from(room_id);
    match state.router.reset_room(&room_id) {
        Ok(()) => (
            StatusCode::OK,
            Json(ResetRoomResponse {
                success: true,
                message: format!("Room {} has been reset", room_id),
            }),
        )
            .into_response(),
        Err(err) => signal_error_to_response(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use http_body_util::BodyExt;
    use parley_signal::OutboundEvent;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn create_test_state() -> Arc<AppState> {
        Arc::new(AppState::new(ServerConfig::test_default()))
    }

    fn connect(state: &AppState, user: &str) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(16);
        state.router.connect(&UserId::from(user), tx);
        rx
    }

    async fn send(
        state: Arc<AppState>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_join_room_reports_outcome() {
        let state = create_test_state();
        let _rx_a = connect(&state, "alice");
        let _rx_b = connect(&state, "bob");

        let (status, json) = send(
            state.clone(),
            Method::POST,
            "/api/join-room",
            Some(json!({"roomId": "r1", "userId": "alice", "offer": {"sdp": "A"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["waiting"], true);

        let (status, json) = send(
            state.clone(),
            Method::POST,
            "/api/join-room",
            Some(json!({"roomId": "r1", "userId": "bob"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["matched"], true);
        assert_eq!(json["peer_id"], "alice");
    }

    #[tokio::test]
    async fn test_join_room_unknown_user_is_not_found() {
        let state = create_test_state();

        let (status, json) = send(
            state,
            Method::POST,
            "/api/join-room",
            Some(json!({"roomId": "r1", "userId": "ghost"})),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "unknown_user");
    }

    #[tokio::test]
    async fn test_join_room_empty_id_is_bad_request() {
        let state = create_test_state();

        let (status, json) = send(
            state,
            Method::POST,
            "/api/join-room",
            Some(json!({"roomId": " ", "userId": "alice"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "missing_field");
    }

    #[tokio::test]
    async fn test_call_and_answer_flow() {
        let state = create_test_state();
        let mut rx_alice = connect(&state, "alice");
        let mut rx_bob = connect(&state, "bob");

        let (status, json) = send(
            state.clone(),
            Method::POST,
            "/api/call-user",
            Some(json!({"from": "alice", "to": "bob", "offer": {"sdp": "A"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let call_id = json["call_id"].as_str().unwrap().to_string();

        let mut incoming = false;
        while let Ok(event) = rx_bob.try_recv() {
            incoming |= matches!(event, OutboundEvent::IncomingCall { .. });
        }
        assert!(incoming);

        let (status, json) = send(
            state.clone(),
            Method::POST,
            "/api/answer-call",
            Some(json!({"call_id": call_id.as_str(), "answer": {"sdp": "B"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["accepted"], true);

        let mut accepted = false;
        while let Ok(event) = rx_alice.try_recv() {
            accepted |= matches!(event, OutboundEvent::CallAccepted { .. });
        }
        assert!(accepted);

        let (status, json) = send(
            state,
            Method::POST,
            "/api/answer-call",
            Some(json!({"call_id": call_id.as_str(), "accept": false})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "call_not_found");
    }

    #[tokio::test]
    async fn test_call_offline_target_is_conflict() {
        let state = create_test_state();
        let _rx = connect(&state, "alice");

        let (status, json) = send(
            state.clone(),
            Method::POST,
            "/api/call-user",
            Some(json!({"from": "alice", "to": "bob"})),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "target_unavailable");
        assert_eq!(state.router.stats().pending_calls, 0);
    }

    #[tokio::test]
    async fn test_online_users_and_status() {
        let state = create_test_state();
        let _rx_a = connect(&state, "alice");
        let _rx_b = connect(&state, "bob");

        let (status, json) = send(state.clone(), Method::GET, "/api/online-users/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"users": [{"id": "bob", "status": "online"}]}));

        let (_, json) = send(state.clone(), Method::GET, "/api/user-status/bob", None).await;
        assert_eq!(json["status"], "online");

        let (_, json) = send(state, Method::GET, "/api/user-status/nobody", None).await;
        assert_eq!(json["status"], "offline");
    }

    #[tokio::test]
    async fn test_rooms_listing_and_reset() {
        let state = create_test_state();
        let mut rx = connect(&state, "alice");
        state
            .router
            .join_room(&UserId::from("alice"), &RoomId::from("r1"), Value::Null)
            .unwrap();

        let (status, json) = send(state.clone(), Method::GET, "/api/rooms", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_rooms"], 1);
        assert_eq!(json["connected_users"], 1);
        assert_eq!(json["rooms"][0]["room_id"], "r1");
        assert_eq!(json["rooms"][0]["users"], json!(["alice"]));
        assert!(json["rooms"][0]["created_at"].is_string());

        let (status, json) = send(state.clone(), Method::DELETE, "/api/reset-rooms", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["rooms_cleared"], 1);

        let mut reset = false;
        while let Ok(event) = rx.try_recv() {
            reset |= matches!(event, OutboundEvent::RoomsReset { .. });
        }
        assert!(reset);
        assert_eq!(state.router.stats().rooms, 0);
    }

    #[tokio::test]
    async fn test_reset_room() {
        let state = create_test_state();
        let _rx = connect(&state, "alice");
        state
            .router
            .join_room(&UserId::from("alice"), &RoomId::from("r1"), Value::Null)
            .unwrap();

        let (status, json) = send(state.clone(), Method::DELETE, "/api/reset-room/r1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Room r1 has been reset");

        let (status, json) = send(state, Method::DELETE, "/api/reset-room/r1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "room_not_found");
    }
}
