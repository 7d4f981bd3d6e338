//! Notification endpoints: registry stats and operator test sends.
//!
//! Test sends go through the general-channel hub only. They exist so an
//! operator can check the push path end to end without publishing to the
//! broker.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{
    StatsQuery, StatsResponse, TestBroadcastRequest, TestGroupRequest, TestSendResponse,
    TestUserRequest,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::routing::{Channel, PushMessage, events};

fn test_message(message: &str) -> Result<PushMessage, GatewayError> {
    if message.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "message must not be empty".to_string(),
        ));
    }
    Ok(PushMessage::from_value(
        events::TEST_MESSAGE,
        serde_json::json!({
            "message": message,
            "timestamp": Utc::now(),
        }),
    ))
}

/// `GET /notifications/stats` — Registry counters for one channel.
#[utoipa::path(
    get,
    path = "/api/v1/notifications/stats",
    tag = "Notifications",
    summary = "Channel statistics",
    description = "Returns connection and group counters for the general (default) or topic channel.",
    params(StatsQuery),
    responses(
        (status = 200, description = "Channel counters", body = StatsResponse),
        (status = 400, description = "Unknown channel", body = ErrorResponse),
    )
)]
pub async fn stats_handler(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let channel = match query.channel.as_deref() {
        None | Some("") => Channel::General,
        Some(name) => {
            Channel::parse(name).ok_or_else(|| GatewayError::UnknownChannel(name.to_string()))?
        }
    };
    let hub = state.hub(channel);
    Ok((
        StatusCode::OK,
        Json(StatsResponse {
            channel: channel.as_str().to_string(),
            stats: hub.registry().stats(),
            open_connections: hub.open_count(),
        }),
    ))
}

/// `POST /notifications/test-broadcast` — Push a test message to everyone.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/test-broadcast",
    tag = "Notifications",
    summary = "Broadcast a test message",
    request_body = TestBroadcastRequest,
    responses(
        (status = 200, description = "Message queued", body = TestSendResponse),
        (status = 400, description = "Empty message", body = ErrorResponse),
    )
)]
pub async fn test_broadcast_handler(
    State(state): State<AppState>,
    Json(req): Json<TestBroadcastRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let push = test_message(&req.message)?;
    let delivered = state.general_hub.send_to_all(&push);
    tracing::info!(delivered, "test broadcast sent");
    Ok((
        StatusCode::OK,
        Json(TestSendResponse {
            success: true,
            delivered,
        }),
    ))
}

/// `POST /notifications/test-user` — Push a test message to one user.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/test-user",
    tag = "Notifications",
    summary = "Send a test message to a user",
    description = "Delivers to the connection registered for the user on the general channel.",
    request_body = TestUserRequest,
    responses(
        (status = 200, description = "Message queued", body = TestSendResponse),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 404, description = "User has no live connection", body = ErrorResponse),
    )
)]
pub async fn test_user_handler(
    State(state): State<AppState>,
    Json(req): Json<TestUserRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let push = test_message(&req.message)?;
    if !state.general_hub.send_to_user(&req.user_id, &push) {
        return Err(GatewayError::UserNotConnected(req.user_id));
    }
    tracing::info!(user_id = %req.user_id, "test message sent to user");
    Ok((
        StatusCode::OK,
        Json(TestSendResponse {
            success: true,
            delivered: 1,
        }),
    ))
}

/// `POST /notifications/test-group` — Push a test message to a topic group.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/test-group",
    tag = "Notifications",
    summary = "Send a test message to a topic group",
    request_body = TestGroupRequest,
    responses(
        (status = 200, description = "Message queued", body = TestSendResponse),
        (status = 400, description = "Empty message or topic id", body = ErrorResponse),
    )
)]
pub async fn test_group_handler(
    State(state): State<AppState>,
    Json(req): Json<TestGroupRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    if req.topic_id.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "topicId must not be empty".to_string(),
        ));
    }
    let push = test_message(&req.message)?;
    let group = Channel::General.group_key(&req.topic_id);
    let delivered = state.general_hub.send_to_group(&group, &push);
    tracing::info!(group = %group, delivered, "test message sent to group");
    Ok((
        StatusCode::OK,
        Json(TestSendResponse {
            success: true,
            delivered,
        }),
    ))
}

/// Notification routes (mounted under `/api/v1`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications/stats", get(stats_handler))
        .route("/notifications/test-broadcast", post(test_broadcast_handler))
        .route("/notifications/test-user", post(test_user_handler))
        .route("/notifications/test-group", post(test_group_handler))
}
