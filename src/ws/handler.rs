//! Axum WebSocket upgrade handlers, one per channel.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::routing::Channel;

/// Optional query parameters on the upgrade request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Identity to register as soon as the session opens.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `GET /ws/notifications` — Upgrade to a general-channel session.
pub async fn notifications_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let hub = Arc::clone(state.hub(Channel::General));
    ws.on_upgrade(move |socket| run_connection(socket, hub, params.user_id))
}

/// `GET /ws/comments` — Upgrade to a topic-channel session.
pub async fn comments_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let hub = Arc::clone(state.hub(Channel::Topic));
    ws.on_upgrade(move |socket| run_connection(socket, hub, params.user_id))
}

/// WebSocket routes for both channels.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws/notifications", get(notifications_ws_handler))
        .route("/ws/comments", get(comments_ws_handler))
}
