//! Request and response bodies for the notification endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::RegistryStats;

/// Query string of `GET /notifications/stats`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// `general` (default) or `topic` (alias `comments`).
    #[serde(default)]
    pub channel: Option<String>,
}

/// Registry counters for one channel.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Channel the counters belong to.
    pub channel: String,
    /// Registry aggregate counters.
    #[serde(flatten)]
    pub stats: RegistryStats,
    /// Sessions currently open on the channel's hub.
    pub open_connections: usize,
}

/// Body of `POST /notifications/test-broadcast`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestBroadcastRequest {
    /// Text to push.
    pub message: String,
}

/// Body of `POST /notifications/test-user`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestUserRequest {
    /// Recipient user id.
    pub user_id: String,
    /// Text to push.
    pub message: String,
}

/// Body of `POST /notifications/test-group`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestGroupRequest {
    /// Topic whose general-channel group receives the message.
    pub topic_id: String,
    /// Text to push.
    pub message: String,
}

/// Outcome of an operator test send.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestSendResponse {
    /// Whether at least the send was attempted.
    pub success: bool,
    /// Sessions the message was queued for.
    pub delivered: usize,
}
