//! WebSocket message types: server envelope and client commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::PushMessage;

/// Envelope for every server → client frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Echoes the client's request id for responses; server-generated for
    /// events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    /// Push event name, present on `event` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for server frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Reply to a client command.
    Response,
    /// Pushed event.
    Event,
    /// Reply to a command that could not be understood.
    Error,
}

impl ServerMessage {
    /// Wraps a push message as an `event` frame.
    #[must_use]
    pub fn event(message: PushMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: MessageType::Event,
            event: Some(message.event),
            timestamp: Utc::now(),
            payload: message.payload,
        }
    }

    /// Builds a `response` frame for request `id`.
    #[must_use]
    pub fn response(id: String, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type: MessageType::Response,
            event: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an `error` frame for request `id`.
    #[must_use]
    pub fn error(id: String, code: u16, message: &str) -> Self {
        Self {
            id,
            msg_type: MessageType::Error,
            event: None,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "code": code,
                "message": message,
            }),
        }
    }

    /// Serializes the frame to JSON text.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Operations a connected client may invoke.
///
/// Sent as `{"id": "...", "command": "<name>", ...fields}` with camelCase
/// field names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Join this channel's group for a topic.
    Subscribe {
        /// Topic (resource) id.
        topic_id: String,
    },
    /// Leave this channel's group for a topic.
    Unsubscribe {
        /// Topic (resource) id.
        topic_id: String,
    },
    /// Bind a user identity to this connection.
    RegisterIdentity {
        /// User id.
        user_id: String,
    },
    /// Tell the rest of the topic group that a user is typing.
    NotifyTyping {
        /// Topic (resource) id.
        topic_id: String,
        /// Typing user.
        user_id: String,
        /// Name to display next to the indicator.
        display_name: String,
    },
    /// Tell the rest of the topic group that a user stopped typing.
    NotifyStoppedTyping {
        /// Topic (resource) id.
        topic_id: String,
        /// User who stopped.
        user_id: String,
    },
    /// Re-broadcast a reaction to an item to the whole topic group.
    ReactToItem {
        /// Topic (resource) id.
        topic_id: String,
        /// Item reacted to.
        item_id: String,
        /// Reacting user.
        user_id: String,
        /// Reaction name (e.g. `"like"`).
        reaction_type: String,
    },
    /// Ask how many connections follow a topic on this channel.
    ViewersCount {
        /// Topic (resource) id.
        topic_id: String,
    },
    /// Echo a message to every session on the general channel.
    SendTestMessage {
        /// Text to echo.
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_command() {
        let json = r#"{"id":"1","command":"notifyTyping","topicId":"r1","userId":"u1","displayName":"Ana"}"#;
        let Ok(cmd) = serde_json::from_str::<ClientCommand>(json) else {
            panic!("command should parse");
        };
        assert_eq!(
            cmd,
            ClientCommand::NotifyTyping {
                topic_id: "r1".to_string(),
                user_id: "u1".to_string(),
                display_name: "Ana".to_string(),
            }
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        let json = r#"{"command":"launchRockets"}"#;
        assert!(serde_json::from_str::<ClientCommand>(json).is_err());
    }

    #[test]
    fn event_frame_carries_name() {
        let push = PushMessage::from_value("new-item", serde_json::json!({ "itemId": "c1" }));
        let Some(json) = ServerMessage::event(push).to_json() else {
            panic!("frame should serialize");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&json) else {
            panic!("frame should be JSON");
        };
        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("event"));
        assert_eq!(value.get("event").and_then(|v| v.as_str()), Some("new-item"));
    }

    #[test]
    fn response_frame_omits_event() {
        let frame = ServerMessage::response("7".to_string(), serde_json::json!({}));
        let json = frame.to_json().unwrap_or_default();
        assert!(!json.contains("\"event\""));
        assert!(json.contains("\"response\""));
    }
}
