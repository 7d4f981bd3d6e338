//! Outbound push messages and their delivery coordinates.

use serde::Serialize;

/// A named event with a JSON payload, ready to be pushed to clients.
///
/// Cheap to clone relative to socket I/O; each recipient gets its own copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    /// Client-visible event name (e.g. `"item-added"`).
    pub event: String,
    /// Event body.
    pub payload: serde_json::Value,
}

impl PushMessage {
    /// Builds a message by serializing `payload`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `payload` cannot be represented as
    /// JSON (e.g. a map with non-string keys).
    pub fn new(event: impl Into<String>, payload: &impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Builds a message from an already-built JSON value.
    #[must_use]
    pub fn from_value(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// One of the two independent push transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// General notification channel (uploads, item activity per topic).
    General,
    /// Topic-specific discussion channel (item stream per topic).
    Topic,
}

impl Channel {
    /// Returns the channel name used in logs and query strings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Topic => "topic",
        }
    }

    /// Returns this channel's group key for a topic.
    ///
    /// The two channels use disjoint namespaces, so the same topic maps to
    /// logically independent groups.
    #[must_use]
    pub fn group_key(&self, topic_id: &str) -> String {
        match self {
            Self::General => format!("topic:{topic_id}"),
            Self::Topic => format!("subscribers:{topic_id}"),
        }
    }

    /// Parses a channel name, accepting `"comments"` as an alias for
    /// [`Channel::Topic`].
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "general" => Some(Self::General),
            "topic" | "comments" => Some(Self::Topic),
            _ => None,
        }
    }
}

/// Where a message goes within a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every open connection on the channel.
    Broadcast,
    /// Every open connection joined to the named group.
    Group(String),
}

/// A single fan-out step produced by the router.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    /// Transport instance to deliver on.
    pub channel: Channel,
    /// Recipients within that transport.
    pub target: Target,
    /// What to send.
    pub message: PushMessage,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn channels_use_disjoint_namespaces() {
        assert_eq!(Channel::General.group_key("r1"), "topic:r1");
        assert_eq!(Channel::Topic.group_key("r1"), "subscribers:r1");
        assert_ne!(Channel::General.group_key("r1"), Channel::Topic.group_key("r1"));
    }

    #[test]
    fn channel_parse_accepts_alias() {
        assert_eq!(Channel::parse("general"), Some(Channel::General));
        assert_eq!(Channel::parse("comments"), Some(Channel::Topic));
        assert_eq!(Channel::parse("topic"), Some(Channel::Topic));
        assert_eq!(Channel::parse("other"), None);
    }

    #[test]
    fn push_message_serializes_payload() {
        let Ok(msg) = PushMessage::new("ping", &serde_json::json!({ "n": 1 })) else {
            panic!("json value should serialize");
        };
        assert_eq!(msg.event, "ping");
        assert_eq!(msg.payload.get("n").and_then(serde_json::Value::as_u64), Some(1));
    }
}
