//! Domain events received from the broker.
//!
//! Each queue carries exactly one event type; the producer writes one
//! camelCase JSON object per message body. [`EventKind::decode`] turns a raw
//! body into a typed [`DomainEvent`], which is consumed once by the router
//! and then dropped.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error produced when a message body cannot become a [`DomainEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Body is not valid UTF-8 JSON of the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required identifier was present but empty.
    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),

    /// The event kind name is not one this build understands.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
}

/// Payload of the `resource-uploads` queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUploaded {
    /// Identifier of the uploaded resource.
    pub resource_id: String,
    /// User who uploaded it.
    pub owner_id: String,
    /// Public URL of the stored media.
    pub url: String,
}

/// Payload of the `item-created` queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreated {
    /// Identifier of the new item.
    pub item_id: String,
    /// Resource the item is attached to.
    pub parent_id: String,
    /// Author of the item.
    pub user_id: String,
    /// Item body.
    pub content: String,
    /// Creation time as recorded by the producer.
    pub created_at: DateTime<Utc>,
}

/// Payload of the `item-deleted` queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDeleted {
    /// Identifier of the removed item.
    pub item_id: String,
    /// Resource the item was attached to.
    pub parent_id: String,
    /// User who removed it, when the producer knows.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Removal time, when the producer records one.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Payload of the `item-edited` queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEdited {
    /// Identifier of the edited item.
    pub item_id: String,
    /// Resource the item is attached to.
    pub parent_id: String,
    /// User who made the edit.
    pub user_id: String,
    /// New item body.
    pub content: String,
    /// Edit time, when the producer records one.
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
}

/// A typed event decoded from one broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A media resource finished uploading.
    ResourceUploaded(ResourceUploaded),
    /// An item (e.g. a comment) was created under a resource.
    ItemCreated(ItemCreated),
    /// An item was deleted.
    ItemDeleted(ItemDeleted),
    /// An item was edited.
    ItemEdited(ItemEdited),
}

impl DomainEvent {
    /// Returns the kind discriminator of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ResourceUploaded(_) => EventKind::ResourceUploaded,
            Self::ItemCreated(_) => EventKind::ItemCreated,
            Self::ItemDeleted(_) => EventKind::ItemDeleted,
            Self::ItemEdited(_) => EventKind::ItemEdited,
        }
    }

    /// Returns the identifier of the thing the event is about.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        match self {
            Self::ResourceUploaded(e) => &e.resource_id,
            Self::ItemCreated(e) => &e.item_id,
            Self::ItemDeleted(e) => &e.item_id,
            Self::ItemEdited(e) => &e.item_id,
        }
    }

    /// Returns the topic (parent resource) the event is scoped to, if any.
    #[must_use]
    pub fn topic_id(&self) -> Option<&str> {
        match self {
            Self::ResourceUploaded(_) => None,
            Self::ItemCreated(e) => Some(&e.parent_id),
            Self::ItemDeleted(e) => Some(&e.parent_id),
            Self::ItemEdited(e) => Some(&e.parent_id),
        }
    }
}

/// The closed set of event types this gateway knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`ResourceUploaded`].
    ResourceUploaded,
    /// See [`ItemCreated`].
    ItemCreated,
    /// See [`ItemDeleted`].
    ItemDeleted,
    /// See [`ItemEdited`].
    ItemEdited,
}

impl EventKind {
    /// All known kinds, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::ResourceUploaded,
        Self::ItemCreated,
        Self::ItemDeleted,
        Self::ItemEdited,
    ];

    /// Returns the kebab-case name used in configuration and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceUploaded => "resource-uploaded",
            Self::ItemCreated => "item-created",
            Self::ItemDeleted => "item-deleted",
            Self::ItemEdited => "item-edited",
        }
    }

    /// Decodes a message body according to this kind's wire schema.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] when the body is not the expected
    /// JSON object and [`DecodeError::EmptyField`] when a required
    /// identifier is blank.
    pub fn decode(self, body: &[u8]) -> Result<DomainEvent, DecodeError> {
        match self {
            Self::ResourceUploaded => {
                let event: ResourceUploaded = serde_json::from_slice(body)?;
                require("resourceId", &event.resource_id)?;
                Ok(DomainEvent::ResourceUploaded(event))
            }
            Self::ItemCreated => {
                let event: ItemCreated = serde_json::from_slice(body)?;
                require("itemId", &event.item_id)?;
                require("parentId", &event.parent_id)?;
                Ok(DomainEvent::ItemCreated(event))
            }
            Self::ItemDeleted => {
                let event: ItemDeleted = serde_json::from_slice(body)?;
                require("itemId", &event.item_id)?;
                require("parentId", &event.parent_id)?;
                Ok(DomainEvent::ItemDeleted(event))
            }
            Self::ItemEdited => {
                let event: ItemEdited = serde_json::from_slice(body)?;
                require("itemId", &event.item_id)?;
                require("parentId", &event.parent_id)?;
                Ok(DomainEvent::ItemEdited(event))
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownKind(s.to_string()))
    }
}

fn require(field: &'static str, value: &str) -> Result<(), DecodeError> {
    if value.trim().is_empty() {
        Err(DecodeError::EmptyField(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_resource_upload() {
        let body = br#"{"resourceId":"r1","ownerId":"u1","url":"http://x/r1.png"}"#;
        let Ok(DomainEvent::ResourceUploaded(event)) = EventKind::ResourceUploaded.decode(body)
        else {
            panic!("expected resource-uploaded");
        };
        assert_eq!(event.resource_id, "r1");
        assert_eq!(event.owner_id, "u1");
        assert_eq!(event.url, "http://x/r1.png");
    }

    #[test]
    fn decodes_item_created_with_rfc3339_timestamp() {
        let body = br#"{"itemId":"c1","parentId":"r1","userId":"u2","content":"hi","createdAt":"2024-01-01T00:00:00Z"}"#;
        let Ok(event) = EventKind::ItemCreated.decode(body) else {
            panic!("expected item-created");
        };
        assert_eq!(event.kind(), EventKind::ItemCreated);
        assert_eq!(event.subject_id(), "c1");
        assert_eq!(event.topic_id(), Some("r1"));
        let DomainEvent::ItemCreated(created) = event else {
            panic!("wrong variant");
        };
        assert_eq!(created.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn item_deleted_optional_fields_default() {
        let body = br#"{"itemId":"c1","parentId":"r1"}"#;
        let Ok(DomainEvent::ItemDeleted(event)) = EventKind::ItemDeleted.decode(body) else {
            panic!("expected item-deleted");
        };
        assert!(event.user_id.is_none());
        assert!(event.deleted_at.is_none());
    }

    #[test]
    fn malformed_json_is_rejected() {
        let result = EventKind::ItemCreated.decode(b"{not json");
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn missing_field_is_rejected() {
        let result = EventKind::ItemCreated.decode(br#"{"itemId":"c1"}"#);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn blank_parent_is_rejected() {
        let body = br#"{"itemId":"c1","parentId":" ","userId":"u","content":"x","createdAt":"2024-01-01T00:00:00Z"}"#;
        let result = EventKind::ItemCreated.decode(body);
        assert!(matches!(result, Err(DecodeError::EmptyField("parentId"))));
    }

    #[test]
    fn resource_upload_has_no_topic() {
        let body = br#"{"resourceId":"r1","ownerId":"u1","url":"u"}"#;
        let Ok(event) = EventKind::ResourceUploaded.decode(body) else {
            panic!("decode failed");
        };
        assert!(event.topic_id().is_none());
    }

    #[test]
    fn kind_names_parse_back() {
        for kind in EventKind::ALL {
            let Ok(parsed) = kind.as_str().parse::<EventKind>() else {
                panic!("{kind} should parse");
            };
            assert_eq!(parsed, kind);
        }
        assert!(matches!(
            "item-archived".parse::<EventKind>(),
            Err(DecodeError::UnknownKind(_))
        ));
    }
}
