//! Fan-out policy: which channel, group, and payload each event maps to.
//!
//! | Event             | Channel | Target                  | Push event         |
//! |-------------------|---------|-------------------------|--------------------|
//! | resource-uploaded | general | broadcast               | `resource-uploaded`|
//! | item-created      | general | `topic:{parentId}`      | `item-added`       |
//! | item-created      | topic   | `subscribers:{parentId}`| `new-item`         |
//! | item-deleted      | topic   | `subscribers:{parentId}`| `item-deleted`     |
//! | item-edited       | topic   | `subscribers:{parentId}`| `item-edited`      |
//!
//! [`route`] is pure: the receive time is passed in, so the same event and
//! instant always produce the same decisions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::message::{Channel, PushMessage, RoutingDecision, Target};
use crate::domain::DomainEvent;
use crate::domain::event::{ItemCreated, ItemDeleted, ItemEdited, ResourceUploaded};

/// Push event names as seen by clients.
pub mod events {
    /// Broadcast when a resource upload completes.
    pub const RESOURCE_UPLOADED: &str = "resource-uploaded";
    /// General-channel notice of a new item under a topic.
    pub const ITEM_ADDED: &str = "item-added";
    /// Topic-channel stream entry for a new item.
    pub const NEW_ITEM: &str = "new-item";
    /// Topic-channel notice of a removed item.
    pub const ITEM_DELETED: &str = "item-deleted";
    /// Topic-channel notice of an edited item.
    pub const ITEM_EDITED: &str = "item-edited";
    /// Greeting sent to a session once it is open.
    pub const CONNECTED: &str = "connected";
    /// Another user in the topic started typing.
    pub const USER_TYPING: &str = "user-typing";
    /// Another user in the topic stopped typing.
    pub const USER_STOPPED_TYPING: &str = "user-stopped-typing";
    /// Someone in the topic reacted to an item.
    pub const ITEM_REACTION: &str = "item-reaction";
    /// Operator-triggered test message, or a client echo.
    pub const TEST_MESSAGE: &str = "test-message";
    /// Another session opened on the general channel.
    pub const USER_CONNECTED: &str = "user-connected";
    /// Another session closed on the general channel.
    pub const USER_DISCONNECTED: &str = "user-disconnected";
}

const UPLOAD_NOTICE: &str = "New resource uploaded!";
const ITEM_NOTICE: &str = "New item added!";

/// Error shaping an outbound payload.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// Payload could not be serialized to JSON.
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceUploadedPayload<'a> {
    resource_id: &'a str,
    url: &'a str,
    owner_id: &'a str,
    message: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemAddedPayload<'a> {
    item_id: &'a str,
    parent_id: &'a str,
    user_id: &'a str,
    content: &'a str,
    created_at: DateTime<Utc>,
    message: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewItemPayload<'a> {
    item_id: &'a str,
    parent_id: &'a str,
    user_id: &'a str,
    content: &'a str,
    created_at: DateTime<Utc>,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemDeletedPayload<'a> {
    item_id: &'a str,
    parent_id: &'a str,
    user_id: Option<&'a str>,
    deleted_at: DateTime<Utc>,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemEditedPayload<'a> {
    item_id: &'a str,
    parent_id: &'a str,
    user_id: &'a str,
    content: &'a str,
    edited_at: DateTime<Utc>,
    timestamp: DateTime<Utc>,
}

/// Maps one event to the deliveries it fans out to.
///
/// # Errors
///
/// Returns [`RouteError::Payload`] if a payload cannot be serialized.
pub fn route(
    event: &DomainEvent,
    received_at: DateTime<Utc>,
) -> Result<Vec<RoutingDecision>, RouteError> {
    match event {
        DomainEvent::ResourceUploaded(e) => route_upload(e, received_at),
        DomainEvent::ItemCreated(e) => route_created(e, received_at),
        DomainEvent::ItemDeleted(e) => route_deleted(e, received_at),
        DomainEvent::ItemEdited(e) => route_edited(e, received_at),
    }
}

fn route_upload(
    e: &ResourceUploaded,
    received_at: DateTime<Utc>,
) -> Result<Vec<RoutingDecision>, RouteError> {
    let payload = ResourceUploadedPayload {
        resource_id: &e.resource_id,
        url: &e.url,
        owner_id: &e.owner_id,
        message: UPLOAD_NOTICE,
        timestamp: received_at,
    };
    Ok(vec![RoutingDecision {
        channel: Channel::General,
        target: Target::Broadcast,
        message: PushMessage::new(events::RESOURCE_UPLOADED, &payload)?,
    }])
}

fn route_created(
    e: &ItemCreated,
    received_at: DateTime<Utc>,
) -> Result<Vec<RoutingDecision>, RouteError> {
    let general = ItemAddedPayload {
        item_id: &e.item_id,
        parent_id: &e.parent_id,
        user_id: &e.user_id,
        content: &e.content,
        created_at: e.created_at,
        message: ITEM_NOTICE,
    };
    let topic = NewItemPayload {
        item_id: &e.item_id,
        parent_id: &e.parent_id,
        user_id: &e.user_id,
        content: &e.content,
        created_at: e.created_at,
        timestamp: received_at,
    };
    Ok(vec![
        RoutingDecision {
            channel: Channel::General,
            target: Target::Group(Channel::General.group_key(&e.parent_id)),
            message: PushMessage::new(events::ITEM_ADDED, &general)?,
        },
        RoutingDecision {
            channel: Channel::Topic,
            target: Target::Group(Channel::Topic.group_key(&e.parent_id)),
            message: PushMessage::new(events::NEW_ITEM, &topic)?,
        },
    ])
}

fn route_deleted(
    e: &ItemDeleted,
    received_at: DateTime<Utc>,
) -> Result<Vec<RoutingDecision>, RouteError> {
    let payload = ItemDeletedPayload {
        item_id: &e.item_id,
        parent_id: &e.parent_id,
        user_id: e.user_id.as_deref(),
        deleted_at: e.deleted_at.unwrap_or(received_at),
        timestamp: received_at,
    };
    Ok(vec![RoutingDecision {
        channel: Channel::Topic,
        target: Target::Group(Channel::Topic.group_key(&e.parent_id)),
        message: PushMessage::new(events::ITEM_DELETED, &payload)?,
    }])
}

fn route_edited(
    e: &ItemEdited,
    received_at: DateTime<Utc>,
) -> Result<Vec<RoutingDecision>, RouteError> {
    let payload = ItemEditedPayload {
        item_id: &e.item_id,
        parent_id: &e.parent_id,
        user_id: &e.user_id,
        content: &e.content,
        edited_at: e.edited_at.unwrap_or(received_at),
        timestamp: received_at,
    };
    Ok(vec![RoutingDecision {
        channel: Channel::Topic,
        target: Target::Group(Channel::Topic.group_key(&e.parent_id)),
        message: PushMessage::new(events::ITEM_EDITED, &payload)?,
    }])
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::EventKind;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5)
            .single()
            .unwrap_or_default()
    }

    fn created() -> DomainEvent {
        let body = br#"{"itemId":"c1","parentId":"r1","userId":"u2","content":"hi","createdAt":"2024-01-01T00:00:00Z"}"#;
        let Ok(event) = EventKind::ItemCreated.decode(body) else {
            panic!("fixture should decode");
        };
        event
    }

    fn targets(decisions: &[RoutingDecision]) -> Vec<(Channel, Target, &str)> {
        decisions
            .iter()
            .map(|d| (d.channel, d.target.clone(), d.message.event.as_str()))
            .collect()
    }

    #[test]
    fn upload_is_broadcast_on_general() {
        let event = DomainEvent::ResourceUploaded(ResourceUploaded {
            resource_id: "r1".to_string(),
            owner_id: "u1".to_string(),
            url: "http://x/r1.png".to_string(),
        });
        let Ok(decisions) = route(&event, at()) else {
            panic!("routing failed");
        };
        assert_eq!(
            targets(&decisions),
            vec![(Channel::General, Target::Broadcast, events::RESOURCE_UPLOADED)]
        );
        let Some(decision) = decisions.first() else {
            panic!("no decision");
        };
        let payload = &decision.message.payload;
        assert_eq!(payload.get("resourceId").and_then(|v| v.as_str()), Some("r1"));
        assert_eq!(payload.get("ownerId").and_then(|v| v.as_str()), Some("u1"));
        assert!(payload.get("message").is_some());
        assert!(payload.get("timestamp").is_some());
    }

    #[test]
    fn created_goes_to_both_channels_with_distinct_groups() {
        let Ok(decisions) = route(&created(), at()) else {
            panic!("routing failed");
        };
        assert_eq!(
            targets(&decisions),
            vec![
                (
                    Channel::General,
                    Target::Group("topic:r1".to_string()),
                    events::ITEM_ADDED
                ),
                (
                    Channel::Topic,
                    Target::Group("subscribers:r1".to_string()),
                    events::NEW_ITEM
                ),
            ]
        );
    }

    #[test]
    fn created_payloads_share_identifying_fields() {
        let Ok(decisions) = route(&created(), at()) else {
            panic!("routing failed");
        };
        for decision in &decisions {
            let payload = &decision.message.payload;
            assert_eq!(payload.get("itemId").and_then(|v| v.as_str()), Some("c1"));
            assert_eq!(payload.get("parentId").and_then(|v| v.as_str()), Some("r1"));
            assert_eq!(payload.get("userId").and_then(|v| v.as_str()), Some("u2"));
            assert!(payload.get("createdAt").is_some());
        }
        let shapes: Vec<bool> = decisions
            .iter()
            .map(|d| d.message.payload.get("message").is_some())
            .collect();
        assert_eq!(shapes, vec![true, false]);
    }

    #[test]
    fn deleted_and_edited_stay_on_topic_channel() {
        let deleted = DomainEvent::ItemDeleted(ItemDeleted {
            item_id: "c1".to_string(),
            parent_id: "r9".to_string(),
            user_id: None,
            deleted_at: None,
        });
        let edited = DomainEvent::ItemEdited(ItemEdited {
            item_id: "c1".to_string(),
            parent_id: "r9".to_string(),
            user_id: "u2".to_string(),
            content: "edited".to_string(),
            edited_at: None,
        });
        for (event, name) in [(deleted, events::ITEM_DELETED), (edited, events::ITEM_EDITED)] {
            let Ok(decisions) = route(&event, at()) else {
                panic!("routing failed");
            };
            assert_eq!(
                targets(&decisions),
                vec![(Channel::Topic, Target::Group("subscribers:r9".to_string()), name)]
            );
        }
    }

    #[test]
    fn routing_is_deterministic() {
        let event = created();
        let Ok(first) = route(&event, at()) else {
            panic!("routing failed");
        };
        let Ok(second) = route(&event, at()) else {
            panic!("routing failed");
        };
        assert_eq!(first, second);
    }
}
