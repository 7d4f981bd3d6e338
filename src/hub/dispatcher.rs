//! Applies routing decisions to the two hubs.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::Hub;
use crate::domain::DomainEvent;
use crate::routing::{self, Channel, RouteError, RoutingDecision, Target};

/// Summary of one event's fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Number of routing decisions applied.
    pub decisions: usize,
    /// Number of sessions a message was queued for, across all decisions.
    pub deliveries: usize,
}

/// Something that takes a decoded event and pushes it to clients.
///
/// The consumer only depends on this seam, so tests can substitute a
/// handler that fails or panics.
pub trait EventHandler: Send + Sync {
    /// Fans `event` out to connected clients.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] if the event could not be turned into
    /// deliveries. Per-connection delivery failures are not errors.
    fn handle(&self, event: &DomainEvent, received_at: DateTime<Utc>)
    -> Result<DispatchReport, RouteError>;
}

/// Routes events and delivers them on the general and topic hubs.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    general: Arc<Hub>,
    topic: Arc<Hub>,
}

impl Dispatcher {
    /// Creates a dispatcher over the two channel hubs.
    #[must_use]
    pub fn new(general: Arc<Hub>, topic: Arc<Hub>) -> Self {
        Self { general, topic }
    }

    /// Returns the hub serving `channel`.
    #[must_use]
    pub fn hub(&self, channel: Channel) -> &Arc<Hub> {
        match channel {
            Channel::General => &self.general,
            Channel::Topic => &self.topic,
        }
    }

    /// Delivers a single routing decision, returning the delivery count.
    pub fn apply(&self, decision: &RoutingDecision) -> usize {
        let hub = self.hub(decision.channel);
        match &decision.target {
            Target::Broadcast => hub.send_to_all(&decision.message),
            Target::Group(group) => hub.send_to_group(group, &decision.message),
        }
    }
}

impl EventHandler for Dispatcher {
    fn handle(
        &self,
        event: &DomainEvent,
        received_at: DateTime<Utc>,
    ) -> Result<DispatchReport, RouteError> {
        let decisions = routing::route(event, received_at)?;
        let mut report = DispatchReport::default();
        for decision in &decisions {
            let delivered = self.apply(decision);
            tracing::debug!(
                kind = %event.kind(),
                subject = event.subject_id(),
                topic = event.topic_id(),
                channel = decision.channel.as_str(),
                push_event = %decision.message.event,
                delivered,
                "fan-out step applied"
            );
            report.decisions += 1;
            report.deliveries += delivered;
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{ConnectionId, ConnectionRegistry, EventKind};
    use crate::routing::{PushMessage, events};

    fn hubs() -> (Arc<Hub>, Arc<Hub>) {
        (
            Arc::new(Hub::new(Channel::General, Arc::new(ConnectionRegistry::new()), 8)),
            Arc::new(Hub::new(Channel::Topic, Arc::new(ConnectionRegistry::new()), 8)),
        )
    }

    fn open(hub: &Hub) -> (ConnectionId, mpsc::Receiver<PushMessage>) {
        let (id, rx) = hub.connect();
        hub.open(id);
        (id, rx)
    }

    fn decode(kind: EventKind, body: &[u8]) -> DomainEvent {
        let Ok(event) = kind.decode(body) else {
            panic!("fixture should decode");
        };
        event
    }

    #[test]
    fn upload_fans_out_to_every_general_client() {
        let (general, topic) = hubs();
        let mut clients: Vec<_> = (0..3).map(|_| open(&general).1).collect();
        let (_t, mut topic_rx) = open(&topic);
        let dispatcher = Dispatcher::new(general, topic);

        let event = decode(
            EventKind::ResourceUploaded,
            br#"{"resourceId":"r1","ownerId":"u1","url":"http://x/r1.png"}"#,
        );
        let Ok(report) = dispatcher.handle(&event, Utc::now()) else {
            panic!("dispatch failed");
        };
        assert_eq!(report, DispatchReport { decisions: 1, deliveries: 3 });

        for rx in &mut clients {
            let Ok(msg) = rx.try_recv() else {
                panic!("client missed upload");
            };
            assert_eq!(msg.event, events::RESOURCE_UPLOADED);
            assert_eq!(
                msg.payload.get("resourceId").and_then(|v| v.as_str()),
                Some("r1")
            );
        }
        assert!(topic_rx.try_recv().is_err());
    }

    #[test]
    fn item_created_reaches_each_channel_group_once() {
        let (general, topic) = hubs();
        let (g_id, mut g_rx) = open(&general);
        let (t_id, mut t_rx) = open(&topic);
        let (_idle, mut idle_rx) = open(&general);
        general.subscribe(g_id, "r1");
        topic.subscribe(t_id, "r1");
        let dispatcher = Dispatcher::new(general, topic);

        let event = decode(
            EventKind::ItemCreated,
            br#"{"itemId":"c1","parentId":"r1","userId":"u2","content":"hi","createdAt":"2024-01-01T00:00:00Z"}"#,
        );
        let Ok(report) = dispatcher.handle(&event, Utc::now()) else {
            panic!("dispatch failed");
        };
        assert_eq!(report, DispatchReport { decisions: 2, deliveries: 2 });

        let Ok(general_msg) = g_rx.try_recv() else {
            panic!("general subscriber missed item-added");
        };
        assert_eq!(general_msg.event, events::ITEM_ADDED);
        let Ok(topic_msg) = t_rx.try_recv() else {
            panic!("topic subscriber missed new-item");
        };
        assert_eq!(topic_msg.event, events::NEW_ITEM);
        assert!(idle_rx.try_recv().is_err());
        assert!(g_rx.try_recv().is_err());
    }

    #[test]
    fn same_topic_id_on_other_hub_does_not_cross() {
        let (general, topic) = hubs();
        let (g_id, mut g_rx) = open(&general);
        general.subscribe(g_id, "r1");
        let dispatcher = Dispatcher::new(general, topic);

        let event = decode(EventKind::ItemDeleted, br#"{"itemId":"c1","parentId":"r1"}"#);
        let Ok(report) = dispatcher.handle(&event, Utc::now()) else {
            panic!("dispatch failed");
        };
        assert_eq!(report.deliveries, 0);
        assert!(g_rx.try_recv().is_err());
    }
}
