//! Queue-to-event-kind routing table for the consumer.
//!
//! One consumer serves every queue listed here; each queue carries exactly
//! one [`EventKind`], which selects the decoder for its messages.

use crate::domain::EventKind;

/// Queue carrying [`EventKind::ResourceUploaded`] messages.
pub const RESOURCE_UPLOADS: &str = "resource-uploads";
/// Queue carrying [`EventKind::ItemCreated`] messages.
pub const ITEM_CREATED: &str = "item-created";
/// Queue carrying [`EventKind::ItemDeleted`] messages.
pub const ITEM_DELETED: &str = "item-deleted";
/// Queue carrying [`EventKind::ItemEdited`] messages.
pub const ITEM_EDITED: &str = "item-edited";

/// Ordered list of `(queue, kind)` bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueTable {
    bindings: Vec<(String, EventKind)>,
}

impl QueueTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The four standard bindings.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .bind(RESOURCE_UPLOADS, EventKind::ResourceUploaded)
            .bind(ITEM_CREATED, EventKind::ItemCreated)
            .bind(ITEM_DELETED, EventKind::ItemDeleted)
            .bind(ITEM_EDITED, EventKind::ItemEdited)
    }

    /// Adds or replaces the binding for `queue`.
    #[must_use]
    pub fn bind(mut self, queue: &str, kind: EventKind) -> Self {
        match self.bindings.iter_mut().find(|(name, _)| name == queue) {
            Some(binding) => binding.1 = kind,
            None => self.bindings.push((queue.to_string(), kind)),
        }
        self
    }

    /// Parses `queue=kind` pairs separated by commas.
    ///
    /// Entries naming an unknown kind, or without `=`, are skipped with a
    /// warning so newer producers do not stop older gateways from starting.
    #[must_use]
    pub fn parse(bindings: &str) -> Self {
        let mut table = Self::new();
        for entry in bindings.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((queue, kind)) = entry.split_once('=') else {
                tracing::warn!(entry, "ignoring queue binding without `=`");
                continue;
            };
            let queue = queue.trim();
            if queue.is_empty() {
                tracing::warn!(entry, "ignoring queue binding with empty queue name");
                continue;
            }
            match kind.trim().parse::<EventKind>() {
                Ok(kind) => table = table.bind(queue, kind),
                Err(err) => tracing::warn!(queue, error = %err, "ignoring queue binding"),
            }
        }
        table
    }

    /// Returns the event kind bound to `queue`.
    #[must_use]
    pub fn kind_for(&self, queue: &str) -> Option<EventKind> {
        self.bindings
            .iter()
            .find(|(name, _)| name == queue)
            .map(|(_, kind)| *kind)
    }

    /// Returns the bound queue names in declaration order.
    #[must_use]
    pub fn queues(&self) -> Vec<String> {
        self.bindings.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Returns `true` if no queue is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
