//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::ConnectionRegistry;
use crate::hub::{Dispatcher, Hub};
use crate::routing::Channel;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// General notification hub.
    pub general_hub: Arc<Hub>,
    /// Topic-specific discussion hub.
    pub topic_hub: Arc<Hub>,
}

impl AppState {
    /// Builds both hubs, each with its own registry.
    #[must_use]
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            general_hub: Arc::new(Hub::new(
                Channel::General,
                Arc::new(ConnectionRegistry::new()),
                outbound_capacity,
            )),
            topic_hub: Arc::new(Hub::new(
                Channel::Topic,
                Arc::new(ConnectionRegistry::new()),
                outbound_capacity,
            )),
        }
    }

    /// Returns the hub serving `channel`.
    #[must_use]
    pub fn hub(&self, channel: Channel) -> &Arc<Hub> {
        match channel {
            Channel::General => &self.general_hub,
            Channel::Topic => &self.topic_hub,
        }
    }

    /// Returns a dispatcher delivering onto these hubs.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.general_hub), Arc::clone(&self.topic_hub))
    }
}
