//! Domain layer: connection identity, membership registry, and events.
//!
//! This module holds the state-bearing core of the gateway: the
//! [`ConnectionRegistry`] shared by transports, the [`ConnectionId`]
//! assigned to each client session, and the typed [`DomainEvent`]s decoded
//! from broker messages.

pub mod connection_id;
pub mod event;
pub mod registry;

pub use connection_id::ConnectionId;
pub use event::{DecodeError, DomainEvent, EventKind};
pub use registry::{ConnectionRegistry, RegistryStats};
