//! Delivery routing: from a decoded event to `(channel, target, payload)`.
//!
//! The router is a fixed table (see [`router`]); it never touches
//! connection state. Applying its decisions is the job of
//! [`crate::hub::Dispatcher`].

pub mod message;
pub mod router;

pub use message::{Channel, PushMessage, RoutingDecision, Target};
pub use router::{RouteError, events, route};
