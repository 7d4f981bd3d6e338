//! # fanout-gateway
//!
//! Real-time event fan-out gateway. Domain events published to a message
//! broker are consumed, routed by a fixed policy, and pushed to WebSocket
//! clients on two channels: a general notification channel and a
//! topic-specific discussion channel.
//!
//! ## Architecture
//!
//! ```text
//! Broker queues (AMQP)
//!     │
//!     ├── EventConsumer (consumer/)
//!     │       decode → handle → ack / nack
//!     │
//!     ├── route() (routing/)
//!     │       DomainEvent → [RoutingDecision]
//!     │
//!     ├── Dispatcher → Hub ×2 (hub/)
//!     │       ConnectionRegistry per hub (domain/)
//!     │
//!     └── WebSocket sessions (ws/)  +  REST (api/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod error;
pub mod hub;
pub mod routing;
pub mod ws;
