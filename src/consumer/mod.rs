//! Event consumer: broker sessions, queue bindings, and the receive loop.
//!
//! ```text
//! broker ──► BrokerSession ──► EventConsumer ──► EventHandler (Dispatcher)
//!              (lapin / memory)   decode + settle     route + push
//! ```

pub mod amqp;
pub mod backoff;
pub mod broker;
pub mod event_consumer;
pub mod memory;
pub mod queue_table;

pub use amqp::AmqpBroker;
pub use backoff::Backoff;
pub use broker::{Broker, BrokerError, BrokerSession, InboundMessage};
pub use event_consumer::{DecodeFailurePolicy, EventConsumer, Settlement};
pub use memory::InMemoryBroker;
pub use queue_table::QueueTable;
