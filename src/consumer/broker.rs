//! Broker abstraction used by the event consumer.
//!
//! A [`Broker`] knows how to open a [`BrokerSession`]: one connection with
//! the given queues declared and consumed. The session hands out messages
//! one at a time and settles them by delivery tag. Sessions are owned by a
//! single consumer task and never shared.

use async_trait::async_trait;

/// Transport-level broker failure.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Error reported by the AMQP client.
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The connection or its delivery streams ended.
    #[error("broker connection closed")]
    Closed,

    /// Connection attempt refused.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// A raw message pulled from a queue, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Queue the message was consumed from.
    pub queue: String,
    /// Channel-scoped tag used to settle the message.
    pub delivery_tag: u64,
    /// Message body as published.
    pub body: Vec<u8>,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
}

/// Factory for broker sessions.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Session type produced by [`Broker::connect`].
    type Session: BrokerSession;

    /// Connects, declares `queues` (durable, non-exclusive, no auto-delete)
    /// and starts consuming them with manual acknowledgement.
    ///
    /// Declarations are idempotent; this is called again after every
    /// reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if the connection, a declaration, or a
    /// consumer registration fails.
    async fn connect(&self, queues: &[String]) -> Result<Self::Session, BrokerError>;
}

/// One live broker connection.
#[async_trait]
pub trait BrokerSession: Send {
    /// Waits for the next message from any consumed queue.
    ///
    /// Messages from the same queue come back in broker order. `None` or
    /// an error means the session is unusable.
    async fn next_message(&mut self) -> Option<Result<InboundMessage, BrokerError>>;

    /// Positively acknowledges a message.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if the acknowledgement could not be sent.
    async fn ack(&mut self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Negatively acknowledges a message, optionally asking for requeue.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] if the rejection could not be sent.
    async fn nack(&mut self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;

    /// Closes the session, releasing the connection.
    async fn close(&mut self);
}
