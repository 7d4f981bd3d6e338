//! Long-running broker consumer.
//!
//! [`EventConsumer::run`] owns one broker session at a time and pulls
//! messages from it one by one: decode by queue, hand the event to the
//! [`EventHandler`], then settle. Settlement is always the last step for a
//! message, so a crash mid fan-out leaves the message unacknowledged and
//! the broker redelivers it.
//!
//! Settlement policy:
//!
//! | Outcome                         | Settlement                         |
//! |---------------------------------|------------------------------------|
//! | handled                         | ack                                |
//! | queue has no bound event kind   | ack (dropped, warned)              |
//! | body fails to decode            | ack, or nack without requeue under [`DecodeFailurePolicy::Reject`] |
//! | handler error or panic          | nack with requeue                  |
//!
//! A failed settle, a stream error, or a closed stream ends the session;
//! the loop reconnects with [`Backoff`], redeclaring every queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::broker::{Broker, BrokerError, BrokerSession, InboundMessage};
use super::queue_table::QueueTable;
use crate::hub::EventHandler;

/// What to do with a message whose body cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeFailurePolicy {
    /// Acknowledge and discard. The message is lost but never blocks the
    /// queue.
    #[default]
    Drop,
    /// Negatively acknowledge without requeue, so a dead-letter exchange
    /// configured on the queue can capture it.
    Reject,
}

impl DecodeFailurePolicy {
    /// Parses `"drop"` or `"reject"` (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop" => Some(Self::Drop),
            "reject" | "dead-letter" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// How a single message was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Handled and acknowledged.
    Acked,
    /// Acknowledged without being handled.
    Dropped,
    /// Rejected without requeue.
    DeadLettered,
    /// Rejected with requeue after a handler failure.
    Requeued,
}

enum SessionEnd {
    Shutdown,
    Lost(BrokerError),
}

/// Consumer of every queue in a [`QueueTable`].
#[derive(Debug)]
pub struct EventConsumer<B, H> {
    broker: B,
    handler: Arc<H>,
    table: QueueTable,
    decode_policy: DecodeFailurePolicy,
    backoff: Backoff,
}

impl<B, H> EventConsumer<B, H>
where
    B: Broker,
    H: EventHandler,
{
    /// Creates a consumer reading `table`'s queues from `broker`.
    #[must_use]
    pub fn new(broker: B, handler: Arc<H>, table: QueueTable) -> Self {
        Self {
            broker,
            handler,
            table,
            decode_policy: DecodeFailurePolicy::default(),
            backoff: Backoff::default(),
        }
    }

    /// Sets the policy for undecodable messages.
    #[must_use]
    pub fn with_decode_failure_policy(mut self, policy: DecodeFailurePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Sets the reconnect schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// A message already being handled when shutdown arrives is finished
    /// and settled before the session closes.
    pub async fn run(self, shutdown: CancellationToken) {
        if self.table.is_empty() {
            tracing::warn!("no queues bound; consumer not started");
            return;
        }
        let queues = self.table.queues();
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                result = self.broker.connect(&queues) => result,
            };

            match connected {
                Ok(mut session) => {
                    tracing::info!(queues = ?queues, "consumer connected");
                    attempt = 0;
                    let end = self.consume(&mut session, &shutdown).await;
                    session.close().await;
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(err) => {
                            tracing::warn!(error = %err, "broker session lost, reconnecting");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt, "broker connect failed");
                }
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("consumer stopped");
    }

    async fn consume(&self, session: &mut B::Session, shutdown: &CancellationToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => return SessionEnd::Shutdown,
                next = session.next_message() => next,
            };
            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(err)) => return SessionEnd::Lost(err),
                None => return SessionEnd::Lost(BrokerError::Closed),
            };
            if let Err(err) = self.process(session, message).await {
                return SessionEnd::Lost(err);
            }
        }
    }

    async fn process(
        &self,
        session: &mut B::Session,
        message: InboundMessage,
    ) -> Result<Settlement, BrokerError> {
        let tag = message.delivery_tag;
        let queue = message.queue.as_str();

        let Some(kind) = self.table.kind_for(queue) else {
            tracing::warn!(queue, delivery_tag = tag, "no event kind bound to queue, message dropped");
            session.ack(tag).await?;
            return Ok(Settlement::Dropped);
        };

        let event = match kind.decode(&message.body) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    queue,
                    delivery_tag = tag,
                    redelivered = message.redelivered,
                    error = %err,
                    policy = ?self.decode_policy,
                    "undecodable message"
                );
                return match self.decode_policy {
                    DecodeFailurePolicy::Drop => {
                        session.ack(tag).await?;
                        Ok(Settlement::Dropped)
                    }
                    DecodeFailurePolicy::Reject => {
                        session.nack(tag, false).await?;
                        Ok(Settlement::DeadLettered)
                    }
                };
            }
        };

        let received_at = Utc::now();
        let handler = &self.handler;
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event, received_at)));

        match outcome {
            Ok(Ok(report)) => {
                session.ack(tag).await?;
                tracing::debug!(
                    queue,
                    kind = %kind,
                    subject = event.subject_id(),
                    decisions = report.decisions,
                    deliveries = report.deliveries,
                    "event delivered"
                );
                Ok(Settlement::Acked)
            }
            Ok(Err(err)) => {
                tracing::error!(queue, kind = %kind, delivery_tag = tag, error = %err, "fan-out failed, requeueing");
                session.nack(tag, true).await?;
                Ok(Settlement::Requeued)
            }
            Err(_) => {
                tracing::error!(queue, kind = %kind, delivery_tag = tag, "fan-out panicked, requeueing");
                session.nack(tag, true).await?;
                Ok(Settlement::Requeued)
            }
        }
    }
}
