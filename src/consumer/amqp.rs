//! RabbitMQ implementation of [`Broker`] on top of `lapin`.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, SelectAll};
use futures_util::{StreamExt, TryStreamExt};
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};

use super::broker::{Broker, BrokerError, BrokerSession, InboundMessage};

const CLOSE_OK: u16 = 200;

type DeliveryStream = BoxStream<'static, Result<InboundMessage, lapin::Error>>;

/// AMQP 0-9-1 broker reachable at a single URI.
#[derive(Debug, Clone)]
pub struct AmqpBroker {
    uri: String,
    prefetch: u16,
    consumer_tag: String,
}

impl AmqpBroker {
    /// Creates a broker for `uri` with the given per-channel prefetch.
    #[must_use]
    pub fn new(uri: impl Into<String>, prefetch: u16) -> Self {
        Self {
            uri: uri.into(),
            prefetch: prefetch.max(1),
            consumer_tag: format!("fanout-gateway-{}", uuid::Uuid::new_v4()),
        }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    type Session = AmqpSession;

    async fn connect(&self, queues: &[String]) -> Result<AmqpSession, BrokerError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await?;

        let mut deliveries = SelectAll::new();
        for queue in queues {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        exclusive: false,
                        auto_delete: false,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;

            let consumer = channel
                .basic_consume(
                    queue,
                    &format!("{}-{queue}", self.consumer_tag),
                    BasicConsumeOptions {
                        no_ack: false,
                        ..BasicConsumeOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;

            let name = queue.clone();
            let stream: DeliveryStream = consumer
                .map_ok(move |delivery| InboundMessage {
                    queue: name.clone(),
                    delivery_tag: delivery.delivery_tag,
                    body: delivery.data,
                    redelivered: delivery.redelivered,
                })
                .boxed();
            deliveries.push(stream);
            tracing::info!(queue = %queue, "queue declared and consuming");
        }

        Ok(AmqpSession {
            connection,
            channel,
            deliveries,
        })
    }
}

/// Live AMQP connection with one channel and a consumer per queue.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    deliveries: SelectAll<DeliveryStream>,
}

impl fmt::Debug for AmqpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpSession")
            .field("channel_id", &self.channel.id())
            .field("consumers", &self.deliveries.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn next_message(&mut self) -> Option<Result<InboundMessage, BrokerError>> {
        self.deliveries
            .next()
            .await
            .map(|item| item.map_err(BrokerError::from))
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn nack(&mut self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(err) = self.channel.close(CLOSE_OK, "shutdown").await {
            tracing::debug!(error = %err, "channel close failed");
        }
        if let Err(err) = self.connection.close(CLOSE_OK, "shutdown").await {
            tracing::debug!(error = %err, "connection close failed");
        }
    }
}
