//! In-process [`Broker`] with AMQP-like settlement semantics.
//!
//! Used by tests and local runs without RabbitMQ. Queues are FIFO;
//! unsettled messages go back to the head of their queue when they are
//! negatively acknowledged with requeue or when their session is severed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::broker::{Broker, BrokerError, BrokerSession, InboundMessage};

#[derive(Debug, Clone)]
struct Stored {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<Stored>>,
    unsettled: HashMap<u64, (String, Stored)>,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    acked_bodies: Vec<Vec<u8>>,
    dead_lettered: Vec<Vec<u8>>,
    declarations: Vec<String>,
    connects: usize,
    refuse_connects: usize,
    generation: u64,
    next_tag: u64,
}

impl State {
    /// Returns every unsettled message to the head of its queue, oldest
    /// delivery first.
    fn requeue_unsettled(&mut self) {
        let mut unsettled: Vec<_> = self.unsettled.drain().collect();
        unsettled.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
        for (_, (queue, mut stored)) in unsettled {
            stored.redelivered = true;
            self.queues.entry(queue).or_default().push_front(stored);
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

/// Cloneable handle to an in-memory broker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message to `queue`, creating it if needed.
    pub fn publish(&self, queue: &str, body: impl Into<Vec<u8>>) {
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(Stored {
                body: body.into(),
                redelivered: false,
            });
        self.shared.notify.notify_waiters();
    }

    /// Makes the next `n` connection attempts fail.
    pub fn refuse_connects(&self, n: usize) {
        self.lock().refuse_connects = n;
    }

    /// Drops every live session; their unsettled messages are requeued.
    pub fn sever(&self) {
        {
            let mut state = self.lock();
            state.generation += 1;
            state.requeue_unsettled();
        }
        self.shared.notify.notify_waiters();
    }

    /// Tags acknowledged so far, in order.
    #[must_use]
    pub fn acked(&self) -> Vec<u64> {
        self.lock().acked.clone()
    }

    /// `(tag, requeue)` pairs negatively acknowledged so far, in order.
    #[must_use]
    pub fn nacked(&self) -> Vec<(u64, bool)> {
        self.lock().nacked.clone()
    }

    /// Bodies of acknowledged messages, in acknowledgement order.
    #[must_use]
    pub fn acked_bodies(&self) -> Vec<Vec<u8>> {
        self.lock().acked_bodies.clone()
    }

    /// Bodies rejected without requeue.
    #[must_use]
    pub fn dead_lettered(&self) -> Vec<Vec<u8>> {
        self.lock().dead_lettered.clone()
    }

    /// Number of messages waiting in `queue`.
    #[must_use]
    pub fn pending(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Every queue declaration received, across all sessions.
    #[must_use]
    pub fn declarations(&self) -> Vec<String> {
        self.lock().declarations.clone()
    }

    /// Number of successful connections.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.lock().connects
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    type Session = InMemorySession;

    async fn connect(&self, queues: &[String]) -> Result<InMemorySession, BrokerError> {
        let mut state = self.lock();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(BrokerError::Unavailable("connection refused".to_string()));
        }
        state.connects += 1;
        for queue in queues {
            state.queues.entry(queue.clone()).or_default();
            state.declarations.push(queue.clone());
        }
        Ok(InMemorySession {
            broker: self.clone(),
            queues: queues.to_vec(),
            generation: state.generation,
            cursor: 0,
            closed: false,
        })
    }
}

/// Session on an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemorySession {
    broker: InMemoryBroker,
    queues: Vec<String>,
    generation: u64,
    cursor: usize,
    closed: bool,
}

impl InMemorySession {
    fn try_take(&mut self) -> Option<Result<InboundMessage, BrokerError>> {
        let mut state = self.broker.lock();
        if self.closed || state.generation != self.generation {
            return Some(Err(BrokerError::Closed));
        }
        let count = self.queues.len();
        for offset in 0..count {
            let index = (self.cursor + offset) % count;
            let Some(queue) = self.queues.get(index) else {
                continue;
            };
            let Some(stored) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
                continue;
            };
            self.cursor = index + 1;
            state.next_tag += 1;
            let tag = state.next_tag;
            state.unsettled.insert(tag, (queue.clone(), stored.clone()));
            return Some(Ok(InboundMessage {
                queue: queue.clone(),
                delivery_tag: tag,
                body: stored.body,
                redelivered: stored.redelivered,
            }));
        }
        None
    }

    fn settle(&self, delivery_tag: u64) -> Result<(String, Stored), BrokerError> {
        let mut state = self.broker.lock();
        if self.closed || state.generation != self.generation {
            return Err(BrokerError::Closed);
        }
        state
            .unsettled
            .remove(&delivery_tag)
            .ok_or_else(|| BrokerError::Unavailable(format!("unknown delivery tag {delivery_tag}")))
    }
}

#[async_trait]
impl BrokerSession for InMemorySession {
    async fn next_message(&mut self) -> Option<Result<InboundMessage, BrokerError>> {
        let shared = Arc::clone(&self.broker.shared);
        loop {
            let notified = shared.notify.notified();
            if let Some(item) = self.try_take() {
                return Some(item);
            }
            notified.await;
        }
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), BrokerError> {
        let (_, stored) = self.settle(delivery_tag)?;
        let mut state = self.broker.lock();
        state.acked.push(delivery_tag);
        state.acked_bodies.push(stored.body);
        Ok(())
    }

    async fn nack(&mut self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let (queue, mut stored) = self.settle(delivery_tag)?;
        {
            let mut state = self.broker.lock();
            state.nacked.push((delivery_tag, requeue));
            if requeue {
                stored.redelivered = true;
                state.queues.entry(queue).or_default().push_front(stored);
            } else {
                state.dead_lettered.push(stored.body);
            }
        }
        if requeue {
            self.broker.shared.notify.notify_waiters();
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
        self.broker.lock().requeue_unsettled();
        self.broker.shared.notify.notify_waiters();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn queues() -> Vec<String> {
        vec!["q".to_string()]
    }

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "a");
        broker.publish("q", "b");
        let Ok(mut session) = broker.connect(&queues()).await else {
            panic!("connect failed");
        };
        let Some(Ok(first)) = session.next_message().await else {
            panic!("expected message");
        };
        let Some(Ok(second)) = session.next_message().await else {
            panic!("expected message");
        };
        assert_eq!(first.body, b"a");
        assert_eq!(second.body, b"b");
    }

    #[tokio::test]
    async fn requeued_message_comes_back_first() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "a");
        broker.publish("q", "b");
        let Ok(mut session) = broker.connect(&queues()).await else {
            panic!("connect failed");
        };
        let Some(Ok(first)) = session.next_message().await else {
            panic!("expected message");
        };
        tokio_test::assert_ok!(session.nack(first.delivery_tag, true).await);
        let Some(Ok(again)) = session.next_message().await else {
            panic!("expected redelivery");
        };
        assert_eq!(again.body, b"a");
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn severed_session_reports_closed() {
        let broker = InMemoryBroker::new();
        let Ok(mut session) = broker.connect(&queues()).await else {
            panic!("connect failed");
        };
        broker.sever();
        assert!(matches!(
            session.next_message().await,
            Some(Err(BrokerError::Closed))
        ));
    }

    #[tokio::test]
    async fn refused_connects_are_counted_down() {
        let broker = InMemoryBroker::new();
        broker.refuse_connects(1);
        assert!(broker.connect(&queues()).await.is_err());
        assert!(broker.connect(&queues()).await.is_ok());
        assert_eq!(broker.connects(), 1);
    }
}
