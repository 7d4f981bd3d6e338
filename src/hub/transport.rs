//! A single push-transport instance.
//!
//! A [`Hub`] owns the outbound queue of every client session on one
//! [`Channel`] and resolves group sends through its own
//! [`ConnectionRegistry`]. Group members are connection ids rendered as
//! strings, so the general and topic hubs never see each other's groups.
//!
//! Each session moves through `Connecting → Open → Closing → Closed`.
//! Joins, leaves and sends only act on `Open` sessions; anything aimed at
//! another state is silently ignored so a send racing a disconnect is
//! harmless.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::{ConnectionId, ConnectionRegistry};
use crate::routing::{Channel, PushMessage};

/// Lifecycle of one client session on a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered, handshake not finished.
    Connecting,
    /// Accepting joins and deliveries.
    Open,
    /// Teardown in progress.
    Closing,
    /// Gone; also reported for ids the hub never saw.
    Closed,
}

#[derive(Debug)]
struct Session {
    state: ConnectionState,
    outbound: mpsc::Sender<PushMessage>,
    user_id: Option<String>,
}

/// Push transport for one channel.
#[derive(Debug)]
pub struct Hub {
    channel: Channel,
    registry: Arc<ConnectionRegistry>,
    sessions: DashMap<ConnectionId, Session>,
    outbound_capacity: usize,
}

impl Hub {
    /// Creates a hub for `channel` backed by `registry`.
    ///
    /// `outbound_capacity` bounds each session's pending-message queue;
    /// messages to a session whose queue is full are dropped for that
    /// session only.
    #[must_use]
    pub fn new(channel: Channel, registry: Arc<ConnectionRegistry>, outbound_capacity: usize) -> Self {
        Self {
            channel,
            registry,
            sessions: DashMap::new(),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Returns the channel this hub serves.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Returns the registry holding this hub's identities and groups.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Registers a new session in the `Connecting` state.
    ///
    /// Returns its id and the receiver the session's writer drains.
    #[must_use]
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<PushMessage>) {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let id = ConnectionId::new();
        self.sessions.insert(
            id,
            Session {
                state: ConnectionState::Connecting,
                outbound: tx,
                user_id: None,
            },
        );
        tracing::debug!(channel = self.channel.as_str(), connection_id = %id, "session connecting");
        (id, rx)
    }

    /// Moves a `Connecting` session to `Open`.
    ///
    /// Returns `false` if the session is unknown or not `Connecting`.
    pub fn open(&self, id: ConnectionId) -> bool {
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if session.state != ConnectionState::Connecting {
            return false;
        }
        session.state = ConnectionState::Open;
        tracing::info!(channel = self.channel.as_str(), connection_id = %id, "session open");
        true
    }

    /// Returns the current state of a session.
    #[must_use]
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.sessions
            .get(&id)
            .map_or(ConnectionState::Closed, |s| s.state)
    }

    /// Returns the number of `Open` sessions.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.state == ConnectionState::Open)
            .count()
    }

    /// Tears a session down and removes it from every group.
    ///
    /// Its identity mapping is dropped too, unless the user has since
    /// registered from a newer session. Unknown ids are ignored.
    pub fn disconnect(&self, id: ConnectionId) {
        let user_id = {
            let Some(mut session) = self.sessions.get_mut(&id) else {
                return;
            };
            if session.state == ConnectionState::Closing {
                return;
            }
            session.state = ConnectionState::Closing;
            session.user_id.take()
        };

        let left = self.registry.leave_all(&id.to_string());
        if let Some(user_id) = user_id.as_deref() {
            self.registry.disconnect_connection(user_id, id);
        }
        self.sessions.remove(&id);
        tracing::info!(
            channel = self.channel.as_str(),
            connection_id = %id,
            groups_left = left.len(),
            "session closed"
        );
    }

    /// Joins an `Open` session to `group_key`.
    ///
    /// Returns `true` only if the membership is new.
    pub fn join(&self, id: ConnectionId, group_key: &str) -> bool {
        if !self.is_open(id) {
            return false;
        }
        let joined = self.registry.join_group(group_key, &id.to_string());
        if joined {
            tracing::debug!(channel = self.channel.as_str(), connection_id = %id, group = group_key, "joined group");
        }
        joined
    }

    /// Removes an `Open` session from `group_key`.
    ///
    /// Returns `true` only if the session was a member.
    pub fn leave(&self, id: ConnectionId, group_key: &str) -> bool {
        if !self.is_open(id) {
            return false;
        }
        let left = self.registry.leave_group(group_key, &id.to_string());
        if left {
            tracing::debug!(channel = self.channel.as_str(), connection_id = %id, group = group_key, "left group");
        }
        left
    }

    /// Subscribes a session to a topic in this hub's namespace.
    ///
    /// Returns the group key that was joined.
    pub fn subscribe(&self, id: ConnectionId, topic_id: &str) -> String {
        let group = self.channel.group_key(topic_id);
        self.join(id, &group);
        group
    }

    /// Unsubscribes a session from a topic in this hub's namespace.
    ///
    /// Returns the group key that was left.
    pub fn unsubscribe(&self, id: ConnectionId, topic_id: &str) -> String {
        let group = self.channel.group_key(topic_id);
        self.leave(id, &group);
        group
    }

    /// Binds `user_id` to an `Open` session.
    ///
    /// The registry maps the user to this connection; no group is joined,
    /// so identities never show up in group stats. Re-registering under a
    /// different user releases the previous identity first.
    pub fn register_identity(&self, id: ConnectionId, user_id: &str) -> bool {
        let previous = {
            let Some(mut session) = self.sessions.get_mut(&id) else {
                return false;
            };
            if session.state != ConnectionState::Open {
                return false;
            }
            session.user_id.replace(user_id.to_string())
        };

        if let Some(previous) = previous.filter(|p| p != user_id) {
            self.registry.disconnect_connection(&previous, id);
        }
        self.registry.connect(user_id, id);
        tracing::info!(channel = self.channel.as_str(), connection_id = %id, user_id, "identity registered");
        true
    }

    /// Returns the number of sessions joined to a topic on this hub.
    #[must_use]
    pub fn topic_member_count(&self, topic_id: &str) -> usize {
        self.registry.member_count(&self.channel.group_key(topic_id))
    }

    /// Delivers `message` to every `Open` session.
    ///
    /// Returns the number of sessions the message was queued for.
    pub fn send_to_all(&self, message: &PushMessage) -> usize {
        self.sessions
            .iter()
            .filter(|entry| self.deliver(*entry.key(), entry.value(), message))
            .count()
    }

    /// Delivers `message` to every `Open` session except `except`.
    pub fn send_to_all_except(&self, except: ConnectionId, message: &PushMessage) -> usize {
        self.sessions
            .iter()
            .filter(|entry| *entry.key() != except)
            .filter(|entry| self.deliver(*entry.key(), entry.value(), message))
            .count()
    }

    /// Delivers `message` to every `Open` session joined to `group_key`.
    ///
    /// Membership is snapshotted at call time; later joiners miss it.
    pub fn send_to_group(&self, group_key: &str, message: &PushMessage) -> usize {
        self.send_to_group_filtered(group_key, None, message)
    }

    /// Like [`Hub::send_to_group`] but skips the `except` session.
    pub fn send_to_group_except(
        &self,
        group_key: &str,
        except: ConnectionId,
        message: &PushMessage,
    ) -> usize {
        self.send_to_group_filtered(group_key, Some(except), message)
    }

    /// Delivers `message` to a single session.
    pub fn send_to_connection(&self, id: ConnectionId, message: &PushMessage) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|session| self.deliver(id, &session, message))
    }

    /// Delivers `message` to the session currently registered for
    /// `user_id`.
    pub fn send_to_user(&self, user_id: &str, message: &PushMessage) -> bool {
        match self.registry.lookup(user_id) {
            Some(id) => self.send_to_connection(id, message),
            None => {
                tracing::debug!(channel = self.channel.as_str(), user_id, "no live connection for user");
                false
            }
        }
    }

    fn send_to_group_filtered(
        &self,
        group_key: &str,
        except: Option<ConnectionId>,
        message: &PushMessage,
    ) -> usize {
        self.registry
            .members_of(group_key)
            .iter()
            .filter_map(|member| member.parse::<ConnectionId>().ok())
            .filter(|id| Some(*id) != except)
            .filter(|id| self.send_to_connection(*id, message))
            .count()
    }

    fn is_open(&self, id: ConnectionId) -> bool {
        self.state(id) == ConnectionState::Open
    }

    fn deliver(&self, id: ConnectionId, session: &Session, message: &PushMessage) -> bool {
        if session.state != ConnectionState::Open {
            return false;
        }
        match session.outbound.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(channel = self.channel.as_str(), connection_id = %id, event = %message.event, "outbound queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(channel = self.channel.as_str(), connection_id = %id, event = %message.event, "session writer gone, message dropped");
                false
            }
        }
    }
}
