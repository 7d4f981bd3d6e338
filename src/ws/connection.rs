//! WebSocket session loop.
//!
//! Registers the socket with its [`Hub`], then multiplexes two streams
//! until either side closes: client frames (commands) and the session's
//! outbound push queue. The hub forgets the session, including all its
//! group memberships, when the loop ends.
//!
//! On the general channel every other open session is told when a session
//! opens (`user-connected`) and when it closes (`user-disconnected`).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};

use super::messages::{ClientCommand, ServerMessage};
use crate::domain::ConnectionId;
use crate::hub::Hub;
use crate::routing::{Channel, PushMessage, events};

/// Runs the read/write loop for a single WebSocket connection on `hub`.
///
/// If `user_id` is given, the identity is registered as soon as the
/// session opens.
pub async fn run_connection(socket: WebSocket, hub: Arc<Hub>, user_id: Option<String>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (id, mut outbound) = hub.connect();
    hub.open(id);
    if let Some(user_id) = user_id.as_deref().filter(|u| !u.is_empty()) {
        hub.register_identity(id, user_id);
    }

    let greeting = PushMessage::from_value(
        events::CONNECTED,
        serde_json::json!({
            "connectionId": id,
            "channel": hub.channel().as_str(),
            "message": "Connected",
            "timestamp": Utc::now(),
        }),
    );
    let greeted = match ServerMessage::event(greeting).to_json() {
        Some(json) => ws_tx.send(Message::text(json)).await.is_ok(),
        None => false,
    };
    announce_presence(&hub, id, events::USER_CONNECTED);

    while greeted {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&hub, id, &text);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %id, error = %err, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            // Message queued by the hub
            push = outbound.recv() => {
                let Some(push) = push else {
                    break;
                };
                let Some(json) = ServerMessage::event(push).to_json() else {
                    continue;
                };
                if let Err(err) = ws_tx.send(Message::text(json)).await {
                    tracing::debug!(connection_id = %id, error = %err, "ws write failed");
                    break;
                }
            }
        }
    }

    hub.disconnect(id);
    announce_presence(&hub, id, events::USER_DISCONNECTED);
    tracing::debug!(connection_id = %id, "ws connection closed");
}

/// Tells every other open general-channel session that `id` came or went.
///
/// Returns the number of sessions notified; always 0 on the topic channel.
fn announce_presence(hub: &Hub, id: ConnectionId, event: &str) -> usize {
    if hub.channel() != Channel::General {
        return 0;
    }
    let push = PushMessage::from_value(
        event,
        serde_json::json!({
            "connectionId": id,
            "timestamp": Utc::now(),
        }),
    );
    hub.send_to_all_except(id, &push)
}

/// Handles a text frame from the client, returning an optional JSON reply.
fn handle_text_message(hub: &Hub, id: ConnectionId, text: &str) -> Option<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return ServerMessage::error(String::new(), 400, "malformed JSON").to_json();
    };
    let request_id = value
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    let command = match serde_json::from_value::<ClientCommand>(value) {
        Ok(command) => command,
        Err(err) => {
            return ServerMessage::error(request_id, 404, &format!("unknown command: {err}"))
                .to_json();
        }
    };

    if matches!(command, ClientCommand::SendTestMessage { .. })
        && hub.channel() != Channel::General
    {
        return ServerMessage::error(
            request_id,
            404,
            "sendTestMessage is only available on the general channel",
        )
        .to_json();
    }

    handle_command(hub, id, command)
        .and_then(|payload| ServerMessage::response(request_id, payload).to_json())
}

/// Applies a client command to the hub, returning the reply payload for
/// commands that have one.
fn handle_command(hub: &Hub, id: ConnectionId, command: ClientCommand) -> Option<serde_json::Value> {
    match command {
        ClientCommand::Subscribe { topic_id } => {
            let group = hub.subscribe(id, &topic_id);
            Some(serde_json::json!({
                "topicId": topic_id,
                "group": group,
                "subscribed": true,
            }))
        }
        ClientCommand::Unsubscribe { topic_id } => {
            let group = hub.unsubscribe(id, &topic_id);
            Some(serde_json::json!({
                "topicId": topic_id,
                "group": group,
                "subscribed": false,
            }))
        }
        ClientCommand::RegisterIdentity { user_id } => {
            let registered = hub.register_identity(id, &user_id);
            Some(serde_json::json!({
                "userId": user_id,
                "registered": registered,
            }))
        }
        ClientCommand::NotifyTyping {
            topic_id,
            user_id,
            display_name,
        } => {
            let group = hub.channel().group_key(&topic_id);
            let push = PushMessage::from_value(
                events::USER_TYPING,
                serde_json::json!({
                    "topicId": topic_id,
                    "userId": user_id,
                    "displayName": display_name,
                    "timestamp": Utc::now(),
                }),
            );
            hub.send_to_group_except(&group, id, &push);
            None
        }
        ClientCommand::NotifyStoppedTyping { topic_id, user_id } => {
            let group = hub.channel().group_key(&topic_id);
            let push = PushMessage::from_value(
                events::USER_STOPPED_TYPING,
                serde_json::json!({
                    "topicId": topic_id,
                    "userId": user_id,
                    "timestamp": Utc::now(),
                }),
            );
            hub.send_to_group_except(&group, id, &push);
            None
        }
        ClientCommand::ReactToItem {
            topic_id,
            item_id,
            user_id,
            reaction_type,
        } => {
            let group = hub.channel().group_key(&topic_id);
            let push = PushMessage::from_value(
                events::ITEM_REACTION,
                serde_json::json!({
                    "topicId": topic_id,
                    "itemId": item_id,
                    "userId": user_id,
                    "reactionType": reaction_type,
                    "timestamp": Utc::now(),
                }),
            );
            let delivered = hub.send_to_group(&group, &push);
            tracing::debug!(topic_id = %topic_id, reaction = %reaction_type, delivered, "reaction relayed");
            None
        }
        ClientCommand::SendTestMessage { message } => {
            let push = PushMessage::from_value(
                events::TEST_MESSAGE,
                serde_json::json!({
                    "message": format!("Echo: {message}"),
                    "connectionId": id,
                    "timestamp": Utc::now(),
                }),
            );
            let delivered = hub.send_to_all(&push);
            Some(serde_json::json!({ "delivered": delivered }))
        }
        ClientCommand::ViewersCount { topic_id } => {
            let count = hub.topic_member_count(&topic_id);
            Some(serde_json::json!({
                "topicId": topic_id,
                "count": count,
            }))
        }
    }
}
