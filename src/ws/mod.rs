//! WebSocket layer: upgrade handlers, session loop, client commands.
//!
//! `/ws/notifications` attaches to the general hub and `/ws/comments` to
//! the topic hub. Both speak the same frame format.

pub mod connection;
pub mod handler;
pub mod messages;
