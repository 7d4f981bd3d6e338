//! Push transport: per-channel hubs and the dispatcher that feeds them.
//!
//! Two [`Hub`] instances run side by side, one per
//! [`Channel`](crate::routing::Channel). Each owns its own
//! [`ConnectionRegistry`](crate::domain::ConnectionRegistry), so group
//! namespaces never overlap. The [`Dispatcher`] turns routed events into
//! hub sends.

pub mod dispatcher;
pub mod transport;

pub use dispatcher::{DispatchReport, Dispatcher, EventHandler};
pub use transport::{ConnectionState, Hub};
