//! Topic-addressed publish/subscribe transports.
//!
//! Every binder and router operation takes its transport explicitly. Two
//! implementations ship with the crate:
//! - [`MemoryBroker`]: an in-process broker, for tests and embedding
//! - [`crate::stomp::StompClient`]: a STOMP connection to a real broker
//!
//! # Example
//!
//! ```ignore
//! let broker = MemoryBroker::new();
//! let client = broker.connect();
//!
//! let id = client.subscribe("/topic/app.todos.>", Arc::new(|frame: &Frame| {
//!     println!("got {}", frame.body_lossy());
//!     Ok(())
//! }))?;
//! client.publish("/topic/app.todos.create", b"[]", &[])?;
//! client.unsubscribe(id)?;
//! ```

mod memory;

pub use memory::{destination_matches, MemoryBroker, MemoryClient, SubscriptionHandle};

use crate::error::Result;
use crate::types::{ClientId, Frame, SubscriptionId};
use std::sync::Arc;

/// Callback invoked for every frame delivered to a subscription.
///
/// An error is reported back to the transport, which logs it.
pub type FrameHandler = Arc<dyn Fn(&Frame) -> Result<()> + Send + Sync>;

/// A connection to a topic broker.
pub trait Transport: Send + Sync {
    /// Identity of this connection, used for client-scoped reply topics.
    fn client_id(&self) -> &ClientId;

    /// Subscribe `handler` to `destination` (exact name or wildcard pattern).
    ///
    /// Every call creates a new subscription, even for a destination that is
    /// already subscribed.
    fn subscribe(&self, destination: &str, handler: FrameHandler) -> Result<SubscriptionId>;

    /// Cancel one subscription.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Publish `body` to `destination` with extra headers.
    fn publish(&self, destination: &str, body: &[u8], headers: &[(&str, &str)]) -> Result<()>;
}
