//! # stompbind
//!
//! Keeps reactive records and collections in sync with a topic-based
//! publish/subscribe broker (STOMP), plus a small demo router.
//!
//! ## Core Concepts
//!
//! - **Bindable**: records and collections whose local events are bound to
//!   topics named `<url>.<event>`
//! - **Transport**: the broker connection every binder call takes
//!   explicitly (in-process [`MemoryBroker`] or TCP [`StompClient`])
//! - **Topic Router**: server side; dispatches read/create/update/delete
//!   messages against an in-memory record store and republishes results
//!
//! ## Example
//!
//! ```ignore
//! use stompbind::{listener, Bindable, Collection, MemoryBroker};
//!
//! let broker = MemoryBroker::new();
//! let client = broker.connect();
//!
//! let todos = Collection::new("/topic/backbonestomp.todos");
//! let on_create = listener(|args| println!("created: {:?}", args));
//! todos.bind("create", &client, on_create.clone())?;
//!
//! // Somebody publishes to /topic/backbonestomp.todos.create ...
//!
//! todos.unbind_all(&client)?;
//! ```

pub mod bind;
pub mod error;
pub mod events;
pub mod router;
pub mod server;
pub mod stomp;
pub mod transport;
pub mod types;

/// Crate version, as published alongside bundled client builds.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports
pub use bind::{identified_items, BindKind, Bindable, Bindings, Collection, Model, SubscriptionEntry};
pub use error::{BindError, Result};
pub use events::{listener, Events, Listener};
pub use router::{Action, Outbound, Record, RecordStore, Route, RouterConfig, TopicRouter};
pub use stomp::{StompClient, StompCodec, StompConfig};
pub use transport::{destination_matches, FrameHandler, MemoryBroker, MemoryClient, SubscriptionHandle, Transport};
pub use types::*;
