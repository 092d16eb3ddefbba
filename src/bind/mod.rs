//! Binding reactive objects to broker topics.
//!
//! A [`Bindable`] object maps its local events onto topics named
//! `<topic base>.<event>`:
//! - `bind` registers a local listener and subscribes to the topic
//! - inbound messages are parsed and re-triggered as local events
//! - `unbind` / `unbind_all` tear both sides down again
//!
//! Collections trigger once per inbound item; records trigger once with
//! every item as an argument. A collection's first `create` binding also
//! subscribes to `<topic>.<clientId>`, the channel where replies addressed
//! to this client (for example a `read`) arrive.
//!
//! # Example
//!
//! ```ignore
//! let broker = MemoryBroker::new();
//! let client = broker.connect();
//! let todos = Collection::new("/topic/app.todos");
//!
//! let on_create = listener(|args| println!("created {:?}", args));
//! todos.bind("create", &client, on_create.clone())?;
//! // ...
//! todos.unbind("create", &client, Some(&on_create))?;
//! ```

mod bindable;
mod model;

pub use bindable::{identified_items, BindKind, Bindable, Bindings, SubscriptionEntry};
pub use model::{Collection, Model};
