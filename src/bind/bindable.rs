//! The `Bindable` capability and its subscription bookkeeping.

use crate::error::{BindError, Result};
use crate::events::{Events, Listener};
use crate::transport::{FrameHandler, Transport};
use crate::types::{Frame, SubscriptionId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Event name whose collection bindings also listen on the client echo channel.
const CREATE_EVENT: &str = "create";

/// How inbound items are turned into local events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindKind {
    /// One trigger carrying every valid item.
    Record,
    /// One trigger per valid item.
    Collection,
}

/// One `bind` call's worth of state.
#[derive(Clone)]
pub struct SubscriptionEntry {
    pub event: String,
    pub topic: String,
    pub callback: Listener,
    pub subscription: SubscriptionId,
}

impl std::fmt::Debug for SubscriptionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionEntry")
            .field("event", &self.event)
            .field("topic", &self.topic)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct BindingTable {
    /// Entries per event name, in bind order. Never holds an empty list.
    entries: BTreeMap<String, Vec<SubscriptionEntry>>,
    /// Shared echo subscription for collection `create` bindings.
    create_echo: Option<SubscriptionId>,
}

/// Per-object subscription bookkeeping.
#[derive(Default)]
pub struct Bindings {
    table: Mutex<BindingTable>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound event names, sorted.
    pub fn event_names(&self) -> Vec<String> {
        self.table.lock().entries.keys().cloned().collect()
    }

    /// Entries for one event, in bind order.
    pub fn entries(&self, event: &str) -> Vec<SubscriptionEntry> {
        self.table
            .lock()
            .entries
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_bound(&self, event: &str) -> bool {
        self.table.lock().entries.contains_key(event)
    }

    /// Total number of entries across all events.
    pub fn len(&self) -> usize {
        self.table.lock().entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }

    /// The shared `create` echo subscription, if one is open.
    pub fn echo_subscription(&self) -> Option<SubscriptionId> {
        self.table.lock().create_echo
    }
}

/// Keep only the items of an inbound body that carry an `id` key.
///
/// An array is filtered item by item; a single object counts as one item.
pub fn identified_items(body: Value) -> Vec<Value> {
    let has_id = |v: &Value| v.as_object().is_some_and(|o| o.contains_key("id"));
    match body {
        Value::Array(items) => items.into_iter().filter(has_id).collect(),
        obj @ Value::Object(_) if has_id(&obj) => vec![obj],
        _ => Vec::new(),
    }
}

/// Build the subscription callback that re-triggers frames as local events.
///
/// Holds the events weakly: frames arriving after the object is dropped
/// are ignored.
fn inbound_handler(kind: BindKind, event: String, events: Weak<Events>) -> FrameHandler {
    Arc::new(move |frame: &Frame| {
        let Some(events) = events.upgrade() else {
            return Ok(());
        };
        let items = identified_items(frame.json_body()?);
        tracing::debug!(event = %event, items = items.len(), "inbound topic message");

        match kind {
            BindKind::Collection => {
                for item in items {
                    events.trigger(&event, std::slice::from_ref(&item));
                }
            }
            BindKind::Record => {
                if !items.is_empty() {
                    events.trigger(&event, &items);
                }
            }
        }
        Ok(())
    })
}

/// Bridge between an object's local events and a broker topic namespace.
///
/// Implementors supply their topic base, local event registry and binding
/// table; the binding protocol itself comes from the provided methods.
pub trait Bindable: Send + Sync {
    fn kind(&self) -> BindKind;

    /// Topic prefix for this object, e.g. `/topic/app.todos` or
    /// `/topic/app.todos.3`.
    fn topic_base(&self) -> Result<String>;

    fn events(&self) -> &Arc<Events>;

    fn bindings(&self) -> &Bindings;

    /// Topic carrying `event` for this object.
    fn topic_for(&self, event: &str) -> Result<String> {
        Ok(format!("{}.{}", self.topic_base()?, event))
    }

    /// Register `callback` for `event` and subscribe to its topic.
    ///
    /// Every call adds its own subscription, even for an identical topic.
    fn bind(&self, event: &str, transport: &dyn Transport, callback: Listener) -> Result<()> {
        let topic = self.topic_for(event)?;
        let mut table = self.bindings().table.lock();

        let handler = inbound_handler(self.kind(), event.to_string(), Arc::downgrade(self.events()));
        let subscription = transport.subscribe(&topic, Arc::clone(&handler))?;

        let wants_echo = self.kind() == BindKind::Collection
            && event == CREATE_EVENT
            && table.create_echo.is_none();
        if wants_echo {
            let echo_topic = format!("{}.{}", topic, transport.client_id());
            match transport.subscribe(&echo_topic, handler) {
                Ok(id) => table.create_echo = Some(id),
                Err(e) => {
                    if let Err(undo) = transport.unsubscribe(subscription) {
                        tracing::warn!(%subscription, error = %undo, "could not roll back subscription");
                    }
                    return Err(e);
                }
            }
        }

        self.events().on(event, Arc::clone(&callback));
        table
            .entries
            .entry(event.to_string())
            .or_default()
            .push(SubscriptionEntry {
                event: event.to_string(),
                topic: topic.clone(),
                callback,
                subscription,
            });

        tracing::debug!(event, topic = %topic, %subscription, "bound");
        Ok(())
    }

    /// Remove bindings for `event`.
    ///
    /// With a callback, only entries holding that exact listener go. Without
    /// one, every listener for the event is removed and every entry's
    /// subscription is cancelled. All matching entries are torn down even if
    /// an unsubscribe fails; the first failure is returned.
    fn unbind(
        &self,
        event: &str,
        transport: &dyn Transport,
        callback: Option<&Listener>,
    ) -> Result<()> {
        let mut table = self.bindings().table.lock();
        let Some(entries) = table.entries.remove(event) else {
            return Ok(());
        };

        let (removed, kept): (Vec<_>, Vec<_>) = match callback {
            Some(cb) => entries
                .into_iter()
                .partition(|entry| Arc::ptr_eq(&entry.callback, cb)),
            None => {
                self.events().off(event, None);
                (entries, Vec::new())
            }
        };

        let mut first_error: Option<BindError> = None;
        for entry in &removed {
            if callback.is_some() {
                self.events().off(event, Some(&entry.callback));
            }
            if let Err(e) = transport.unsubscribe(entry.subscription) {
                tracing::warn!(event, subscription = %entry.subscription, error = %e, "unsubscribe failed");
                first_error.get_or_insert(e);
            }
        }

        if !kept.is_empty() {
            table.entries.insert(event.to_string(), kept);
        } else if event == CREATE_EVENT {
            if let Some(echo) = table.create_echo.take() {
                if let Err(e) = transport.unsubscribe(echo) {
                    tracing::warn!(subscription = %echo, error = %e, "echo unsubscribe failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::debug!(event, removed = removed.len(), "unbound");
        first_error.map_or(Ok(()), Err)
    }

    /// Unbind every registered callback of every bound event.
    fn unbind_all(&self, transport: &dyn Transport) -> Result<()> {
        let bound: Vec<(String, Listener)> = {
            let table = self.bindings().table.lock();
            table
                .entries
                .iter()
                .flat_map(|(event, entries)| {
                    entries
                        .iter()
                        .map(move |entry| (event.clone(), Arc::clone(&entry.callback)))
                })
                .collect()
        };

        let mut first_error = None;
        for (event, callback) in bound {
            if let Err(e) = self.unbind(&event, transport, Some(&callback)) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identified_items_filters_missing_id() {
        let body = json!([{"id": "1"}, {"title": "no id"}, {"id": null}, 7]);
        let items = identified_items(body);
        assert_eq!(items, vec![json!({"id": "1"}), json!({"id": null})]);
    }

    #[test]
    fn test_identified_items_single_object() {
        assert_eq!(identified_items(json!({"id": 3})), vec![json!({"id": 3})]);
        assert!(identified_items(json!({"title": "x"})).is_empty());
        assert!(identified_items(json!("ping")).is_empty());
    }
}
