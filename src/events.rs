//! Local event registry owned by every bindable object.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A local event listener. Identity is the `Arc` pointer.
pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&[Value]) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Named listener lists with bind/trigger/unbind semantics.
#[derive(Default)]
pub struct Events {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `name`. The same listener may be added twice.
    pub fn on(&self, name: &str, listener: Listener) {
        self.listeners
            .write()
            .entry(name.to_string())
            .or_default()
            .push(listener);
    }

    /// Remove listeners for `name`: only those identical to `listener`, or
    /// all of them when `None`. Returns the number removed.
    pub fn off(&self, name: &str, listener: Option<&Listener>) -> usize {
        let mut map = self.listeners.write();
        let Some(list) = map.get_mut(name) else {
            return 0;
        };

        let before = list.len();
        match listener {
            Some(target) => list.retain(|l| !Arc::ptr_eq(l, target)),
            None => list.clear(),
        }
        let removed = before - list.len();

        if list.is_empty() {
            map.remove(name);
        }
        removed
    }

    /// Call every listener for `name` with `args`. Returns how many ran.
    pub fn trigger(&self, name: &str, args: &[Value]) -> usize {
        // Snapshot so listeners may bind or unbind while running.
        let snapshot: Vec<Listener> = match self.listeners.read().get(name) {
            Some(list) => list.clone(),
            None => return 0,
        };
        for l in &snapshot {
            l(args);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.read().get(name).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_trigger_passes_args() {
        let events = Events::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = seen.clone();
        events.on("update", listener(move |args| sink.write().extend_from_slice(args)));

        assert_eq!(events.trigger("update", &[json!({"id": "1"})]), 1);
        assert_eq!(seen.read().as_slice(), &[json!({"id": "1"})]);
        assert_eq!(events.trigger("delete", &[]), 0);
    }

    #[test]
    fn test_off_by_identity() {
        let events = Events::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = hits.clone();
        let a = listener(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let b = listener(|_| {});

        events.on("create", a.clone());
        events.on("create", b.clone());
        assert_eq!(events.off("create", Some(&a)), 1);
        assert_eq!(events.listener_count("create"), 1);

        events.trigger("create", &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(events.off("create", Some(&b)), 1);
        assert!(events.is_empty());
    }

    #[test]
    fn test_off_all() {
        let events = Events::new();
        events.on("read", listener(|_| {}));
        events.on("read", listener(|_| {}));
        assert_eq!(events.off("read", None), 2);
        assert_eq!(events.listener_count("read"), 0);
        assert_eq!(events.off("read", None), 0);
    }
}
