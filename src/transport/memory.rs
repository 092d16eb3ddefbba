//! In-process topic broker.

use crate::error::{BindError, Result};
use crate::types::{ClientId, Frame, SubscriptionId, CLIENT_ID_HEADER};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::{FrameHandler, Transport};

/// Check a destination against a subscription pattern.
///
/// Segments are separated by `.`; `*` matches exactly one segment and a
/// trailing `>` matches one or more segments.
pub fn destination_matches(pattern: &str, destination: &str) -> bool {
    let mut pat = pattern.split('.');
    let mut dest = destination.split('.');

    loop {
        match (pat.next(), dest.next()) {
            (Some(">"), Some(_)) => return pat.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(p), Some(d)) if p == d => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Where a subscription's frames go.
enum Sink {
    Callback(FrameHandler),
    Channel(Sender<Frame>),
}

/// Internal subscription state.
struct Subscription {
    client: ClientId,
    pattern: String,
    sink: Sink,
}

struct BrokerInner {
    /// Active subscriptions by ID. Ordered so delivery is deterministic.
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Counter for generating message IDs.
    next_message: AtomicU64,
}

/// An in-process broker shared by any number of [`MemoryClient`]s.
///
/// Delivery is synchronous: `publish` returns after every matching
/// subscription has seen the frame.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                subscriptions: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                next_message: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new client connection with a fresh client id.
    pub fn connect(&self) -> MemoryClient {
        self.connect_as(ClientId::generate())
    }

    /// Open a client connection with a chosen client id.
    pub fn connect_as(&self, client_id: ClientId) -> MemoryClient {
        MemoryClient {
            broker: Arc::clone(&self.inner),
            client_id,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live subscriptions across all clients.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Live subscription patterns, in subscription order.
    pub fn destinations(&self) -> Vec<String> {
        self.inner
            .subscriptions
            .read()
            .values()
            .map(|s| s.pattern.clone())
            .collect()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a channel-backed subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive frames.
    pub receiver: Receiver<Frame>,
}

impl SubscriptionHandle {
    /// Receive the next frame (blocking).
    pub fn recv(&self) -> std::result::Result<Frame, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a frame (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<Frame, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<Frame, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// One client connection to a [`MemoryBroker`].
pub struct MemoryClient {
    broker: Arc<BrokerInner>,
    client_id: ClientId,
    closed: AtomicBool,
}

impl MemoryClient {
    /// Close the connection and drop its subscriptions. Later calls fail.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.broker
            .subscriptions
            .write()
            .retain(|_, sub| sub.client != self.client_id);
        tracing::debug!(client = %self.client_id, "memory client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe with a bounded channel instead of a callback.
    ///
    /// A subscriber whose buffer is full when a frame arrives is dropped.
    pub fn subscribe_channel(
        &self,
        destination: &str,
        buffer_size: usize,
    ) -> Result<SubscriptionHandle> {
        let (sender, receiver) = bounded(buffer_size);
        let id = self.register(destination, Sink::Channel(sender))?;
        Ok(SubscriptionHandle { id, receiver })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BindError::TransportClosed)
        } else {
            Ok(())
        }
    }

    fn register(&self, destination: &str, sink: Sink) -> Result<SubscriptionId> {
        self.ensure_open()?;
        let id = SubscriptionId(self.broker.next_id.fetch_add(1, Ordering::SeqCst));
        self.broker.subscriptions.write().insert(
            id,
            Subscription {
                client: self.client_id.clone(),
                pattern: destination.to_string(),
                sink,
            },
        );
        tracing::debug!(client = %self.client_id, %id, destination, "subscribed");
        Ok(id)
    }
}

impl Transport for MemoryClient {
    fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    fn subscribe(&self, destination: &str, handler: FrameHandler) -> Result<SubscriptionId> {
        self.register(destination, Sink::Callback(handler))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.ensure_open()?;
        let mut subs = self.broker.subscriptions.write();
        match subs.get(&id) {
            Some(sub) if sub.client == self.client_id => {
                subs.remove(&id);
                tracing::debug!(client = %self.client_id, %id, "unsubscribed");
                Ok(())
            }
            _ => Err(BindError::SubscriptionNotFound(id)),
        }
    }

    fn publish(&self, destination: &str, body: &[u8], headers: &[(&str, &str)]) -> Result<()> {
        self.ensure_open()?;

        let message_id = self.broker.next_message.fetch_add(1, Ordering::SeqCst);
        let base = Frame::message(destination, body.to_vec())
            .with_header("message-id", message_id.to_string())
            .with_header(CLIENT_ID_HEADER, self.client_id.as_str())
            .with_headers(headers.iter().copied());

        // Collect targets first so handlers may subscribe or publish.
        let mut callbacks = Vec::new();
        let mut to_remove = Vec::new();
        {
            let subs = self.broker.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !destination_matches(&sub.pattern, destination) {
                    continue;
                }
                let frame = base.clone().with_header("subscription", id.to_string());
                match &sub.sink {
                    Sink::Callback(handler) => callbacks.push((*id, Arc::clone(handler), frame)),
                    Sink::Channel(sender) => {
                        if sender.try_send(frame).is_err() {
                            to_remove.push(*id);
                        }
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.broker.subscriptions.write();
            for id in to_remove {
                tracing::warn!(%id, "dropping slow subscriber");
                subs.remove(&id);
            }
        }

        let mut first_error = None;
        for (id, handler, frame) in callbacks {
            if let Err(e) = handler(&frame) {
                tracing::error!(%id, destination, error = %e, "subscription handler failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
