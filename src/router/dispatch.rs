//! Frame dispatch for the demo topic router.

use crate::error::{BindError, Result};
use crate::types::{Command, ConnectionState, Frame, CLIENT_ID_HEADER, FROM_SERVER_HEADER};
use serde_json::Value;

use super::route::{Action, Route};
use super::store::{Record, RecordStore};

/// Payload of the keep-alive message.
pub const PING_MESSAGE: &str = "ping";

/// Something the router wants done on its broker connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Broker-level subscription whose frames come back to the router.
    Subscribe { destination: String },
    Publish {
        destination: String,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    },
}

impl Outbound {
    fn from_server(destination: String, body: &Value) -> Result<Self> {
        Ok(Outbound::Publish {
            destination,
            body: serde_json::to_vec(body)?,
            headers: vec![(FROM_SERVER_HEADER.to_string(), "true".to_string())],
        })
    }
}

/// Router configuration.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Topic namespace, e.g. `/topic/backbonestomp`.
    pub topic_prefix: String,
    /// The one resource this router serves, e.g. `todos`.
    pub resource: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "/topic/backbonestomp".to_string(),
            resource: "todos".to_string(),
        }
    }
}

/// Dispatches inbound frames to store operations.
///
/// Pure with respect to I/O: every effect on the connection is returned as
/// [`Outbound`] values for the caller to apply.
pub struct TopicRouter {
    config: RouterConfig,
    store: RecordStore,
    state: ConnectionState,
}

impl TopicRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            store: RecordStore::new(),
            state: ConnectionState::Disconnected,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// The socket is open and CONNECT has been sent.
    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// The wildcard subscription has been sent to the broker.
    pub fn subscribed(&mut self) {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Subscribed;
        }
    }

    /// The connection has gone away.
    pub fn disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Wildcard covering every destination of the served resource.
    pub fn wildcard(&self) -> String {
        format!("{}.{}.>", self.config.topic_prefix, self.config.resource)
    }

    /// Destination of the resource's `create` broadcast.
    fn create_topic(&self) -> String {
        Route {
            resource: self.config.resource.clone(),
            id: None,
            action: Action::Create,
        }
        .destination(&self.config.topic_prefix)
    }

    /// Keep-alive publication, only while connected.
    pub fn ping(&self) -> Option<Outbound> {
        self.state.is_connected().then(|| Outbound::Publish {
            destination: format!("{}.ping", self.config.topic_prefix),
            body: PING_MESSAGE.as_bytes().to_vec(),
            headers: Vec::new(),
        })
    }

    /// Handle one inbound frame.
    ///
    /// Malformed JSON, missing reply headers and broker ERROR frames are
    /// returned as errors; the store is left untouched in that case.
    ///
    /// CONNECTED moves the router to `Connected` and asks for the wildcard
    /// subscription; call [`TopicRouter::subscribed`] once it is sent.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<Outbound>> {
        match frame.command {
            Command::Connected => {
                tracing::debug!(headers = ?frame.headers, "received CONNECTED");
                self.state = ConnectionState::Connected;
                let destination = self.wildcard();
                tracing::debug!(destination = %destination, "subscribing");
                Ok(vec![Outbound::Subscribe { destination }])
            }
            Command::Error => {
                let message = frame
                    .header("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body_lossy().into_owned());
                Err(BindError::Broker(message))
            }
            Command::Message => self.dispatch(frame),
            other => {
                tracing::debug!(command = %other, "ignoring frame");
                Ok(Vec::new())
            }
        }
    }

    fn dispatch(&mut self, frame: &Frame) -> Result<Vec<Outbound>> {
        let destination = frame
            .destination()
            .ok_or(BindError::MissingHeader("destination"))?;
        let route = match Route::parse(&self.config.topic_prefix, destination) {
            Some(route) if route.resource == self.config.resource => route,
            _ => {
                tracing::trace!(destination, "unrouted message");
                return Ok(Vec::new());
            }
        };
        tracing::info!(destination, action = %route.action, "got a message");

        match (route.action, route.id.as_deref()) {
            (Action::Read, _) => self.read(frame),
            (Action::Create, _) => self.create(frame),
            (Action::Update, Some(id)) => self.update(frame, id),
            (Action::Delete, Some(id)) => {
                self.delete(id);
                Ok(Vec::new())
            }
            (Action::Update | Action::Delete, None) => Ok(Vec::new()),
        }
    }

    fn read(&self, frame: &Frame) -> Result<Vec<Outbound>> {
        let client = frame
            .header(CLIENT_ID_HEADER)
            .ok_or(BindError::MissingHeader(CLIENT_ID_HEADER))?;
        let reply = Value::Array(self.store.all());
        let destination = format!("{}.{client}", self.create_topic());
        Ok(vec![Outbound::from_server(destination, &reply)?])
    }

    fn create(&mut self, frame: &Frame) -> Result<Vec<Outbound>> {
        if frame.is_from_server() {
            return Ok(Vec::new());
        }
        let items = items(frame)?;

        let created: Vec<Value> = items
            .into_iter()
            .map(|item| {
                tracing::info!(item = ?item, "creating");
                Value::Object(self.store.create(item))
            })
            .collect();
        if created.is_empty() {
            return Ok(Vec::new());
        }

        let destination = self.create_topic();
        Ok(vec![Outbound::from_server(destination, &Value::Array(created))?])
    }

    fn update(&mut self, frame: &Frame, id: &str) -> Result<Vec<Outbound>> {
        for item in items(frame)? {
            tracing::info!(id, "updating");
            if !self.store.update(id, item) {
                tracing::warn!(id, "could not find record to update");
            }
        }
        Ok(Vec::new())
    }

    fn delete(&mut self, id: &str) {
        tracing::info!(id, "deleting");
        if self.store.delete(id) {
            tracing::info!(id, "found and deleted");
        } else {
            tracing::warn!(id, "could not find record to delete");
        }
    }
}

/// Object items of a frame body; a lone object counts as one item.
fn items(frame: &Frame) -> Result<Vec<Record>> {
    let list = match frame.json_body()? {
        Value::Array(list) => list,
        obj @ Value::Object(_) => vec![obj],
        Value::Null => return Err(BindError::NotAnArray("null")),
        Value::Bool(_) => return Err(BindError::NotAnArray("a boolean")),
        Value::Number(_) => return Err(BindError::NotAnArray("a number")),
        Value::String(_) => return Err(BindError::NotAnArray("a string")),
    };

    Ok(list
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            other => {
                tracing::warn!(item = %other, "skipping non-object item");
                None
            }
        })
        .collect())
}
