//! Record and collection objects that carry the binding capability.

use crate::error::{BindError, Result};
use crate::events::Events;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::bindable::{BindKind, Bindable, Bindings};

/// A plural reactive object addressed by a fixed url.
pub struct Collection {
    url: String,
    events: Arc<Events>,
    bindings: Bindings,
}

impl Collection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            events: Arc::new(Events::new()),
            bindings: Bindings::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A new, unsaved record belonging to this collection.
    pub fn new_model(&self) -> Model {
        Model::new().in_collection(self)
    }
}

impl Bindable for Collection {
    fn kind(&self) -> BindKind {
        BindKind::Collection
    }

    fn topic_base(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    fn events(&self) -> &Arc<Events> {
        &self.events
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

/// A singular reactive object.
///
/// Its url is `url_root` (or the owning collection's url) followed by
/// `.<id>` once the record has an id.
pub struct Model {
    url_root: Option<String>,
    collection_url: Option<String>,
    attributes: RwLock<Map<String, Value>>,
    events: Arc<Events>,
    bindings: Bindings,
}

impl Model {
    pub fn new() -> Self {
        Self {
            url_root: None,
            collection_url: None,
            attributes: RwLock::new(Map::new()),
            events: Arc::new(Events::new()),
            bindings: Bindings::new(),
        }
    }

    pub fn with_url_root(mut self, url_root: impl Into<String>) -> Self {
        self.url_root = Some(url_root.into());
        self
    }

    pub fn in_collection(mut self, collection: &Collection) -> Self {
        self.collection_url = Some(collection.url().to_string());
        self
    }

    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.set_id(id);
        self
    }

    pub fn with_attributes(self, attributes: Map<String, Value>) -> Self {
        self.set(attributes);
        self
    }

    /// The record id, taken from the `id` attribute.
    pub fn id(&self) -> Option<String> {
        match self.attributes.read().get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn set_id(&self, id: impl Into<String>) {
        self.attributes
            .write()
            .insert("id".to_string(), Value::String(id.into()));
    }

    /// A record without an id has not been created on the server yet.
    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.attributes.read().get(key).cloned()
    }

    /// Shallow-merge `attributes` into the record.
    pub fn set(&self, attributes: Map<String, Value>) {
        self.attributes.write().extend(attributes);
    }

    pub fn attributes(&self) -> Map<String, Value> {
        self.attributes.read().clone()
    }

    /// Dotted url used as this record's topic base.
    pub fn url(&self) -> Result<String> {
        let base = self
            .url_root
            .as_deref()
            .or(self.collection_url.as_deref())
            .ok_or(BindError::MissingUrl)?;

        let Some(id) = self.id() else {
            return Ok(base.to_string());
        };
        let sep = if base.ends_with('.') { "" } else { "." };
        Ok(format!("{base}{sep}{}", urlencoding::encode(&id)))
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Bindable for Model {
    fn kind(&self) -> BindKind {
        BindKind::Record
    }

    fn topic_base(&self) -> Result<String> {
        self.url()
    }

    fn events(&self) -> &Arc<Events> {
        &self.events
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}
