//! In-memory record store backing the demo router.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A stored record: a JSON object whose `id` is a string.
pub type Record = Map<String, Value>;

/// Records keyed by a serial id that is never reused.
///
/// Unbounded and not persisted.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: BTreeMap<u64, Record>,
    serial: u64,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an id string onto its serial. Only the exact string the store
    /// assigned matches; `"01"` or `"+1"` name no record.
    fn key(id: &str) -> Option<u64> {
        id.parse::<u64>()
            .ok()
            .filter(|serial| serial.to_string() == id)
    }

    /// Store `item` under the next serial id, ignoring any id it carries.
    ///
    /// Returns the stored record, id included.
    pub fn create(&mut self, mut item: Record) -> Record {
        item.remove("id");
        self.serial += 1;
        item.insert("id".to_string(), Value::String(self.serial.to_string()));
        self.records.insert(self.serial, item.clone());
        item
    }

    /// Shallow-merge `fields` into record `id`. The `id` field itself is
    /// never overwritten. Returns false if no such record exists.
    pub fn update(&mut self, id: &str, mut fields: Record) -> bool {
        fields.remove("id");
        match Self::key(id).and_then(|k| self.records.get_mut(&k)) {
            Some(record) => {
                record.extend(fields);
                true
            }
            None => false,
        }
    }

    /// Remove record `id`. Returns false if no such record exists.
    pub fn delete(&mut self, id: &str) -> bool {
        Self::key(id)
            .and_then(|k| self.records.remove(&k))
            .is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        Self::key(id).and_then(|k| self.records.get(&k))
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Vec<Value> {
        self.records.values().cloned().map(Value::Object).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
