//! Materialized records.

use crate::{RecordId, TypeKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of a materialized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Created locally, never saved
    New,
    /// Matches the last data loaded or saved
    Clean,
    /// Has local attribute changes
    Dirty,
    /// Deleted locally (saved or not)
    Deleted,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::New => write!(f, "new"),
            RecordState::Clean => write!(f, "clean"),
            RecordState::Dirty => write!(f, "dirty"),
            RecordState::Deleted => write!(f, "deleted"),
        }
    }
}

/// The in-memory object for one reference.
///
/// Filters are evaluated against records, never against raw reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub type_key: TypeKey,
    /// Current attribute values (JSON object)
    pub attributes: Value,
    pub state: RecordState,
}

impl Record {
    /// Materialize a record from loaded data.
    pub fn loaded(id: impl Into<RecordId>, type_key: impl Into<TypeKey>, data: Value) -> Self {
        Self {
            id: id.into(),
            type_key: type_key.into(),
            attributes: without_id(data),
            state: RecordState::Clean,
        }
    }

    /// Create a record that has not been saved yet.
    pub fn created(
        id: impl Into<RecordId>,
        type_key: impl Into<TypeKey>,
        attributes: Value,
    ) -> Self {
        Self {
            id: id.into(),
            type_key: type_key.into(),
            attributes: without_id(attributes),
            state: RecordState::New,
        }
    }

    /// Get an attribute value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Set an attribute value, marking a clean record dirty.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        if !self.attributes.is_object() {
            self.attributes = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.attributes {
            map.insert(key.into(), value);
        }
        if self.state == RecordState::Clean {
            self.state = RecordState::Dirty;
        }
    }

    pub fn is_new(&self) -> bool {
        self.state == RecordState::New
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, RecordState::New | RecordState::Dirty)
    }

    pub fn is_deleted(&self) -> bool {
        self.state == RecordState::Deleted
    }

    /// Mark record as deleted.
    pub fn mark_deleted(&mut self) {
        self.state = RecordState::Deleted;
    }

    /// Replace attributes with data loaded from the adapter.
    ///
    /// Local changes win over reloads: dirty, new and deleted records keep
    /// their attributes.
    pub fn reload(&mut self, data: &Value) {
        if self.state == RecordState::Clean {
            self.attributes = without_id(data.clone());
        }
    }

    /// Acknowledge a successful save, adopting the returned payload if any.
    pub fn did_commit(&mut self, payload: Option<&Value>) {
        if let Some(data) = payload {
            self.attributes = without_id(data.clone());
        }
        if self.state != RecordState::Deleted {
            self.state = RecordState::Clean;
        }
    }

    /// Serialize attributes together with the record id.
    pub fn to_json(&self) -> Value {
        let mut map = match &self.attributes {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        map.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(map)
    }
}

fn without_id(data: Value) -> Value {
    match data {
        Value::Object(mut map) => {
            map.remove("id");
            Value::Object(map)
        }
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}
