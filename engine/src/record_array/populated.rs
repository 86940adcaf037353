use super::ArrayContent;
use crate::{ReferenceId, TypeKey};
use serde_json::Value;

/// Record array whose members are chosen by an adapter query.
#[derive(Debug)]
pub struct AdapterPopulatedRecordArray {
    type_key: TypeKey,
    query: Value,
    pub(crate) content: ArrayContent,
    is_loaded: bool,
}

impl AdapterPopulatedRecordArray {
    pub fn new(type_key: impl Into<TypeKey>, query: Value) -> Self {
        Self {
            type_key: type_key.into(),
            query,
            content: ArrayContent::default(),
            is_loaded: false,
        }
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// The query passed through to the adapter.
    pub fn query(&self) -> &Value {
        &self.query
    }

    pub fn content(&self) -> &[ReferenceId] {
        self.content.as_slice()
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    /// Replace the members with a query result, returning the old members.
    pub(crate) fn load(&mut self, references: &[ReferenceId]) -> Vec<ReferenceId> {
        let previous = self.content.take();
        for &reference in references {
            self.content.add(reference);
        }
        self.is_loaded = true;
        previous
    }
}
