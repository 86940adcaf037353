//! References - stable identities for records.
//!
//! The [`ReferenceTable`] is an arena of [`Reference`]s addressed by
//! [`ReferenceId`]. Record arrays hold `ReferenceId`s, and each reference
//! holds the [`ArrayId`]s of the arrays it belongs to, so removal from every
//! containing array never scans array contents.

use crate::record::Record;
use crate::{ArrayId, RecordId, TypeKey};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Handle into the [`ReferenceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceId(pub(crate) usize);

impl ReferenceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Raw data held by a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    /// Known identity, nothing loaded yet
    Unloaded,
    /// Created locally and not yet saved
    Created,
    /// Raw payload from the adapter
    Loaded(Value),
}

/// Stable identity of one record.
#[derive(Debug, Clone)]
pub struct Reference {
    pub(crate) type_key: TypeKey,
    pub(crate) id: RecordId,
    pub(crate) data: RecordData,
    pub(crate) record: Option<Record>,
    pub(crate) record_arrays: BTreeSet<ArrayId>,
    pub(crate) loading_record_arrays: Vec<ArrayId>,
}

impl Reference {
    fn new(type_key: TypeKey, id: RecordId) -> Self {
        Self {
            type_key,
            id,
            data: RecordData::Unloaded,
            record: None,
            record_arrays: BTreeSet::new(),
            loading_record_arrays: Vec::new(),
        }
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// The materialized record, if one exists.
    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    /// Arrays currently containing this reference.
    pub fn record_arrays(&self) -> &BTreeSet<ArrayId> {
        &self.record_arrays
    }

    /// Many-arrays waiting for this reference to load.
    pub fn loading_record_arrays(&self) -> &[ArrayId] {
        &self.loading_record_arrays
    }

    /// Whether the reference has data (loaded, or created locally).
    pub fn has_data(&self) -> bool {
        !matches!(self.data, RecordData::Unloaded)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.data, RecordData::Loaded(_))
    }

    pub fn is_deleted(&self) -> bool {
        self.record.as_ref().is_some_and(Record::is_deleted)
    }

    /// Whether filtered arrays may contain this reference at all.
    pub fn is_live(&self) -> bool {
        self.has_data() && !self.is_deleted()
    }
}

#[derive(Debug, Clone, Default)]
struct TypeMap {
    ids: HashMap<RecordId, ReferenceId>,
    references: Vec<ReferenceId>,
}

/// Arena of all references known to a store, indexed by type and id.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: Vec<Reference>,
    types: HashMap<TypeKey, TypeMap>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the reference for an identity, creating an unloaded one if needed.
    pub fn reference_for(&mut self, type_key: &str, id: &str) -> ReferenceId {
        if let Some(existing) = self.lookup(type_key, id) {
            return existing;
        }

        let reference = ReferenceId(self.entries.len());
        self.entries
            .push(Reference::new(type_key.to_string(), id.to_string()));

        let type_map = self.types.entry(type_key.to_string()).or_default();
        type_map.ids.insert(id.to_string(), reference);
        type_map.references.push(reference);

        reference
    }

    /// Find an existing reference without creating one.
    pub fn lookup(&self, type_key: &str, id: &str) -> Option<ReferenceId> {
        self.types.get(type_key)?.ids.get(id).copied()
    }

    pub fn get(&self, reference: ReferenceId) -> Option<&Reference> {
        self.entries.get(reference.0)
    }

    pub fn get_mut(&mut self, reference: ReferenceId) -> Option<&mut Reference> {
        self.entries.get_mut(reference.0)
    }

    /// All identities of a type, in creation order.
    pub fn references_for_type(&self, type_key: &str) -> &[ReferenceId] {
        self.types
            .get(type_key)
            .map(|t| t.references.as_slice())
            .unwrap_or(&[])
    }

    /// Get the materialized record, materializing it from loaded data.
    ///
    /// Returns `None` for references without data.
    pub fn record_for(&mut self, reference: ReferenceId) -> Option<&Record> {
        let entry = self.entries.get_mut(reference.0)?;
        if entry.record.is_none() {
            let record = match &entry.data {
                RecordData::Loaded(data) => {
                    Record::loaded(entry.id.clone(), entry.type_key.clone(), data.clone())
                }
                RecordData::Created => Record::created(
                    entry.id.clone(),
                    entry.type_key.clone(),
                    Value::Object(Default::default()),
                ),
                RecordData::Unloaded => return None,
            };
            entry.record = Some(record);
        }
        entry.record.as_ref()
    }

    pub fn record_mut(&mut self, reference: ReferenceId) -> Option<&mut Record> {
        self.record_for(reference)?;
        self.entries.get_mut(reference.0)?.record.as_mut()
    }

    pub fn is_live(&self, reference: ReferenceId) -> bool {
        self.get(reference).is_some_and(Reference::is_live)
    }

    /// Store loaded data on a reference, refreshing a clean record.
    pub(crate) fn set_loaded(&mut self, reference: ReferenceId, data: Value) {
        if let Some(entry) = self.entries.get_mut(reference.0) {
            if let Some(record) = entry.record.as_mut() {
                record.reload(&data);
            }
            entry.data = RecordData::Loaded(data);
        }
    }

    /// Number of references across all types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract the id of a raw payload as a string.
///
/// Numeric ids are stringified; payloads without a usable id yield `None`.
pub fn extract_id(payload: &Value) -> Option<RecordId> {
    match payload.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
