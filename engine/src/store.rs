//! Store - the in-memory record container.
//!
//! The Store owns the identity table, the record array manager, the run loop
//! and the adapter. Every mutation goes through
//! [`Store::reference_did_change`], which queues the reference and schedules a
//! single coalesced flush for the end of the current tick.

use crate::adapter::Adapter;
use crate::instrumentation::{Instrumentation, FIND_OPERATION};
use crate::manager::{FlushSummary, RecordArrayManager};
use crate::record::{Record, RecordState};
use crate::record_array::{
    ArrayId, FilterFn, FilteredRecordArray, ManyArray, ManyArrayConfig, RecordArray,
};
use crate::reference::{extract_id, RecordData, Reference, ReferenceId, ReferenceTable};
use crate::run_loop::Scheduler;
use crate::schema::{RelationshipDescriptor, RelationshipKind, Schema};
use crate::{error::Result, Deferred, Error, RecordId, Timestamp, TypeKey};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Run-loop key of the record array flush.
const UPDATE_RECORD_ARRAYS: &str = "updateRecordArrays";

/// The record store.
pub struct Store {
    schema: Schema,
    adapter: Rc<dyn Adapter>,
    references: ReferenceTable,
    manager: RecordArrayManager,
    scheduler: Scheduler<Store>,
    instrumentation: Instrumentation,
    /// Type -> unfiltered array returned by `all`
    all_arrays: HashMap<TypeKey, ArrayId>,
    /// (owner, relationship key) -> many-array
    has_many_arrays: HashMap<(ReferenceId, String), ArrayId>,
    last_flush: Option<FlushSummary>,
    flush_count: usize,
}

impl Store {
    /// Create a store that owns its adapter.
    pub fn new<A: Adapter + 'static>(schema: Schema, adapter: A) -> Self {
        Self::with_adapter(schema, Rc::new(adapter))
    }

    /// Create a store around a shared adapter.
    pub fn with_adapter(schema: Schema, adapter: Rc<dyn Adapter>) -> Self {
        Self {
            schema,
            adapter,
            references: ReferenceTable::new(),
            manager: RecordArrayManager::new(),
            scheduler: Scheduler::new(),
            instrumentation: Instrumentation::new(),
            all_arrays: HashMap::new(),
            has_many_arrays: HashMap::new(),
            last_flush: None,
            flush_count: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Run loop shared with adapters.
    pub fn scheduler(&self) -> &Scheduler<Store> {
        &self.scheduler
    }

    /// Current virtual time.
    pub fn now(&self) -> Timestamp {
        self.scheduler.now()
    }

    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    pub fn manager(&self) -> &RecordArrayManager {
        &self.manager
    }

    pub fn instrumentation(&mut self) -> &mut Instrumentation {
        &mut self.instrumentation
    }

    /// Summary of the most recent flush.
    pub fn last_flush(&self) -> Option<FlushSummary> {
        self.last_flush
    }

    /// Number of flushes run so far.
    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Get or create the reference for an identity of a known type.
    pub fn reference_for(&mut self, type_key: &str, id: &str) -> Result<ReferenceId> {
        self.schema.model(type_key)?;
        Ok(self.references.reference_for(type_key, id))
    }

    pub fn reference(&self, reference: ReferenceId) -> Option<&Reference> {
        self.references.get(reference)
    }

    /// Find an existing reference without creating one.
    pub fn lookup(&self, type_key: &str, id: &str) -> Option<ReferenceId> {
        self.references.lookup(type_key, id)
    }

    /// The record of a reference, if it has been materialized.
    pub fn record(&self, reference: ReferenceId) -> Option<&Record> {
        self.references.get(reference)?.record()
    }

    /// The record of a reference, materializing it from loaded data.
    pub fn record_for_reference(&mut self, reference: ReferenceId) -> Option<&Record> {
        self.references.record_for(reference)
    }

    // ------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------

    /// Queue a reference for the end-of-tick flush.
    pub fn reference_did_change(&mut self, reference: ReferenceId) {
        self.manager.reference_did_change(reference);
        self.scheduler.once(UPDATE_RECORD_ARRAYS, |store: &mut Store| {
            store.update_record_arrays();
        });
    }

    /// Flush queued changes into every record array now.
    pub fn update_record_arrays(&mut self) -> FlushSummary {
        let summary = self.manager.update_record_arrays(&mut self.references);
        self.last_flush = Some(summary);
        self.flush_count += 1;
        summary
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Push one raw payload into the store.
    pub fn load(&mut self, type_key: &str, payload: Value) -> Result<ReferenceId> {
        self.schema.model(type_key)?;
        let id = extract_id(&payload).ok_or_else(|| Error::MissingId(type_key.to_string()))?;

        let reference = self.references.reference_for(type_key, &id);
        self.references.set_loaded(reference, payload);
        self.reference_did_change(reference);
        Ok(reference)
    }

    /// Push several raw payloads of one type into the store.
    ///
    /// Nothing is loaded unless every payload carries an id.
    pub fn load_many(
        &mut self,
        type_key: &str,
        payloads: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<ReferenceId>> {
        self.schema.model(type_key)?;
        let payloads: Vec<Value> = payloads.into_iter().collect();
        if payloads.iter().any(|payload| extract_id(payload).is_none()) {
            return Err(Error::MissingId(type_key.to_string()));
        }

        payloads
            .into_iter()
            .map(|payload| self.load(type_key, payload))
            .collect()
    }

    /// Load a query result into its target array.
    pub fn load_query_results(
        &mut self,
        array: ArrayId,
        type_key: &str,
        payloads: Vec<Value>,
    ) -> Result<Vec<ReferenceId>> {
        let members = self.load_many(type_key, payloads)?;
        self.manager.populate(&mut self.references, array, &members)?;
        Ok(members)
    }

    /// Load the members of a to-many relationship and reset its array.
    ///
    /// `payload` is a list of raw records of the relationship's target type.
    pub fn load_has_many(
        &mut self,
        owner: ReferenceId,
        key: &str,
        payload: Value,
    ) -> Result<Vec<ReferenceId>> {
        let relationship = self.has_many_relationship(owner, key)?;
        let payloads = match payload {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        };

        let members = self.load_many(&relationship.target_type, payloads)?;
        let array = self.has_many(owner, key)?;
        self.manager
            .update_many_array(&mut self.references, array, &members)?;
        Ok(members)
    }

    // ------------------------------------------------------------------
    // Record lifecycle
    // ------------------------------------------------------------------

    /// Create a new, unsaved record.
    ///
    /// Without an `id` attribute the adapter is asked to generate one.
    pub fn create_record(&mut self, type_key: &str, attributes: Value) -> Result<ReferenceId> {
        self.schema.model(type_key)?;
        let id = match extract_id(&attributes) {
            Some(id) => id,
            None => self
                .adapter
                .generate_id_for_record(type_key)
                .ok_or_else(|| Error::MissingId(type_key.to_string()))?,
        };

        let reference = self.references.reference_for(type_key, &id);
        let entry = self
            .references
            .get_mut(reference)
            .ok_or(Error::ReferenceNotFound(reference.index()))?;
        if entry.has_data() {
            let state = entry
                .record()
                .map_or_else(|| "loaded".to_string(), |record| record.state.to_string());
            return Err(Error::InvalidState {
                type_key: type_key.to_string(),
                id,
                state,
                action: "create".to_string(),
            });
        }

        entry.data = RecordData::Created;
        entry.record = Some(Record::created(id, type_key, attributes));
        self.reference_did_change(reference);
        Ok(reference)
    }

    /// Set one attribute of a record.
    pub fn set_attribute(
        &mut self,
        reference: ReferenceId,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let record = self.loaded_record_mut(reference, "set an attribute")?;
        if record.is_deleted() {
            return Err(invalid_state(record, "set an attribute"));
        }
        record.set(key, value);
        self.reference_did_change(reference);
        Ok(())
    }

    /// Delete a record locally.
    ///
    /// The record leaves every array immediately; many-arrays it owns are
    /// destroyed. Call [`Store::save`] to delete it at the adapter.
    pub fn delete_record(&mut self, reference: ReferenceId) -> Result<()> {
        self.loaded_record_mut(reference, "delete")?.mark_deleted();
        self.manager.remove(&mut self.references, reference);

        let owned: Vec<(ReferenceId, String)> = self
            .has_many_arrays
            .keys()
            .filter(|(owner, _)| *owner == reference)
            .cloned()
            .collect();
        for key in owned {
            if let Some(array) = self.has_many_arrays.remove(&key) {
                self.manager.destroy_array(&mut self.references, array);
            }
        }

        self.reference_did_change(reference);
        Ok(())
    }

    /// Send a record's pending change to the adapter.
    ///
    /// New records are created, dirty records updated and deleted records
    /// deleted. Saving a clean record resolves right away.
    pub fn save(&mut self, reference: ReferenceId) -> Result<Deferred<Option<Value>>> {
        let record = self.loaded_record_mut(reference, "save")?;
        let state = record.state;
        let type_key = record.type_key.clone();

        tracing::debug!(
            type_key = %type_key,
            reference = reference.index(),
            state = %state,
            "saving record"
        );
        let adapter = Rc::clone(&self.adapter);
        match state {
            RecordState::New => adapter.create_record(self, &type_key, reference),
            RecordState::Dirty => adapter.update_record(self, &type_key, reference),
            RecordState::Deleted => adapter.delete_record(self, &type_key, reference),
            RecordState::Clean => Ok(Deferred::resolved(None)),
        }
    }

    /// Acknowledge a save, adopting the adapter's payload if any.
    pub fn did_save_record(
        &mut self,
        reference: ReferenceId,
        payload: Option<Value>,
    ) -> Result<()> {
        let entry = self
            .references
            .get_mut(reference)
            .ok_or(Error::ReferenceNotFound(reference.index()))?;
        if let Some(record) = entry.record.as_mut() {
            record.did_commit(payload.as_ref());
        }

        let data = match payload {
            Some(data) => Some(data),
            None if matches!(entry.data, RecordData::Created) => {
                entry.record.as_ref().map(Record::to_json)
            }
            None => None,
        };
        if let Some(data) = data {
            entry.data = RecordData::Loaded(data);
        }

        self.reference_did_change(reference);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Finders
    // ------------------------------------------------------------------

    /// Find one record by id.
    ///
    /// Returns the reference right away. Records with data resolve
    /// immediately, others are requested from the adapter.
    pub fn find(&mut self, type_key: &str, id: &str) -> Result<(ReferenceId, Deferred<Value>)> {
        self.schema.model(type_key)?;
        let operation = self.instrumentation.begin(
            FIND_OPERATION,
            self.now(),
            json!({ "type": type_key, "id": id }),
        );
        let result = self.fetch(type_key, id);
        self.instrumentation.finish(operation, self.now());
        result
    }

    fn fetch(&mut self, type_key: &str, id: &str) -> Result<(ReferenceId, Deferred<Value>)> {
        let reference = self.references.reference_for(type_key, id);
        let cached = self.references.get(reference).and_then(|entry| match entry.data() {
            RecordData::Loaded(data) => Some(data.clone()),
            RecordData::Created => entry.record().map(Record::to_json),
            RecordData::Unloaded => None,
        });
        if let Some(data) = cached {
            return Ok((reference, Deferred::resolved(data)));
        }

        tracing::debug!(type_key, id, "finding record");
        let adapter = Rc::clone(&self.adapter);
        let deferred = adapter.find(self, type_key, id)?;
        Ok((reference, deferred))
    }

    /// Find several records by id.
    ///
    /// Only identities without data are requested from the adapter; the
    /// deferred resolves with the payloads it returned.
    pub fn find_many(
        &mut self,
        type_key: &str,
        ids: &[RecordId],
    ) -> Result<(Vec<ReferenceId>, Deferred<Vec<Value>>)> {
        self.schema.model(type_key)?;
        let references: Vec<ReferenceId> = ids
            .iter()
            .map(|id| self.references.reference_for(type_key, id))
            .collect();
        let missing: Vec<RecordId> = references
            .iter()
            .filter_map(|&r| self.references.get(r))
            .filter(|entry| !entry.has_data())
            .map(|entry| entry.id().to_string())
            .collect();

        if missing.is_empty() {
            return Ok((references, Deferred::resolved(Vec::new())));
        }
        let adapter = Rc::clone(&self.adapter);
        let deferred = adapter.find_many(self, type_key, &missing)?;
        Ok((references, deferred))
    }

    /// The live array of every record of a type, created on first use.
    pub fn all(&mut self, type_key: &str) -> Result<ArrayId> {
        self.schema.model(type_key)?;
        if let Some(&array) = self.all_arrays.get(type_key) {
            return Ok(array);
        }
        let array = self.manager.register_filtered_record_array(
            &mut self.references,
            FilteredRecordArray::new(type_key, None),
        );
        self.all_arrays.insert(type_key.to_string(), array);
        Ok(array)
    }

    /// Load every record of a type; the returned array is [`Store::all`].
    pub fn find_all(&mut self, type_key: &str) -> Result<(ArrayId, Deferred<Vec<Value>>)> {
        let array = self.all(type_key)?;
        let adapter = Rc::clone(&self.adapter);
        let deferred = adapter.find_all(self, type_key)?;
        Ok((array, deferred))
    }

    /// Register a live filtered array over a type.
    pub fn filter<F>(&mut self, type_key: &str, filter: F) -> Result<ArrayId>
    where
        F: Fn(&Record) -> bool + 'static,
    {
        self.schema.model(type_key)?;
        Ok(self.manager.register_filtered_record_array(
            &mut self.references,
            FilteredRecordArray::with_filter(type_key, filter),
        ))
    }

    /// Replace the filter of a filtered array.
    ///
    /// Filtering the cached array of [`Store::all`] detaches it from the
    /// cache; the next `all` call builds a fresh unfiltered array.
    pub fn set_filter(&mut self, array: ArrayId, filter: Option<FilterFn>) -> Result<()> {
        let filtered = filter.is_some();
        self.manager.set_filter(&mut self.references, array, filter)?;
        if filtered {
            self.all_arrays.retain(|_, a| *a != array);
        }
        Ok(())
    }

    /// Run an adapter query. The returned array fills when the query loads.
    pub fn find_query(
        &mut self,
        type_key: &str,
        query: Value,
    ) -> Result<(ArrayId, Deferred<Vec<Value>>)> {
        self.schema.model(type_key)?;
        let array = self
            .manager
            .create_adapter_populated_record_array(type_key, query.clone());

        let adapter = Rc::clone(&self.adapter);
        match adapter.find_query(self, type_key, &query, array) {
            Ok(deferred) => Ok((array, deferred)),
            Err(error) => {
                self.manager.destroy_array(&mut self.references, array);
                Err(error)
            }
        }
    }

    /// The many-array of a to-many relationship, built from the owner's
    /// linkage on first use.
    pub fn has_many(&mut self, owner: ReferenceId, key: &str) -> Result<ArrayId> {
        if let Some(&array) = self.has_many_arrays.get(&(owner, key.to_string())) {
            return Ok(array);
        }
        let relationship = self.has_many_relationship(owner, key)?;
        let target = relationship.target_type;

        let members: Vec<ReferenceId> = linkage_ids(&self.linkage(owner, key))
            .iter()
            .map(|id| self.references.reference_for(&target, id))
            .collect();
        let array = self.manager.create_many_array(
            &mut self.references,
            &target,
            &members,
            ManyArrayConfig::for_relationship(owner, key),
        );
        for &member in &members {
            if !self.references.get(member).is_some_and(Reference::has_data) {
                self.manager
                    .register_waiting_record_array(&mut self.references, array, member);
            }
        }

        self.has_many_arrays.insert((owner, key.to_string()), array);
        Ok(array)
    }

    /// Ask the adapter for the members of a to-many relationship.
    pub fn find_has_many(&mut self, owner: ReferenceId, key: &str) -> Result<Deferred<Value>> {
        let relationship = self.has_many_relationship(owner, key)?;
        let data = self.linkage(owner, key);
        let cached = self.has_many_arrays.contains_key(&(owner, key.to_string()));
        let array = self.has_many(owner, key)?;

        let adapter = Rc::clone(&self.adapter);
        let result = adapter.find_has_many(self, owner, &relationship, data);
        if result.is_err() && !cached {
            self.destroy_record_array(array);
        }
        result
    }

    // ------------------------------------------------------------------
    // Record arrays
    // ------------------------------------------------------------------

    /// Destroy a record array. Returns false if it did not exist.
    pub fn destroy_record_array(&mut self, array: ArrayId) -> bool {
        self.all_arrays.retain(|_, a| *a != array);
        self.has_many_arrays.retain(|_, a| *a != array);
        self.manager
            .destroy_array(&mut self.references, array)
            .is_some()
    }

    pub fn record_array(&self, array: ArrayId) -> Option<&RecordArray> {
        self.manager.array(array)
    }

    pub fn many_array_mut(&mut self, array: ArrayId) -> Option<&mut ManyArray> {
        self.manager.many_array_mut(array)
    }

    /// Ids of an array's members, in array order.
    pub fn record_ids(&self, array: ArrayId) -> Vec<RecordId> {
        self.manager
            .array(array)
            .map(|target| {
                target
                    .content()
                    .iter()
                    .filter_map(|&r| self.references.get(r))
                    .map(|entry| entry.id().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Drain the current tick.
    pub fn run(&mut self) -> usize {
        let scheduler = self.scheduler.clone();
        scheduler.run(self)
    }

    /// Move virtual time forward, firing due timers.
    pub fn advance(&mut self, millis: Timestamp) -> usize {
        let scheduler = self.scheduler.clone();
        scheduler.advance(self, millis)
    }

    /// Run until nothing is scheduled.
    pub fn settle(&mut self) -> usize {
        let scheduler = self.scheduler.clone();
        scheduler.settle(self)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn loaded_record_mut(&mut self, reference: ReferenceId, action: &str) -> Result<&mut Record> {
        let entry = self
            .references
            .get(reference)
            .ok_or(Error::ReferenceNotFound(reference.index()))?;
        if !entry.has_data() {
            return Err(Error::InvalidState {
                type_key: entry.type_key().to_string(),
                id: entry.id().to_string(),
                state: "unloaded".to_string(),
                action: action.to_string(),
            });
        }
        self.references
            .record_mut(reference)
            .ok_or(Error::ReferenceNotFound(reference.index()))
    }

    fn has_many_relationship(&self, owner: ReferenceId, key: &str) -> Result<RelationshipDescriptor> {
        let entry = self
            .references
            .get(owner)
            .ok_or(Error::ReferenceNotFound(owner.index()))?;
        let relationship = self.schema.relationship(entry.type_key(), key)?;
        if relationship.kind != RelationshipKind::HasMany {
            return Err(Error::UnknownRelationship {
                type_key: entry.type_key().to_string(),
                key: key.to_string(),
            });
        }
        Ok(relationship.clone())
    }

    /// Raw linkage of a relationship on the owner's record.
    fn linkage(&mut self, owner: ReferenceId, key: &str) -> Value {
        self.references
            .record_for(owner)
            .and_then(|record| record.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("references", &self.references.len())
            .field("arrays", &self.manager.arrays().len())
            .field("scheduler", &self.scheduler)
            .field("flush_count", &self.flush_count)
            .finish()
    }
}

fn invalid_state(record: &Record, action: &str) -> Error {
    Error::InvalidState {
        type_key: record.type_key.clone(),
        id: record.id.clone(),
        state: record.state.to_string(),
        action: action.to_string(),
    }
}

/// Ids named by a relationship linkage: a list of ids or of objects with ids.
pub(crate) fn linkage_ids(linkage: &Value) -> Vec<RecordId> {
    let Value::Array(items) = linkage else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(_) => extract_id(item),
            _ => None,
        })
        .collect()
}
