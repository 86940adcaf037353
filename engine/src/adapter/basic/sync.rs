//! Per-type sync objects for the basic adapter.

use crate::deferred::Settled;
use crate::record::Record;
use crate::run_loop::Scheduler;
use crate::schema::ModelDef;
use crate::{AdapterError, Store};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type FindHandler = Rc<dyn Fn(&str, SyncCallback<Option<Value>>)>;
pub type FindAllHandler = Rc<dyn Fn(SyncCallback<Vec<Value>>)>;
pub type QueryHandler = Rc<dyn Fn(&Value, SyncCallback<Vec<Value>>)>;
pub type HasManyHandler = Rc<dyn Fn(&Record, &HasManyOptions, SyncCallback<Value>)>;
pub type SaveHandler = Rc<dyn Fn(&Record, SyncCallback<Option<Value>>)>;
pub type DeleteHandler = Rc<dyn Fn(&Record, SyncCallback<()>)>;

/// Arguments of a has-many handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HasManyOptions {
    /// Relationship key on the owner
    pub relationship: String,
    /// Owner's raw linkage for the relationship
    pub data: Value,
}

/// Completion handle given to sync handlers.
///
/// Calling it hands the result back to the store: the load runs as a
/// run-loop task, then the caller's deferred settles.
pub struct SyncCallback<T> {
    scheduler: Scheduler<Store>,
    complete: Box<dyn FnOnce(&mut Store, Settled<T>)>,
}

impl<T: 'static> SyncCallback<T> {
    pub(crate) fn new<F>(scheduler: Scheduler<Store>, complete: F) -> Self
    where
        F: FnOnce(&mut Store, Settled<T>) + 'static,
    {
        Self {
            scheduler,
            complete: Box::new(complete),
        }
    }

    /// Report success with the raw result.
    pub fn call(self, value: T) {
        self.settle(Ok(value));
    }

    /// Report failure. The deferred rejects with `payload` unchanged.
    pub fn fail(self, payload: Value) {
        self.settle(Err(AdapterError::Rejected(payload)));
    }

    fn settle(self, outcome: Settled<T>) {
        let complete = self.complete;
        self.scheduler
            .schedule(move |store: &mut Store| complete(store, outcome));
    }
}

impl<T> fmt::Debug for SyncCallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCallback").finish_non_exhaustive()
    }
}

/// What a type's sync code can do.
///
/// Every handler is optional; asking the adapter for a missing capability
/// fails before any request is made.
#[derive(Clone, Default)]
pub struct TypeSync {
    pub(crate) find: Option<FindHandler>,
    pub(crate) find_all: Option<FindAllHandler>,
    pub(crate) query: Option<QueryHandler>,
    pub(crate) find_has_many: Option<HasManyHandler>,
    pub(crate) relationships: HashMap<String, HasManyHandler>,
    pub(crate) create_record: Option<SaveHandler>,
    pub(crate) update_record: Option<SaveHandler>,
    pub(crate) delete_record: Option<DeleteHandler>,
}

impl TypeSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, SyncCallback<Option<Value>>) + 'static,
    {
        self.find = Some(Rc::new(handler));
        self
    }

    pub fn find_all<F>(mut self, handler: F) -> Self
    where
        F: Fn(SyncCallback<Vec<Value>>) + 'static,
    {
        self.find_all = Some(Rc::new(handler));
        self
    }

    pub fn query<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Value, SyncCallback<Vec<Value>>) + 'static,
    {
        self.query = Some(Rc::new(handler));
        self
    }

    /// Handler for every has-many relationship without a specific one.
    pub fn find_has_many<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Record, &HasManyOptions, SyncCallback<Value>) + 'static,
    {
        self.find_has_many = Some(Rc::new(handler));
        self
    }

    /// Handler for one relationship, e.g. `findComments` for `comments`.
    pub fn find_relationship<F>(mut self, key: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Record, &HasManyOptions, SyncCallback<Value>) + 'static,
    {
        self.relationships.insert(key.into(), Rc::new(handler));
        self
    }

    pub fn create_record<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Record, SyncCallback<Option<Value>>) + 'static,
    {
        self.create_record = Some(Rc::new(handler));
        self
    }

    pub fn update_record<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Record, SyncCallback<Option<Value>>) + 'static,
    {
        self.update_record = Some(Rc::new(handler));
        self
    }

    pub fn delete_record<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Record, SyncCallback<()>) + 'static,
    {
        self.delete_record = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for TypeSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut relationships: Vec<&String> = self.relationships.keys().collect();
        relationships.sort();
        f.debug_struct("TypeSync")
            .field("find", &self.find.is_some())
            .field("find_all", &self.find_all.is_some())
            .field("query", &self.query.is_some())
            .field("find_has_many", &self.find_has_many.is_some())
            .field("relationships", &relationships)
            .field("create_record", &self.create_record.is_some())
            .field("update_record", &self.update_record.is_some())
            .field("delete_record", &self.delete_record.is_some())
            .finish()
    }
}

/// A registered sync object with its has-many handlers resolved.
pub(crate) struct ResolvedSync {
    pub(crate) sync: TypeSync,
    /// Relationship key -> handler serving it
    pub(crate) has_many: HashMap<String, HasManyHandler>,
}

impl ResolvedSync {
    /// Pick the handler of each has-many relationship: the specific one if
    /// present, else the generic one.
    pub(crate) fn resolve(model: &ModelDef, sync: TypeSync) -> Self {
        let has_many = model
            .has_many()
            .filter_map(|relationship| {
                let handler = sync
                    .relationships
                    .get(&relationship.key)
                    .or(sync.find_has_many.as_ref())?;
                Some((relationship.key.clone(), Rc::clone(handler)))
            })
            .collect();
        Self { sync, has_many }
    }
}
