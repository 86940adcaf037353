//! Basic adapter - delegates to per-type sync code.
//!
//! Each model type registers a [`TypeSync`] describing which operations its
//! sync code implements. Handlers receive a [`SyncCallback`]; calling it
//! pushes the raw result into the store from a run-loop task and settles
//! the caller's deferred.
//!
//! Loaded payloads pass through the adapter's [`TransformRegistry`] with the
//! model type as the transform kind before they reach the store.

pub mod sync;
pub mod transforms;

pub use sync::{HasManyOptions, SyncCallback, TypeSync};
pub use transforms::{process, DataProcessor, Transform, TransformFn, TransformRegistry};

use super::{settle_load, Adapter};
use crate::deferred::{deferred, Settled};
use crate::record::Record;
use crate::schema::{ModelDef, RelationshipDescriptor};
use crate::{
    error::Result, AdapterError, ArrayId, Deferred, Error, ReferenceId, Store, TypeKey,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use sync::ResolvedSync;

/// Adapter backed by registered sync objects.
#[derive(Default)]
pub struct BasicAdapter {
    syncs: HashMap<TypeKey, ResolvedSync>,
    transforms: Rc<TransformRegistry>,
}

impl BasicAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-owned transform registry (builder pattern).
    pub fn with_transforms(mut self, transforms: Rc<TransformRegistry>) -> Self {
        self.transforms = transforms;
        self
    }

    /// Register the sync code of a model type.
    ///
    /// Which handler serves each has-many relationship of the model is
    /// decided here, once.
    pub fn register_sync(&mut self, model: &ModelDef, sync: TypeSync) {
        tracing::debug!(type_key = %model.name, "registered sync");
        self.syncs
            .insert(model.name.clone(), ResolvedSync::resolve(model, sync));
    }

    /// Builder form of [`BasicAdapter::register_sync`].
    pub fn with_sync(mut self, model: &ModelDef, sync: TypeSync) -> Self {
        self.register_sync(model, sync);
        self
    }

    pub fn sync(&self, type_key: &str) -> Option<&TypeSync> {
        self.syncs.get(type_key).map(|resolved| &resolved.sync)
    }

    fn resolved(&self, type_key: &str, action: &str) -> Result<&ResolvedSync> {
        self.syncs.get(type_key).ok_or_else(|| Error::MissingSync {
            type_key: type_key.to_string(),
            action: action.to_string(),
        })
    }

    fn handler<H: Clone>(
        &self,
        type_key: &str,
        method: &'static str,
        pick: impl FnOnce(&TypeSync) -> Option<&H>,
    ) -> Result<H> {
        let resolved = self.resolved(type_key, method)?;
        pick(&resolved.sync)
            .cloned()
            .ok_or_else(|| Error::MissingSyncMethod {
                type_key: type_key.to_string(),
                method,
            })
    }

    fn owned_record(store: &mut Store, reference: ReferenceId) -> Result<Record> {
        store
            .record_for_reference(reference)
            .cloned()
            .ok_or(Error::ReferenceNotFound(reference.index()))
    }

    fn did_save(
        &self,
        store: &Store,
        type_key: &str,
        reference: ReferenceId,
    ) -> (SyncCallback<Option<Value>>, Deferred<Option<Value>>) {
        let (resolver, deferred) = deferred();
        let transforms = Rc::clone(&self.transforms);
        let type_key = type_key.to_string();
        let callback = SyncCallback::new(
            store.scheduler().clone(),
            move |store: &mut Store, outcome: Settled<Option<Value>>| {
                let json = match outcome {
                    Ok(json) => json,
                    Err(error) => return resolver.reject(error),
                };
                let data = json.clone().map(|json| {
                    process(&transforms, json)
                        .apply_transforms(&type_key)
                        .finish()
                });
                let saved = store.did_save_record(reference, data);
                settle_load(resolver, saved, json);
            },
        );
        (callback, deferred)
    }
}

impl fmt::Debug for BasicAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&TypeKey> = self.syncs.keys().collect();
        types.sort();
        f.debug_struct("BasicAdapter")
            .field("types", &types)
            .field("transforms", &self.transforms)
            .finish()
    }
}

impl Adapter for BasicAdapter {
    fn find(&self, store: &mut Store, type_key: &str, id: &str) -> Result<Deferred<Value>> {
        let handler = self.handler(type_key, "find", |sync| sync.find.as_ref())?;

        let (resolver, deferred) = deferred();
        let adapter_type = type_key.to_string();
        let transforms = Rc::clone(&self.transforms);
        let callback = SyncCallback::new(
            store.scheduler().clone(),
            move |store: &mut Store, outcome: Settled<Option<Value>>| match outcome {
                Ok(Some(json)) => {
                    let data = process(&transforms, json.clone())
                        .apply_transforms(&adapter_type)
                        .finish();
                    let loaded = store.load(&adapter_type, data).map(|_| ());
                    settle_load(resolver, loaded, json);
                }
                Ok(None) => resolver.reject(AdapterError::NotFound),
                Err(error) => resolver.reject(error),
            },
        );

        tracing::debug!(type_key, id, "dispatching find to sync");
        handler(id, callback);
        Ok(deferred)
    }

    fn find_all(&self, store: &mut Store, type_key: &str) -> Result<Deferred<Vec<Value>>> {
        let handler = self.handler(type_key, "findAll", |sync| sync.find_all.as_ref())?;

        let (resolver, deferred) = deferred();
        let adapter_type = type_key.to_string();
        let transforms = Rc::clone(&self.transforms);
        let callback = SyncCallback::new(
            store.scheduler().clone(),
            move |store: &mut Store, outcome: Settled<Vec<Value>>| {
                let json = match outcome {
                    Ok(json) => json,
                    Err(error) => return resolver.reject(error),
                };
                let data = process(&transforms, Value::Array(json.clone()))
                    .apply_transforms(&adapter_type)
                    .finish();
                let loaded = store.load_many(&adapter_type, array_items(data)).map(|_| ());
                settle_load(resolver, loaded, json);
            },
        );

        handler(callback);
        Ok(deferred)
    }

    fn find_query(
        &self,
        store: &mut Store,
        type_key: &str,
        query: &Value,
        array: ArrayId,
    ) -> Result<Deferred<Vec<Value>>> {
        let handler = self.handler(type_key, "query", |sync| sync.query.as_ref())?;

        let (resolver, deferred) = deferred();
        let adapter_type = type_key.to_string();
        let transforms = Rc::clone(&self.transforms);
        let callback = SyncCallback::new(
            store.scheduler().clone(),
            move |store: &mut Store, outcome: Settled<Vec<Value>>| {
                let json = match outcome {
                    Ok(json) => json,
                    Err(error) => return resolver.reject(error),
                };
                let data = process(&transforms, Value::Array(json.clone()))
                    .apply_transforms(&adapter_type)
                    .finish();
                let loaded = store
                    .load_query_results(array, &adapter_type, array_items(data))
                    .map(|_| ());
                settle_load(resolver, loaded, json);
            },
        );

        handler(query, callback);
        Ok(deferred)
    }

    fn find_has_many(
        &self,
        store: &mut Store,
        owner: ReferenceId,
        relationship: &RelationshipDescriptor,
        data: Value,
    ) -> Result<Deferred<Value>> {
        let record = Self::owned_record(store, owner)?;
        let resolved = self.resolved(&record.type_key, "findHasMany")?;
        let handler = resolved
            .has_many
            .get(&relationship.key)
            .cloned()
            .ok_or_else(|| Error::MissingHasManySync {
                type_key: record.type_key.clone(),
                key: relationship.key.clone(),
                method: relationship.finder_name(),
            })?;

        let (resolver, deferred) = deferred();
        let key = relationship.key.clone();
        let target_type = relationship.target_type.clone();
        let transforms = Rc::clone(&self.transforms);
        let callback = SyncCallback::new(
            store.scheduler().clone(),
            move |store: &mut Store, outcome: Settled<Value>| {
                let json = match outcome {
                    Ok(json) => json,
                    Err(error) => return resolver.reject(error),
                };
                let data = process(&transforms, json.clone())
                    .apply_transforms(&target_type)
                    .finish();
                let loaded = store.load_has_many(owner, &key, data).map(|_| ());
                settle_load(resolver, loaded, json);
            },
        );

        let options = HasManyOptions {
            relationship: relationship.key.clone(),
            data,
        };
        handler(&record, &options, callback);
        Ok(deferred)
    }

    fn create_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>> {
        let handler = self.handler(type_key, "createRecord", |sync| sync.create_record.as_ref())?;
        let snapshot = Self::owned_record(store, record)?;

        let (callback, deferred) = self.did_save(store, type_key, record);
        handler(&snapshot, callback);
        Ok(deferred)
    }

    fn update_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>> {
        let handler = self.handler(type_key, "updateRecord", |sync| sync.update_record.as_ref())?;
        let snapshot = Self::owned_record(store, record)?;

        let (callback, deferred) = self.did_save(store, type_key, record);
        handler(&snapshot, callback);
        Ok(deferred)
    }

    fn delete_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>> {
        let handler = self.handler(type_key, "deleteRecord", |sync| sync.delete_record.as_ref())?;
        let snapshot = Self::owned_record(store, record)?;

        let (resolver, deferred) = deferred();
        let callback = SyncCallback::new(
            store.scheduler().clone(),
            move |store: &mut Store, outcome: Settled<()>| {
                if let Err(error) = outcome {
                    return resolver.reject(error);
                }
                let saved = store.did_save_record(record, None);
                settle_load(resolver, saved, None);
            },
        );
        handler(&snapshot, callback);
        Ok(deferred)
    }
}

fn array_items(json: Value) -> Vec<Value> {
    match json {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    fn post_model() -> ModelDef {
        ModelDef::new("post")
            .with_relationship(RelationshipDescriptor::has_many("comments", "comment"))
    }

    fn schema() -> Schema {
        Schema::new()
            .with_model(post_model())
            .with_model(ModelDef::new("comment"))
    }

    #[test]
    fn missing_sync_fails_synchronously() {
        let mut store = Store::new(schema(), BasicAdapter::new());
        let err = store.find("post", "1").unwrap_err();
        assert!(matches!(err, Error::MissingSync { .. }));
    }

    #[test]
    fn missing_method_names_the_method() {
        let adapter = BasicAdapter::new().with_sync(&post_model(), TypeSync::new());
        let mut store = Store::new(schema(), adapter);

        let err = store.find("post", "1").unwrap_err();
        assert_eq!(err.to_string(), "the sync code on post does not implement find()");
    }

    #[test]
    fn find_loads_through_callback() {
        let sync = TypeSync::new()
            .find(|id, done| done.call(Some(json!({"id": id, "title": "t"}))));
        let adapter = BasicAdapter::new().with_sync(&post_model(), sync);
        let mut store = Store::new(schema(), adapter);

        let (post, mut found) = store.find("post", "1").unwrap();
        assert_eq!(found.try_take(), None);

        store.run();
        assert_eq!(found.try_take(), Some(Ok(json!({"id": "1", "title": "t"}))));
        assert_eq!(
            store.record_for_reference(post).unwrap().get("title"),
            Some(&json!("t"))
        );
    }

    #[test]
    fn find_with_nothing_rejects() {
        let sync = TypeSync::new().find(|_, done| done.call(None));
        let adapter = BasicAdapter::new().with_sync(&post_model(), sync);
        let mut store = Store::new(schema(), adapter);

        let (_, mut found) = store.find("post", "1").unwrap();
        store.run();
        assert_eq!(found.try_take(), Some(Err(AdapterError::NotFound)));
    }

    #[test]
    fn failures_reject_with_raw_payload() {
        let sync = TypeSync::new().find(|_, done| done.fail(json!({"status": 500})));
        let adapter = BasicAdapter::new().with_sync(&post_model(), sync);
        let mut store = Store::new(schema(), adapter);

        let (post, mut found) = store.find("post", "1").unwrap();
        store.run();

        assert_eq!(
            found.try_take(),
            Some(Err(AdapterError::Rejected(json!({"status": 500}))))
        );
        assert!(!store.reference(post).unwrap().has_data());
    }

    #[test]
    fn loaded_payloads_are_transformed() {
        fn double(value: Value) -> Value {
            json!(value.as_i64().unwrap_or(0) * 2)
        }
        let mut registry = TransformRegistry::new();
        registry.register_transforms("post", [("rank", Transform::new(double, double))]);

        let sync = TypeSync::new().find_all(|done| done.call(vec![json!({"id": 1, "rank": 2})]));
        let adapter = BasicAdapter::new()
            .with_transforms(Rc::new(registry))
            .with_sync(&post_model(), sync);
        let mut store = Store::new(schema(), adapter);

        let (_, mut all) = store.find_all("post").unwrap();
        store.run();

        assert_eq!(all.try_take(), Some(Ok(vec![json!({"id": 1, "rank": 2})])));
        let post = store.lookup("post", "1").unwrap();
        assert_eq!(store.record(post).unwrap().get("rank"), Some(&json!(4)));
    }
}
