//! Fixture adapter - serves records from in-memory fixture lists.
//!
//! Responses are delivered through the store's run loop, either after the
//! configured latency or at the end of the current tick, so code written
//! against the fixture adapter sees the same asynchrony as with a remote
//! source.

use super::{settle_load, Adapter};
use crate::config::FixtureConfig;
use crate::deferred::deferred;
use crate::reference::extract_id;
use crate::schema::RelationshipDescriptor;
use crate::store::linkage_ids;
use crate::{
    error::Result, AdapterError, ArrayId, Deferred, Error, RecordId, ReferenceId, Store, TypeKey,
};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Query hook: `(fixtures, query, type)` -> matching fixtures.
pub type QueryFixtures = Box<dyn Fn(&[Value], &Value, &str) -> Vec<Value>>;

/// Adapter backed by per-type fixture lists.
pub struct FixtureAdapter {
    config: FixtureConfig,
    fixtures: RefCell<HashMap<TypeKey, Vec<Value>>>,
    query: Option<QueryFixtures>,
}

impl FixtureAdapter {
    pub fn new(config: FixtureConfig) -> Self {
        Self {
            config,
            fixtures: RefCell::new(HashMap::new()),
            query: None,
        }
    }

    /// Set the query hook used by `find_query` (builder pattern).
    pub fn with_query<F>(mut self, query: F) -> Self
    where
        F: Fn(&[Value], &Value, &str) -> Vec<Value> + 'static,
    {
        self.query = Some(Box::new(query));
        self
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    /// Replace the fixtures of a type.
    ///
    /// Every fixture must have an id and ids must be unique. Ids are
    /// stored as strings.
    pub fn set_fixtures(&self, type_key: &str, mut fixtures: Vec<Value>) -> Result<()> {
        normalize_fixtures(type_key, &mut fixtures)?;
        self.fixtures
            .borrow_mut()
            .insert(type_key.to_string(), fixtures);
        Ok(())
    }

    /// Builder form of [`FixtureAdapter::set_fixtures`].
    pub fn with_fixtures(self, type_key: &str, fixtures: Vec<Value>) -> Result<Self> {
        self.set_fixtures(type_key, fixtures)?;
        Ok(self)
    }

    /// Validated fixtures of a type, or `None` if the type has none.
    pub fn fixtures_for_type(&self, type_key: &str) -> Result<Option<Vec<Value>>> {
        let mut fixtures = self.fixtures.borrow_mut();
        let Some(list) = fixtures.get_mut(type_key) else {
            return Ok(None);
        };
        normalize_fixtures(type_key, list)?;
        Ok(Some(list.clone()))
    }

    /// Replace the fixture with the same id, appending it at the end.
    pub fn update_fixtures(&self, type_key: &str, fixture: Value) {
        let mut fixtures = self.fixtures.borrow_mut();
        let list = fixtures.entry(type_key.to_string()).or_default();
        if let Some(id) = extract_id(&fixture) {
            list.retain(|existing| extract_id(existing).as_deref() != Some(id.as_str()));
        }
        list.push(fixture);
    }

    /// Remove the fixture with the given id.
    pub fn delete_loaded_fixture(&self, type_key: &str, id: &str) -> bool {
        let mut fixtures = self.fixtures.borrow_mut();
        let Some(list) = fixtures.get_mut(type_key) else {
            return false;
        };
        let before = list.len();
        list.retain(|existing| extract_id(existing).as_deref() != Some(id));
        list.len() != before
    }

    fn existing_fixtures(&self, type_key: &str) -> Result<Vec<Value>> {
        self.fixtures_for_type(type_key)?
            .ok_or_else(|| Error::NoFixtures(type_key.to_string()))
    }

    /// Deliver a response after the configured latency, or at the end of
    /// the current tick.
    fn simulate_remote_call<F>(&self, store: &Store, callback: F)
    where
        F: FnOnce(&mut Store) + 'static,
    {
        if self.config.simulate_remote_response {
            store.scheduler().later(self.config.latency_ms, callback);
        } else {
            store.scheduler().schedule(callback);
        }
    }

    /// Serialize a record for the fixture list and report it as saved.
    fn save(
        &self,
        store: &mut Store,
        type_key: &str,
        reference: ReferenceId,
    ) -> Result<Deferred<Option<Value>>> {
        let fixture = store
            .record_for_reference(reference)
            .map(|record| record.to_json())
            .ok_or(Error::ReferenceNotFound(reference.index()))?;
        self.update_fixtures(type_key, fixture.clone());

        let (resolver, deferred) = deferred();
        self.simulate_remote_call(store, move |store: &mut Store| {
            let saved = store.did_save_record(reference, Some(fixture.clone()));
            settle_load(resolver, saved, Some(fixture));
        });
        Ok(deferred)
    }
}

impl Default for FixtureAdapter {
    fn default() -> Self {
        Self::new(FixtureConfig::default())
    }
}

impl fmt::Debug for FixtureAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureAdapter")
            .field("config", &self.config)
            .field("types", &self.fixtures.borrow().len())
            .field("query", &self.query.is_some())
            .finish()
    }
}

impl Adapter for FixtureAdapter {
    fn generate_id_for_record(&self, _type_key: &str) -> Option<RecordId> {
        Some(Uuid::new_v4().to_string())
    }

    fn find(&self, store: &mut Store, type_key: &str, id: &str) -> Result<Deferred<Value>> {
        let fixture = self
            .existing_fixtures(type_key)?
            .into_iter()
            .find(|fixture| extract_id(fixture).as_deref() == Some(id));

        let Some(fixture) = fixture else {
            tracing::debug!(type_key, id, "no fixture found");
            return Ok(Deferred::rejected(AdapterError::NotFound));
        };

        let (resolver, deferred) = deferred();
        let type_key = type_key.to_string();
        self.simulate_remote_call(store, move |store: &mut Store| {
            let loaded = store.load(&type_key, fixture.clone()).map(|_| ());
            settle_load(resolver, loaded, fixture);
        });
        Ok(deferred)
    }

    fn find_many(
        &self,
        store: &mut Store,
        type_key: &str,
        ids: &[RecordId],
    ) -> Result<Deferred<Vec<Value>>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let fixtures: Vec<Value> = self
            .existing_fixtures(type_key)?
            .into_iter()
            .filter(|fixture| extract_id(fixture).is_some_and(|id| wanted.contains(id.as_str())))
            .collect();

        let (resolver, deferred) = deferred();
        let type_key = type_key.to_string();
        self.simulate_remote_call(store, move |store: &mut Store| {
            let loaded = store.load_many(&type_key, fixtures.clone()).map(|_| ());
            settle_load(resolver, loaded, fixtures);
        });
        Ok(deferred)
    }

    fn find_all(&self, store: &mut Store, type_key: &str) -> Result<Deferred<Vec<Value>>> {
        let fixtures = self.existing_fixtures(type_key)?;

        let (resolver, deferred) = deferred();
        let type_key = type_key.to_string();
        self.simulate_remote_call(store, move |store: &mut Store| {
            let loaded = store.load_many(&type_key, fixtures.clone()).map(|_| ());
            settle_load(resolver, loaded, fixtures);
        });
        Ok(deferred)
    }

    fn find_query(
        &self,
        store: &mut Store,
        type_key: &str,
        query: &Value,
        array: ArrayId,
    ) -> Result<Deferred<Vec<Value>>> {
        let hook = self
            .query
            .as_ref()
            .ok_or_else(|| Error::QueryNotImplemented(type_key.to_string()))?;
        let fixtures = hook(&self.existing_fixtures(type_key)?, query, type_key);

        let (resolver, deferred) = deferred();
        let type_key = type_key.to_string();
        self.simulate_remote_call(store, move |store: &mut Store| {
            let loaded = store
                .load_query_results(array, &type_key, fixtures.clone())
                .map(|_| ());
            settle_load(resolver, loaded, fixtures);
        });
        Ok(deferred)
    }

    fn find_has_many(
        &self,
        store: &mut Store,
        owner: ReferenceId,
        relationship: &RelationshipDescriptor,
        data: Value,
    ) -> Result<Deferred<Value>> {
        let ids: HashSet<RecordId> = linkage_ids(&data).into_iter().collect();
        let members: Vec<Value> = self
            .existing_fixtures(&relationship.target_type)?
            .into_iter()
            .filter(|fixture| extract_id(fixture).is_some_and(|id| ids.contains(&id)))
            .collect();
        let payload = Value::Array(members);

        let (resolver, deferred) = deferred();
        let key = relationship.key.clone();
        self.simulate_remote_call(store, move |store: &mut Store| {
            let loaded = store.load_has_many(owner, &key, payload.clone()).map(|_| ());
            settle_load(resolver, loaded, payload);
        });
        Ok(deferred)
    }

    fn create_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>> {
        self.save(store, type_key, record)
    }

    fn update_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>> {
        self.save(store, type_key, record)
    }

    fn delete_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>> {
        let id = store
            .reference(record)
            .map(|entry| entry.id().to_string())
            .ok_or(Error::ReferenceNotFound(record.index()))?;
        self.delete_loaded_fixture(type_key, &id);

        let (resolver, deferred) = deferred();
        self.simulate_remote_call(store, move |store: &mut Store| {
            let saved = store.did_save_record(record, None);
            settle_load(resolver, saved, None);
        });
        Ok(deferred)
    }
}

/// Check ids and store them as strings.
fn normalize_fixtures(type_key: &str, fixtures: &mut [Value]) -> Result<()> {
    let mut seen = HashSet::with_capacity(fixtures.len());
    for fixture in fixtures.iter_mut() {
        let id = extract_id(fixture).ok_or_else(|| Error::FixtureMissingId(fixture.to_string()))?;
        if !seen.insert(id.clone()) {
            return Err(Error::DuplicateFixtureId {
                type_key: type_key.to_string(),
                id,
            });
        }
        if let Value::Object(map) = fixture {
            map.insert("id".to_string(), Value::String(id));
        }
    }
    Ok(())
}
