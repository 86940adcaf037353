//! Adapters - translate between the store and a data source.
//!
//! Every adapter call returns synchronously with either a configuration
//! error or a [`Deferred`]. The deferred settles from a run-loop task after
//! the adapter has pushed its data into the store through one of the store's
//! load callbacks ([`Store::load`], [`Store::load_many`],
//! [`Store::load_query_results`], [`Store::load_has_many`],
//! [`Store::did_save_record`]).

pub mod basic;
pub mod fixture;

pub use basic::{BasicAdapter, HasManyOptions, SyncCallback, TypeSync};
pub use fixture::FixtureAdapter;

use crate::deferred::Resolver;
use crate::schema::RelationshipDescriptor;
use crate::{error::Result, AdapterError, ArrayId, Deferred, Error, RecordId, ReferenceId, Store};
use serde_json::Value;

/// Request/response contract between the store and a data source.
pub trait Adapter {
    /// Id for a record created without one. `None` means ids come from the
    /// caller.
    fn generate_id_for_record(&self, _type_key: &str) -> Option<RecordId> {
        None
    }

    /// Load one record. Rejects with [`AdapterError::NotFound`] when the
    /// source has no such record.
    fn find(&self, store: &mut Store, type_key: &str, id: &str) -> Result<Deferred<Value>>;

    /// Load several records of one type.
    fn find_many(
        &self,
        _store: &mut Store,
        _type_key: &str,
        _ids: &[RecordId],
    ) -> Result<Deferred<Vec<Value>>> {
        Err(Error::Unsupported("findMany"))
    }

    /// Load every record of a type.
    fn find_all(&self, store: &mut Store, type_key: &str) -> Result<Deferred<Vec<Value>>>;

    /// Run an adapter-defined query and load the result into `array`.
    fn find_query(
        &self,
        store: &mut Store,
        type_key: &str,
        query: &Value,
        array: ArrayId,
    ) -> Result<Deferred<Vec<Value>>>;

    /// Load the members of a to-many relationship of `owner`.
    ///
    /// `data` is the owner's raw linkage for the relationship.
    fn find_has_many(
        &self,
        store: &mut Store,
        owner: ReferenceId,
        relationship: &RelationshipDescriptor,
        data: Value,
    ) -> Result<Deferred<Value>>;

    fn create_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>>;

    fn update_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>>;

    fn delete_record(
        &self,
        store: &mut Store,
        type_key: &str,
        record: ReferenceId,
    ) -> Result<Deferred<Option<Value>>>;
}

/// Settle a resolver after a store load callback ran.
pub(crate) fn settle_load<T>(resolver: Resolver<T>, loaded: Result<()>, value: T) {
    match loaded {
        Ok(()) => resolver.resolve(value),
        Err(error) => {
            tracing::warn!(%error, "store rejected adapter payload");
            resolver.reject(AdapterError::Load(error.to_string()));
        }
    }
}
