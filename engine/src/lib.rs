//! # Tether Engine
//!
//! A client-side record store that keeps live record arrays in sync with the
//! records they contain.
//!
//! The engine has no IO of its own. All asynchrony runs on a single-threaded
//! run loop with a virtual clock, so the same inputs always produce the same
//! outputs.
//!
//! ## Core Concepts
//!
//! ### References
//!
//! Every record identity `(type, id)` has exactly one [`Reference`] in the
//! store's [`ReferenceTable`], addressed by a [`ReferenceId`]. Identities
//! exist before their data is loaded; ids are always strings.
//!
//! ### Record Arrays
//!
//! - [`FilteredRecordArray`] - every live record of a type matching an
//!   optional predicate
//! - [`ManyArray`] - one side of a to-many relationship; may contain members
//!   that are not loaded yet and reports when they all arrived
//! - [`AdapterPopulatedRecordArray`] - the result of an adapter query
//!
//! ### Batched Updates
//!
//! Mutations never touch arrays directly. They queue the changed reference,
//! and once per run-loop tick the [`RecordArrayManager`] re-evaluates each
//! distinct changed reference against the arrays registered for its type.
//! Many changes in one tick produce one flush.
//!
//! ### Adapters
//!
//! An [`Adapter`] fetches and saves raw data. Calls return a [`Deferred`]
//! that settles after the data has been pushed into the store.
//! [`FixtureAdapter`] serves in-memory fixtures; [`BasicAdapter`] delegates
//! to per-type [`TypeSync`] code.
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use tether_engine::{FixtureAdapter, FixtureConfig, ModelDef, Schema, Store};
//!
//! // 1. Define a schema and an adapter
//! let schema = Schema::new().with_model(ModelDef::new("person"));
//! let adapter = FixtureAdapter::new(FixtureConfig::immediate())
//!     .with_fixtures(
//!         "person",
//!         vec![json!({"id": 1, "age": 20}), json!({"id": 2, "age": 12})],
//!     )
//!     .unwrap();
//! let mut store = Store::new(schema, adapter);
//!
//! // 2. Register a live filtered array
//! let adults = store
//!     .filter("person", |person| {
//!         person
//!             .get("age")
//!             .and_then(|age| age.as_i64())
//!             .is_some_and(|age| age > 18)
//!     })
//!     .unwrap();
//!
//! // 3. Load data and pump the run loop
//! let (_, mut loaded) = store.find_all("person").unwrap();
//! store.run();
//!
//! assert!(loaded.try_take().unwrap().is_ok());
//! assert_eq!(store.record_ids(adults), vec!["1"]);
//! ```

pub mod adapter;
pub mod config;
pub mod deferred;
pub mod error;
pub mod instrumentation;
pub mod manager;
pub mod record;
pub mod record_array;
pub mod reference;
pub mod run_loop;
pub mod schema;
pub mod store;

// Re-export main types at crate root
pub use adapter::{Adapter, BasicAdapter, FixtureAdapter, HasManyOptions, SyncCallback, TypeSync};
pub use config::{ConfigError, FixtureConfig};
pub use deferred::{Deferred, Resolver, Settled};
pub use error::{AdapterError, Error};
pub use instrumentation::{
    Instrumentation, InstrumentationContext, Subscriber, SubscriptionHandle, FIND_OPERATION,
};
pub use manager::{FlushSummary, RecordArrayManager};
pub use record::{Record, RecordState};
pub use record_array::{
    AdapterPopulatedRecordArray, ArrayId, FilterFn, FilteredRecordArray, ManyArray,
    ManyArrayConfig, RecordArray,
};
pub use reference::{RecordData, Reference, ReferenceId, ReferenceTable};
pub use run_loop::Scheduler;
pub use schema::{ModelDef, RelationshipDescriptor, RelationshipKind, Schema};
pub use store::Store;

/// Type aliases for clarity
pub type RecordId = String;
pub type TypeKey = String;
/// Milliseconds on the run loop's virtual clock
pub type Timestamp = u64;
