//! Error types for the Tether engine.

use crate::{RecordId, TypeKey};
use thiserror::Error;

/// All possible errors from the Tether engine.
///
/// Configuration errors (missing sync objects, missing handlers, missing
/// query hooks) are returned synchronously from the call that needed the
/// capability, before any [`Deferred`](crate::Deferred) is created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("unknown model type: {0}")]
    UnknownType(TypeKey),

    #[error("model type '{type_key}' has no relationship named '{key}'")]
    UnknownRelationship { type_key: TypeKey, key: String },

    #[error("no reference for handle {0}")]
    ReferenceNotFound(usize),

    #[error("no record array for handle {0}")]
    RecordArrayNotFound(usize),

    #[error("payload for '{0}' has no id")]
    MissingId(TypeKey),

    #[error("record {type_key}:{id} is {state}, cannot {action}")]
    InvalidState {
        type_key: TypeKey,
        id: RecordId,
        state: String,
        action: String,
    },

    // Configuration errors
    #[error("{type_key}.sync was not found, cannot {action}")]
    MissingSync { type_key: TypeKey, action: String },

    #[error("the sync code on {type_key} does not implement {method}()")]
    MissingSyncMethod {
        type_key: TypeKey,
        method: &'static str,
    },

    #[error("{type_key}.sync did not implement findHasMany or {method} for '{key}'")]
    MissingHasManySync {
        type_key: TypeKey,
        key: String,
        method: String,
    },

    #[error("adapter does not support {0}")]
    Unsupported(&'static str),

    // Fixture errors
    #[error("unable to find fixtures for model type {0}")]
    NoFixtures(TypeKey),

    #[error("the id property must be defined for fixture {0}")]
    FixtureMissingId(String),

    #[error("duplicate fixture id '{id}' for model type {type_key}")]
    DuplicateFixtureId { type_key: TypeKey, id: RecordId },

    #[error("not implemented: a fixture query hook is required to query {0}")]
    QueryNotImplemented(TypeKey),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Rejection payload of a [`Deferred`](crate::Deferred).
///
/// Rejections carry the raw failure payload; nothing is wrapped or enriched
/// on the way through the adapter layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    /// The lookup completed and found nothing.
    #[error("record not found")]
    NotFound,

    #[error("rejected: {0}")]
    Rejected(serde_json::Value),

    /// The store refused the payload the adapter delivered.
    #[error("load failed: {0}")]
    Load(String),

    /// The resolving side was dropped without settling.
    #[error("request canceled")]
    Canceled,
}
