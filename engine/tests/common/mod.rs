//! Shared fixtures for integration tests.

#![allow(dead_code)]

use serde_json::Value;
use std::sync::Once;
use tether_engine::{ModelDef, Record, RelationshipDescriptor, Schema};

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per test binary.
///
/// Set `RUST_LOG=tether_engine=trace` to see flush details.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn post_model() -> ModelDef {
    ModelDef::new("post").with_relationship(RelationshipDescriptor::has_many("comments", "comment"))
}

pub fn test_schema() -> Schema {
    Schema::new()
        .with_model(ModelDef::new("person"))
        .with_model(post_model())
        .with_model(ModelDef::new("comment"))
}

pub fn age(record: &Record) -> Option<i64> {
    record.get("age").and_then(Value::as_i64)
}

pub fn is_adult(record: &Record) -> bool {
    age(record).is_some_and(|age| age > 18)
}
