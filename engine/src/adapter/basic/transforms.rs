//! Attribute transforms applied to raw payloads.
//!
//! A [`TransformRegistry`] is owned by the caller and handed to the
//! components that need it. Transforms are registered per kind (usually a
//! model type) as a map of attribute key to [`Transform`], and applied with
//! [`process`]:
//!
//! ```
//! use serde_json::{json, Value};
//! use tether_engine::adapter::basic::{process, Transform, TransformRegistry};
//!
//! fn shout(value: Value) -> Value {
//!     match value {
//!         Value::String(s) => Value::String(s.to_uppercase()),
//!         other => other,
//!     }
//! }
//!
//! let mut registry = TransformRegistry::new();
//! registry.register_transforms("person", [("name", Transform::new(shout, shout))]);
//!
//! let data = process(&registry, json!({"id": 1, "name": "ada"}))
//!     .apply_transforms("person")
//!     .finish();
//! assert_eq!(data["name"], json!("ADA"));
//! ```

use serde_json::{Map, Value};
use std::collections::HashMap;

pub type TransformFn = fn(Value) -> Value;

/// A pair of value conversions.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub serialize: TransformFn,
    pub deserialize: TransformFn,
}

impl Transform {
    pub const PASSTHRU: Transform = Transform {
        serialize: passthru,
        deserialize: passthru,
    };

    pub fn new(serialize: TransformFn, deserialize: TransformFn) -> Self {
        Self {
            serialize,
            deserialize,
        }
    }
}

fn passthru(value: Value) -> Value {
    value
}

/// Value-type transforms plus per-kind attribute transforms.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    value_types: HashMap<String, Transform>,
    registered: HashMap<String, HashMap<String, Transform>>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        let value_types = ["string", "boolean", "number"]
            .into_iter()
            .map(|name| (name.to_string(), Transform::PASSTHRU))
            .collect();
        Self {
            value_types,
            registered: HashMap::new(),
        }
    }
}

impl TransformRegistry {
    /// A registry with the passthru `string`, `boolean` and `number`
    /// transforms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform for a value type.
    pub fn value_transform(&self, value_type: &str) -> Option<&Transform> {
        self.value_types.get(value_type)
    }

    /// Register or replace a value-type transform.
    pub fn register_value_transform(
        &mut self,
        value_type: impl Into<String>,
        transform: Transform,
    ) {
        self.value_types.insert(value_type.into(), transform);
    }

    /// Register the attribute transforms of a kind, replacing earlier ones.
    pub fn register_transforms<K, I>(&mut self, kind: impl Into<String>, transforms: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Transform)>,
    {
        let transforms = transforms
            .into_iter()
            .map(|(key, transform)| (key.into(), transform))
            .collect();
        self.registered.insert(kind.into(), transforms);
    }

    pub fn transforms_for(&self, kind: &str) -> Option<&HashMap<String, Transform>> {
        self.registered.get(kind)
    }

    /// Drop every registered kind. Value-type transforms stay.
    pub fn clear(&mut self) {
        self.registered.clear();
    }
}

/// Start processing a payload (one object or an array of objects).
pub fn process(registry: &TransformRegistry, json: Value) -> DataProcessor<'_> {
    DataProcessor { registry, json }
}

/// Chainable rewrites of a raw payload.
#[derive(Debug)]
pub struct DataProcessor<'a> {
    registry: &'a TransformRegistry,
    json: Value,
}

impl DataProcessor<'_> {
    /// Deserialize every attribute that has a transform registered for
    /// `kind`. Unknown kinds leave the payload untouched.
    pub fn apply_transforms(mut self, kind: &str) -> Self {
        if let Some(transforms) = self.registry.transforms_for(kind) {
            for object in objects_mut(&mut self.json) {
                for (key, transform) in transforms {
                    if let Some(value) = object.get_mut(key) {
                        *value = (transform.deserialize)(value.take());
                    }
                }
            }
        }
        self
    }

    /// Rename `snake_case` keys to `camelCase`.
    pub fn camelize_keys(mut self) -> Self {
        for object in objects_mut(&mut self.json) {
            let renamed: Map<String, Value> = std::mem::take(object)
                .into_iter()
                .map(|(key, value)| (camelize(&key), value))
                .collect();
            *object = renamed;
        }
        self
    }

    /// Run an arbitrary rewrite over each object.
    pub fn munge<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(&mut Map<String, Value>),
    {
        for object in objects_mut(&mut self.json) {
            f(object);
        }
        self
    }

    pub fn finish(self) -> Value {
        self.json
    }
}

fn objects_mut(json: &mut Value) -> Vec<&mut Map<String, Value>> {
    match json {
        Value::Object(map) => vec![map],
        Value::Array(items) => items.iter_mut().filter_map(Value::as_object_mut).collect(),
        _ => Vec::new(),
    }
}

fn camelize(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
