//! Model definitions.
//!
//! A schema names the model types the store knows about and describes their
//! relationships, so the store can resolve a relationship key to its target
//! type and hand adapters a [`RelationshipDescriptor`].

use crate::{error::Result, Error, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    BelongsTo,
    HasMany,
}

/// Description of one relationship of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDescriptor {
    /// Attribute key holding the linkage in raw payloads
    pub key: String,
    pub kind: RelationshipKind,
    /// Model type on the other side
    pub target_type: TypeKey,
}

impl RelationshipDescriptor {
    /// Create a to-many relationship.
    pub fn has_many(key: impl Into<String>, target_type: impl Into<TypeKey>) -> Self {
        Self {
            key: key.into(),
            kind: RelationshipKind::HasMany,
            target_type: target_type.into(),
        }
    }

    /// Create a to-one relationship.
    pub fn belongs_to(key: impl Into<String>, target_type: impl Into<TypeKey>) -> Self {
        Self {
            key: key.into(),
            kind: RelationshipKind::BelongsTo,
            target_type: target_type.into(),
        }
    }

    /// Conventional name of the relationship-specific finder, e.g.
    /// `findComments` for a `comments` relationship.
    pub fn finder_name(&self) -> String {
        let mut chars = self.key.chars();
        match chars.next() {
            Some(first) => format!("find{}{}", first.to_uppercase(), chars.as_str()),
            None => "find".to_string(),
        }
    }
}

/// Definition of one model type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDef {
    pub name: TypeKey,
    pub relationships: Vec<RelationshipDescriptor>,
}

impl ModelDef {
    /// Create a model with no relationships.
    pub fn new(name: impl Into<TypeKey>) -> Self {
        Self {
            name: name.into(),
            relationships: Vec::new(),
        }
    }

    /// Add a relationship (builder pattern).
    pub fn with_relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Look up a relationship by key.
    pub fn relationship(&self, key: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.key == key)
    }

    /// Iterate over to-many relationships.
    pub fn has_many(&self) -> impl Iterator<Item = &RelationshipDescriptor> {
        self.relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::HasMany)
    }
}

/// The set of model types known to a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub models: HashMap<TypeKey, ModelDef>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model definition.
    pub fn add_model(&mut self, model: ModelDef) {
        self.models.insert(model.name.clone(), model);
    }

    /// Add a model definition (builder pattern).
    pub fn with_model(mut self, model: ModelDef) -> Self {
        self.add_model(model);
        self
    }

    /// Get a model definition by type.
    pub fn model(&self, type_key: &str) -> Result<&ModelDef> {
        self.models
            .get(type_key)
            .ok_or_else(|| Error::UnknownType(type_key.to_string()))
    }

    /// Resolve a relationship of a model type.
    pub fn relationship(&self, type_key: &str, key: &str) -> Result<&RelationshipDescriptor> {
        self.model(type_key)?
            .relationship(key)
            .ok_or_else(|| Error::UnknownRelationship {
                type_key: type_key.to_string(),
                key: key.to_string(),
            })
    }

    /// Check whether a model type is defined.
    pub fn contains(&self, type_key: &str) -> bool {
        self.models.contains_key(type_key)
    }
}
