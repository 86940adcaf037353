use super::ArrayContent;
use crate::{ReferenceId, TypeKey};
use std::fmt;

/// Extra configuration for a [`ManyArray`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManyArrayConfig {
    /// Record owning the relationship
    pub owner: Option<ReferenceId>,
    /// Relationship key on the owner
    pub relationship: Option<String>,
}

impl ManyArrayConfig {
    pub fn for_relationship(owner: ReferenceId, relationship: impl Into<String>) -> Self {
        Self {
            owner: Some(owner),
            relationship: Some(relationship.into()),
        }
    }
}

/// One side of a to-many relationship.
///
/// Members may not be loaded yet. Each unloaded member registered as waiting
/// adds one to the pending count; when the count drops back to zero the array
/// becomes loaded and fires its did-load listeners once.
pub struct ManyArray {
    type_key: TypeKey,
    config: ManyArrayConfig,
    pub(crate) content: ArrayContent,
    pending: usize,
    is_loaded: bool,
    did_load: Vec<Box<dyn FnMut()>>,
}

impl ManyArray {
    pub fn new(
        type_key: impl Into<TypeKey>,
        references: &[ReferenceId],
        config: ManyArrayConfig,
    ) -> Self {
        Self {
            type_key: type_key.into(),
            config,
            content: ArrayContent::from_references(references),
            pending: 0,
            is_loaded: true,
            did_load: Vec::new(),
        }
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn owner(&self) -> Option<ReferenceId> {
        self.config.owner
    }

    pub fn relationship(&self) -> Option<&str> {
        self.config.relationship.as_deref()
    }

    pub fn content(&self) -> &[ReferenceId] {
        self.content.as_slice()
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    /// Members still waiting for data.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Register a listener fired each time the array finishes loading.
    pub fn on_did_load<F>(&mut self, listener: F)
    where
        F: FnMut() + 'static,
    {
        self.did_load.push(Box::new(listener));
    }

    pub(crate) fn add_pending(&mut self) {
        self.pending += 1;
        self.is_loaded = false;
    }

    /// One waited-on member received data.
    pub(crate) fn loaded_record(&mut self) {
        if self.pending == 0 {
            return;
        }
        self.pending -= 1;
        if self.pending == 0 {
            self.did_finish_loading();
        }
    }

    /// Forget pending members before the content is replaced.
    pub(crate) fn reset_pending(&mut self) {
        self.pending = 0;
    }

    /// Fire did-load if a reset left nothing pending.
    pub(crate) fn settle(&mut self) {
        if self.pending == 0 && !self.is_loaded {
            self.did_finish_loading();
        }
    }

    fn did_finish_loading(&mut self) {
        self.is_loaded = true;
        tracing::trace!(type_key = %self.type_key, "many array did load");
        for listener in &mut self.did_load {
            listener();
        }
    }
}

impl fmt::Debug for ManyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyArray")
            .field("type_key", &self.type_key)
            .field("config", &self.config)
            .field("content", &self.content.as_slice())
            .field("pending", &self.pending)
            .field("is_loaded", &self.is_loaded)
            .finish()
    }
}
