//! Live record arrays.
//!
//! Three kinds of arrays hold references:
//! - [`FilteredRecordArray`] - every record of a type matching a predicate
//!   (or every record of the type when there is no predicate)
//! - [`ManyArray`] - one side of a to-many relationship, possibly with
//!   members that have not loaded yet
//! - [`AdapterPopulatedRecordArray`] - the result of an adapter query
//!
//! Arrays never own references. They live in the [`RecordArrays`] arena and
//! are addressed by [`ArrayId`].

mod filtered;
mod many;
mod populated;

pub use filtered::{FilterFn, FilteredRecordArray};
pub use many::{ManyArray, ManyArrayConfig};
pub use populated::AdapterPopulatedRecordArray;

use crate::ReferenceId;
use std::collections::HashSet;

/// Handle into the [`RecordArrays`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArrayId(pub(crate) usize);

impl ArrayId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Ordered, duplicate-free list of references.
#[derive(Debug, Clone, Default)]
pub(crate) struct ArrayContent {
    order: Vec<ReferenceId>,
    members: HashSet<ReferenceId>,
}

impl ArrayContent {
    pub(crate) fn from_references(references: &[ReferenceId]) -> Self {
        let mut content = Self::default();
        for &reference in references {
            content.add(reference);
        }
        content
    }

    /// Append if absent. Returns true if the content changed.
    pub(crate) fn add(&mut self, reference: ReferenceId) -> bool {
        if self.members.insert(reference) {
            self.order.push(reference);
            true
        } else {
            false
        }
    }

    /// Remove if present. Returns true if the content changed.
    pub(crate) fn remove(&mut self, reference: ReferenceId) -> bool {
        if self.members.remove(&reference) {
            self.order.retain(|r| *r != reference);
            true
        } else {
            false
        }
    }

    pub(crate) fn contains(&self, reference: ReferenceId) -> bool {
        self.members.contains(&reference)
    }

    pub(crate) fn as_slice(&self) -> &[ReferenceId] {
        &self.order
    }

    /// Drop every member, returning them in order.
    pub(crate) fn take(&mut self) -> Vec<ReferenceId> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }
}

/// Any live record array.
#[derive(Debug)]
pub enum RecordArray {
    Filtered(FilteredRecordArray),
    Many(ManyArray),
    Populated(AdapterPopulatedRecordArray),
}

impl RecordArray {
    pub fn type_key(&self) -> &str {
        match self {
            RecordArray::Filtered(array) => array.type_key(),
            RecordArray::Many(array) => array.type_key(),
            RecordArray::Populated(array) => array.type_key(),
        }
    }

    /// Current members, in order.
    pub fn content(&self) -> &[ReferenceId] {
        self.inner().as_slice()
    }

    pub fn len(&self) -> usize {
        self.content().len()
    }

    pub fn is_empty(&self) -> bool {
        self.content().is_empty()
    }

    pub fn contains(&self, reference: ReferenceId) -> bool {
        self.inner().contains(reference)
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            RecordArray::Filtered(_) => true,
            RecordArray::Many(array) => array.is_loaded(),
            RecordArray::Populated(array) => array.is_loaded(),
        }
    }

    /// Add a member. Safe to call when already present.
    pub(crate) fn add_reference(&mut self, reference: ReferenceId) -> bool {
        self.inner_mut().add(reference)
    }

    /// Remove a member. Safe to call when already absent.
    pub(crate) fn remove_reference(&mut self, reference: ReferenceId) -> bool {
        self.inner_mut().remove(reference)
    }

    pub fn as_filtered(&self) -> Option<&FilteredRecordArray> {
        match self {
            RecordArray::Filtered(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&ManyArray> {
        match self {
            RecordArray::Many(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_many_mut(&mut self) -> Option<&mut ManyArray> {
        match self {
            RecordArray::Many(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_populated(&self) -> Option<&AdapterPopulatedRecordArray> {
        match self {
            RecordArray::Populated(array) => Some(array),
            _ => None,
        }
    }

    fn inner(&self) -> &ArrayContent {
        match self {
            RecordArray::Filtered(array) => &array.content,
            RecordArray::Many(array) => &array.content,
            RecordArray::Populated(array) => &array.content,
        }
    }

    fn inner_mut(&mut self) -> &mut ArrayContent {
        match self {
            RecordArray::Filtered(array) => &mut array.content,
            RecordArray::Many(array) => &mut array.content,
            RecordArray::Populated(array) => &mut array.content,
        }
    }
}

/// Arena of live record arrays.
///
/// Slots are never reused, so a handle to a destroyed array stays dead.
#[derive(Debug, Default)]
pub struct RecordArrays {
    slots: Vec<Option<RecordArray>>,
    live: usize,
}

impl RecordArrays {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, array: RecordArray) -> ArrayId {
        let id = ArrayId(self.slots.len());
        self.slots.push(Some(array));
        self.live += 1;
        id
    }

    pub fn get(&self, id: ArrayId) -> Option<&RecordArray> {
        self.slots.get(id.0)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ArrayId) -> Option<&mut RecordArray> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    pub(crate) fn remove(&mut self, id: ArrayId) -> Option<RecordArray> {
        let removed = self.slots.get_mut(id.0)?.take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    /// Number of live arrays.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
