use super::ArrayContent;
use crate::record::Record;
use crate::{ReferenceId, TypeKey};
use std::fmt;
use std::rc::Rc;

/// Predicate deciding membership of a record in a filtered array.
///
/// Filters must be total; they may read state outside the record.
pub type FilterFn = Rc<dyn Fn(&Record) -> bool>;

/// Live view over the records of one type that match a filter.
///
/// An array without a filter contains every live record of its type.
pub struct FilteredRecordArray {
    type_key: TypeKey,
    filter: Option<FilterFn>,
    pub(crate) content: ArrayContent,
}

impl FilteredRecordArray {
    pub fn new(type_key: impl Into<TypeKey>, filter: Option<FilterFn>) -> Self {
        Self {
            type_key: type_key.into(),
            filter,
            content: ArrayContent::default(),
        }
    }

    /// Create an array with a filter built from a closure.
    pub fn with_filter<F>(type_key: impl Into<TypeKey>, filter: F) -> Self
    where
        F: Fn(&Record) -> bool + 'static,
    {
        Self::new(type_key, Some(Rc::new(filter)))
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn filter(&self) -> Option<&FilterFn> {
        self.filter.as_ref()
    }

    pub(crate) fn set_filter(&mut self, filter: Option<FilterFn>) {
        self.filter = filter;
    }

    pub fn content(&self) -> &[ReferenceId] {
        self.content.as_slice()
    }
}

impl fmt::Debug for FilteredRecordArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredRecordArray")
            .field("type_key", &self.type_key)
            .field("filtered", &self.filter.is_some())
            .field("content", &self.content.as_slice())
            .finish()
    }
}
