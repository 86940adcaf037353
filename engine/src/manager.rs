//! Record array manager - keeps live record arrays consistent with the store.
//!
//! Mutations do not touch arrays directly. They mark the changed reference
//! with [`RecordArrayManager::reference_did_change`], and once per run-loop
//! tick the store flushes the queue with
//! [`RecordArrayManager::update_record_arrays`].
//!
//! # Flush algorithm
//!
//! 1. Take the queue of changed references
//! 2. Visit each distinct reference once, in enqueue order
//! 3. Re-evaluate every filtered array registered for the reference's type,
//!    adding or removing the reference according to the current filter result
//! 4. Notify many-arrays waiting on the reference that it loaded
//!
//! Membership is recomputed from scratch for each visited reference and
//! diffed against the last known membership, so the result is correct even
//! for non-monotonic filters or filters reading state outside the record.
//! The cost is O(changed references x arrays for their types); only
//! registering an array or changing its filter scans a whole type.

use crate::record_array::{
    AdapterPopulatedRecordArray, ArrayId, FilterFn, FilteredRecordArray, ManyArray,
    ManyArrayConfig, RecordArray, RecordArrays,
};
use crate::reference::ReferenceTable;
use crate::{error::Result, Error, ReferenceId, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// What a single flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushSummary {
    /// Distinct references reconciled
    pub references_processed: usize,
    /// Queue entries collapsed into an earlier entry for the same reference
    pub duplicates_skipped: usize,
    /// Filtered array evaluations performed
    pub arrays_evaluated: usize,
    /// Loaded notifications delivered to many-arrays
    pub many_arrays_notified: usize,
}

/// Owns record array registration and the changed-reference queue.
#[derive(Debug, Default)]
pub struct RecordArrayManager {
    arrays: RecordArrays,
    /// Type -> filtered arrays registered for it, in registration order
    filtered_record_arrays: HashMap<TypeKey, Vec<ArrayId>>,
    /// References changed since the last flush (may repeat)
    changed_references: Vec<ReferenceId>,
}

impl RecordArrayManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arrays(&self) -> &RecordArrays {
        &self.arrays
    }

    pub fn array(&self, array: ArrayId) -> Option<&RecordArray> {
        self.arrays.get(array)
    }

    pub fn many_array_mut(&mut self, array: ArrayId) -> Option<&mut ManyArray> {
        self.arrays.get_mut(array).and_then(RecordArray::as_many_mut)
    }

    /// Filtered arrays registered for a type.
    pub fn filtered_record_arrays(&self, type_key: &str) -> &[ArrayId] {
        self.filtered_record_arrays
            .get(type_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether a type has any bookkeeping entry at all.
    pub fn tracks_type(&self, type_key: &str) -> bool {
        self.filtered_record_arrays.contains_key(type_key)
    }

    pub fn changed_references(&self) -> &[ReferenceId] {
        &self.changed_references
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changed_references.is_empty()
    }

    /// Queue a reference for the next flush.
    ///
    /// The caller is responsible for scheduling the flush; scheduling is
    /// coalesced so many changes in one tick produce one flush.
    pub fn reference_did_change(&mut self, reference: ReferenceId) {
        tracing::trace!(reference = reference.index(), "reference did change");
        self.changed_references.push(reference);
    }

    /// Reconcile every queued reference against the registered arrays.
    pub fn update_record_arrays(&mut self, references: &mut ReferenceTable) -> FlushSummary {
        let changed = std::mem::take(&mut self.changed_references);
        let mut summary = FlushSummary::default();
        let mut seen = HashSet::with_capacity(changed.len());

        for reference in changed {
            if !seen.insert(reference) {
                summary.duplicates_skipped += 1;
                continue;
            }
            let Some(entry) = references.get(reference) else {
                continue;
            };
            summary.references_processed += 1;

            let live = entry.is_live();
            let has_data = entry.has_data();

            // Types nobody filters are skipped without allocating an entry
            if let Some(arrays) = self.filtered_record_arrays.get(entry.type_key()) {
                for &array in arrays {
                    summary.arrays_evaluated += 1;
                    if live {
                        let filter = filter_of(&self.arrays, array);
                        evaluate(&mut self.arrays, references, array, filter.as_ref(), reference);
                    } else {
                        set_membership(&mut self.arrays, references, array, reference, false);
                    }
                }
            }

            if has_data {
                let waiting = references
                    .get_mut(reference)
                    .map(|entry| std::mem::take(&mut entry.loading_record_arrays))
                    .unwrap_or_default();

                for array in waiting {
                    let many = self.arrays.get_mut(array).and_then(RecordArray::as_many_mut);
                    if let Some(many) = many {
                        many.loaded_record();
                        summary.many_arrays_notified += 1;
                    }
                }
            }
        }

        tracing::debug!(
            references = summary.references_processed,
            duplicates = summary.duplicates_skipped,
            evaluations = summary.arrays_evaluated,
            notified = summary.many_arrays_notified,
            "flushed record arrays"
        );

        summary
    }

    /// Recompute one reference's membership in one array.
    ///
    /// With no filter the reference belongs unconditionally. Returns the
    /// resulting membership. Calling it again with an unchanged filter result
    /// changes nothing.
    pub fn update_record_array(
        &mut self,
        references: &mut ReferenceTable,
        array: ArrayId,
        filter: Option<&FilterFn>,
        reference: ReferenceId,
    ) -> bool {
        evaluate(&mut self.arrays, references, array, filter, reference)
    }

    /// Remove a deleted record from every array that contains it.
    pub fn remove(&mut self, references: &mut ReferenceTable, reference: ReferenceId) {
        let arrays = references
            .get_mut(reference)
            .map(|entry| std::mem::take(&mut entry.record_arrays))
            .unwrap_or_default();

        for array in arrays {
            if let Some(target) = self.arrays.get_mut(array) {
                target.remove_reference(reference);
            }
        }
    }

    /// Re-run a filter over every live identity of a type.
    pub fn update_filter(
        &mut self,
        references: &mut ReferenceTable,
        array: ArrayId,
        type_key: &str,
        filter: Option<&FilterFn>,
    ) {
        let candidates = references.references_for_type(type_key).to_vec();
        for reference in candidates {
            if references.is_live(reference) {
                evaluate(&mut self.arrays, references, array, filter, reference);
            }
        }
    }

    /// Build a many-array and index it under each member.
    pub fn create_many_array(
        &mut self,
        references: &mut ReferenceTable,
        type_key: &str,
        members: &[ReferenceId],
        config: ManyArrayConfig,
    ) -> ArrayId {
        let array = self
            .arrays
            .insert(RecordArray::Many(ManyArray::new(type_key, members, config)));

        for &reference in members {
            if let Some(entry) = references.get_mut(reference) {
                entry.record_arrays.insert(array);
            }
        }

        array
    }

    /// Register a filtered array and populate it from the current store state.
    pub fn register_filtered_record_array(
        &mut self,
        references: &mut ReferenceTable,
        array: FilteredRecordArray,
    ) -> ArrayId {
        let type_key = array.type_key().to_string();
        let filter = array.filter().cloned();
        let id = self.arrays.insert(RecordArray::Filtered(array));

        self.filtered_record_arrays
            .entry(type_key.clone())
            .or_default()
            .push(id);

        self.update_filter(references, id, &type_key, filter.as_ref());
        id
    }

    /// Replace the filter of a registered array and re-run it.
    pub fn set_filter(
        &mut self,
        references: &mut ReferenceTable,
        array: ArrayId,
        filter: Option<FilterFn>,
    ) -> Result<()> {
        let target = match self.arrays.get_mut(array) {
            Some(RecordArray::Filtered(target)) => target,
            _ => return Err(Error::RecordArrayNotFound(array.index())),
        };
        target.set_filter(filter.clone());
        let type_key = target.type_key().to_string();

        self.update_filter(references, array, &type_key, filter.as_ref());
        Ok(())
    }

    /// Make a many-array wait for an unloaded member.
    ///
    /// The array is notified once, by the flush that follows the member's
    /// data arriving. Registering the same pair twice has no effect.
    pub fn register_waiting_record_array(
        &mut self,
        references: &mut ReferenceTable,
        array: ArrayId,
        reference: ReferenceId,
    ) -> bool {
        let Some(entry) = references.get_mut(reference) else {
            return false;
        };
        if entry.loading_record_arrays.contains(&array) {
            return false;
        }
        let Some(many) = self.arrays.get_mut(array).and_then(RecordArray::as_many_mut) else {
            return false;
        };

        entry.loading_record_arrays.push(array);
        many.add_pending();
        true
    }

    /// Create the target array of an adapter query.
    pub fn create_adapter_populated_record_array(
        &mut self,
        type_key: &str,
        query: serde_json::Value,
    ) -> ArrayId {
        self.arrays.insert(RecordArray::Populated(
            AdapterPopulatedRecordArray::new(type_key, query),
        ))
    }

    /// Load a query result into its target array.
    pub fn populate(
        &mut self,
        references: &mut ReferenceTable,
        array: ArrayId,
        members: &[ReferenceId],
    ) -> Result<()> {
        let target = match self.arrays.get_mut(array) {
            Some(RecordArray::Populated(target)) => target,
            _ => return Err(Error::RecordArrayNotFound(array.index())),
        };

        for reference in target.load(members) {
            if let Some(entry) = references.get_mut(reference) {
                entry.record_arrays.remove(&array);
            }
        }
        for &reference in members {
            if let Some(entry) = references.get_mut(reference) {
                entry.record_arrays.insert(array);
            }
        }
        Ok(())
    }

    /// Reset a many-array to a new member list.
    ///
    /// Old members are detached, unloaded new members are waited on, and the
    /// array fires did-load right away if nothing is left pending.
    pub fn update_many_array(
        &mut self,
        references: &mut ReferenceTable,
        array: ArrayId,
        members: &[ReferenceId],
    ) -> Result<()> {
        let many = self
            .arrays
            .get_mut(array)
            .and_then(RecordArray::as_many_mut)
            .ok_or(Error::RecordArrayNotFound(array.index()))?;

        for reference in many.content.take() {
            if let Some(entry) = references.get_mut(reference) {
                entry.record_arrays.remove(&array);
                entry.loading_record_arrays.retain(|a| *a != array);
            }
        }
        many.reset_pending();

        for &reference in members {
            let Some(entry) = references.get_mut(reference) else {
                continue;
            };
            if !many.content.add(reference) {
                continue;
            }
            entry.record_arrays.insert(array);
            if !entry.has_data() {
                entry.loading_record_arrays.push(array);
                many.add_pending();
            }
        }

        many.settle();
        Ok(())
    }

    /// Destroy an array, detaching it from every reference.
    ///
    /// Later flushes never see the array again.
    pub fn destroy_array(
        &mut self,
        references: &mut ReferenceTable,
        array: ArrayId,
    ) -> Option<RecordArray> {
        let removed = self.arrays.remove(array)?;

        for &reference in removed.content() {
            if let Some(entry) = references.get_mut(reference) {
                entry.record_arrays.remove(&array);
                entry.loading_record_arrays.retain(|a| *a != array);
            }
        }

        if let RecordArray::Filtered(filtered) = &removed {
            if let Some(registered) = self.filtered_record_arrays.get_mut(filtered.type_key()) {
                registered.retain(|a| *a != array);
            }
        }

        tracing::debug!(
            array = array.index(),
            type_key = %removed.type_key(),
            "destroyed record array"
        );
        Some(removed)
    }
}

fn filter_of(arrays: &RecordArrays, array: ArrayId) -> Option<FilterFn> {
    arrays
        .get(array)
        .and_then(RecordArray::as_filtered)
        .and_then(|filtered| filtered.filter().cloned())
}

fn evaluate(
    arrays: &mut RecordArrays,
    references: &mut ReferenceTable,
    array: ArrayId,
    filter: Option<&FilterFn>,
    reference: ReferenceId,
) -> bool {
    let should_be_in_array = match filter {
        None => true,
        Some(filter) => references
            .record_for(reference)
            .is_some_and(|record| filter(record)),
    };

    set_membership(arrays, references, array, reference, should_be_in_array);
    should_be_in_array
}

fn set_membership(
    arrays: &mut RecordArrays,
    references: &mut ReferenceTable,
    array: ArrayId,
    reference: ReferenceId,
    member: bool,
) {
    let (Some(target), Some(entry)) = (arrays.get_mut(array), references.get_mut(reference)) else {
        return;
    };

    if member {
        entry.record_arrays.insert(array);
        if target.add_reference(reference) {
            tracing::trace!(
                array = array.index(),
                reference = reference.index(),
                "added to record array"
            );
        }
    } else {
        entry.record_arrays.remove(&array);
        if target.remove_reference(reference) {
            tracing::trace!(
                array = array.index(),
                reference = reference.index(),
                "removed from record array"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn person(table: &mut ReferenceTable, id: &str, age: i64) -> ReferenceId {
        let reference = table.reference_for("person", id);
        table.set_loaded(reference, json!({ "id": id, "age": age }));
        reference
    }

    fn adults() -> FilteredRecordArray {
        FilteredRecordArray::with_filter("person", |record| {
            record
                .get("age")
                .and_then(|v| v.as_i64())
                .map(|age| age > 18)
                .unwrap_or(false)
        })
    }

    fn content(manager: &RecordArrayManager, array: ArrayId) -> Vec<ReferenceId> {
        manager.array(array).unwrap().content().to_vec()
    }

    #[test]
    fn register_evaluates_eagerly() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let _p2 = person(&mut table, "2", 10);

        let array = manager.register_filtered_record_array(&mut table, adults());

        assert_eq!(content(&manager, array), vec![p1]);
        assert!(table.get(p1).unwrap().record_arrays().contains(&array));
        assert_eq!(manager.filtered_record_arrays("person"), &[array]);
    }

    #[test]
    fn flush_adds_newly_matching_reference() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let p2 = person(&mut table, "2", 10);
        let array = manager.register_filtered_record_array(&mut table, adults());

        table.record_mut(p2).unwrap().set("age", json!(25));
        manager.reference_did_change(p2);
        manager.update_record_arrays(&mut table);

        assert_eq!(content(&manager, array), vec![p1, p2]);
    }

    #[test]
    fn flush_removes_no_longer_matching_reference() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let array = manager.register_filtered_record_array(&mut table, adults());

        table.record_mut(p1).unwrap().set("age", json!(3));
        manager.reference_did_change(p1);
        manager.update_record_arrays(&mut table);

        assert!(content(&manager, array).is_empty());
        assert!(table.get(p1).unwrap().record_arrays().is_empty());
    }

    #[test]
    fn update_record_array_is_idempotent() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let array = manager.register_filtered_record_array(&mut table, adults());
        let filter = filter_of(&manager.arrays, array);

        for _ in 0..3 {
            assert!(manager.update_record_array(&mut table, array, filter.as_ref(), p1));
        }

        assert_eq!(content(&manager, array), vec![p1]);
        assert_eq!(table.get(p1).unwrap().record_arrays().len(), 1);
    }

    #[test]
    fn duplicate_changes_are_processed_once() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        manager.register_filtered_record_array(&mut table, adults());

        for _ in 0..5 {
            manager.reference_did_change(p1);
        }
        let summary = manager.update_record_arrays(&mut table);

        assert_eq!(summary.references_processed, 1);
        assert_eq!(summary.duplicates_skipped, 4);
        assert_eq!(summary.arrays_evaluated, 1);
        assert!(!manager.has_pending_changes());
    }

    #[test]
    fn untracked_type_is_a_noop() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let pet = table.reference_for("pet", "1");
        table.set_loaded(pet, json!({}));

        manager.reference_did_change(pet);
        let summary = manager.update_record_arrays(&mut table);

        assert_eq!(summary.references_processed, 1);
        assert_eq!(summary.arrays_evaluated, 0);
        assert!(!manager.tracks_type("pet"));
    }

    #[test]
    fn unfiltered_array_includes_every_live_record() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let p2 = person(&mut table, "2", 10);
        let _unloaded = table.reference_for("person", "3");

        let all = manager
            .register_filtered_record_array(&mut table, FilteredRecordArray::new("person", None));

        assert_eq!(content(&manager, all), vec![p1, p2]);
    }

    #[test]
    fn remove_detaches_from_all_arrays() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let adults = manager.register_filtered_record_array(&mut table, adults());
        let all = manager
            .register_filtered_record_array(&mut table, FilteredRecordArray::new("person", None));
        let many =
            manager.create_many_array(&mut table, "person", &[p1], ManyArrayConfig::default());

        table.record_mut(p1).unwrap().mark_deleted();
        manager.remove(&mut table, p1);

        assert!(content(&manager, adults).is_empty());
        assert!(content(&manager, all).is_empty());
        assert!(content(&manager, many).is_empty());
        assert!(table.get(p1).unwrap().record_arrays().is_empty());

        // A later flush must not re-add the deleted record
        manager.reference_did_change(p1);
        manager.update_record_arrays(&mut table);
        assert!(content(&manager, all).is_empty());
    }

    #[test]
    fn destroy_detaches_and_unregisters() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let array = manager.register_filtered_record_array(&mut table, adults());

        assert!(manager.destroy_array(&mut table, array).is_some());
        assert!(table.get(p1).unwrap().record_arrays().is_empty());
        assert!(manager.filtered_record_arrays("person").is_empty());

        manager.reference_did_change(p1);
        let summary = manager.update_record_arrays(&mut table);
        assert_eq!(summary.arrays_evaluated, 0);
        assert!(table.get(p1).unwrap().record_arrays().is_empty());
    }

    #[test]
    fn set_filter_rescans() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let p2 = person(&mut table, "2", 10);
        let array = manager.register_filtered_record_array(&mut table, adults());

        let minors: FilterFn = Rc::new(|record: &Record| {
            record.get("age").and_then(|v| v.as_i64()).is_some_and(|age| age < 18)
        });
        manager.set_filter(&mut table, array, Some(minors)).unwrap();

        assert_eq!(content(&manager, array), vec![p2]);
        assert!(table.get(p1).unwrap().record_arrays().is_empty());
    }

    #[test]
    fn many_array_loads_after_waited_members_arrive() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let c1 = table.reference_for("comment", "1");
        let c2 = table.reference_for("comment", "2");
        let many =
            manager.create_many_array(&mut table, "comment", &[c1, c2], ManyArrayConfig::default());

        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        manager
            .many_array_mut(many)
            .unwrap()
            .on_did_load(move || counter.set(counter.get() + 1));

        assert!(manager.register_waiting_record_array(&mut table, many, c1));
        assert!(manager.register_waiting_record_array(&mut table, many, c2));
        assert!(!manager.register_waiting_record_array(&mut table, many, c2));
        assert!(!manager.array(many).unwrap().is_loaded());

        table.set_loaded(c2, json!({}));
        manager.reference_did_change(c2);
        manager.update_record_arrays(&mut table);
        assert!(!manager.array(many).unwrap().is_loaded());
        assert!(table.get(c2).unwrap().loading_record_arrays().is_empty());

        table.set_loaded(c1, json!({}));
        manager.reference_did_change(c1);
        manager.update_record_arrays(&mut table);
        assert!(manager.array(many).unwrap().is_loaded());
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn populate_replaces_members() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let p1 = person(&mut table, "1", 20);
        let p2 = person(&mut table, "2", 30);
        let array = manager.create_adapter_populated_record_array("person", json!({"q": 1}));

        manager.populate(&mut table, array, &[p1]).unwrap();
        manager.populate(&mut table, array, &[p2]).unwrap();

        assert_eq!(content(&manager, array), vec![p2]);
        assert!(manager.array(array).unwrap().is_loaded());
        assert!(table.get(p1).unwrap().record_arrays().is_empty());
        assert!(table.get(p2).unwrap().record_arrays().contains(&array));
    }

    #[test]
    fn update_many_array_resets_waiting() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let c1 = table.reference_for("comment", "1");
        let c2 = person(&mut table, "2", 1);
        let many = manager.create_many_array(&mut table, "comment", &[c1], ManyArrayConfig::default());
        manager.register_waiting_record_array(&mut table, many, c1);

        manager.update_many_array(&mut table, many, &[c2]).unwrap();

        assert_eq!(content(&manager, many), vec![c2]);
        assert!(manager.array(many).unwrap().is_loaded());
        assert!(table.get(c1).unwrap().loading_record_arrays().is_empty());
        assert!(table.get(c1).unwrap().record_arrays().is_empty());
    }

    #[test]
    fn set_filter_on_many_array_fails() {
        let mut table = ReferenceTable::new();
        let mut manager = RecordArrayManager::new();
        let many = manager.create_many_array(&mut table, "comment", &[], ManyArrayConfig::default());
        assert!(matches!(
            manager.set_filter(&mut table, many, None),
            Err(Error::RecordArrayNotFound(_))
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn is_adult(table: &mut ReferenceTable, reference: ReferenceId) -> bool {
            table
                .record_for(reference)
                .and_then(|record| record.get("age"))
                .and_then(|v| v.as_i64())
                .is_some_and(|age| age > 18)
        }

        proptest! {
            #[test]
            fn prop_flush_matches_filter(
                ages in prop::collection::vec(0i64..40, 1..12),
                edits in prop::collection::vec((0usize..12, 0i64..40, any::<bool>()), 0..40),
            ) {
                let mut table = ReferenceTable::new();
                let mut manager = RecordArrayManager::new();
                let people: Vec<ReferenceId> = ages
                    .iter()
                    .enumerate()
                    .map(|(i, &age)| person(&mut table, &i.to_string(), age))
                    .collect();
                let array = manager.register_filtered_record_array(&mut table, adults());

                for (index, age, flush) in edits {
                    let reference = people[index % people.len()];
                    table.record_mut(reference).unwrap().set("age", json!(age));
                    manager.reference_did_change(reference);
                    if flush {
                        manager.update_record_arrays(&mut table);
                    }
                }
                manager.update_record_arrays(&mut table);

                let expected: Vec<ReferenceId> = people
                    .iter()
                    .copied()
                    .filter(|&r| is_adult(&mut table, r))
                    .collect();
                let mut actual = content(&manager, array);
                actual.sort();
                prop_assert_eq!(actual, expected.clone());

                for &reference in &people {
                    let member = table.get(reference).unwrap().record_arrays().contains(&array);
                    prop_assert_eq!(member, expected.contains(&reference));
                }
            }

            #[test]
            fn prop_many_array_loads_once_in_any_order(
                order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
                flush_each in any::<bool>(),
            ) {
                let mut table = ReferenceTable::new();
                let mut manager = RecordArrayManager::new();
                let members: Vec<ReferenceId> = (0..6)
                    .map(|i| table.reference_for("comment", &i.to_string()))
                    .collect();
                let many = manager.create_many_array(
                    &mut table,
                    "comment",
                    &members,
                    ManyArrayConfig::default(),
                );
                for &member in &members {
                    manager.register_waiting_record_array(&mut table, many, member);
                }

                let fired = Rc::new(Cell::new(0));
                let counter = fired.clone();
                manager
                    .many_array_mut(many)
                    .unwrap()
                    .on_did_load(move || counter.set(counter.get() + 1));

                for (step, &index) in order.iter().enumerate() {
                    let member = members[index];
                    table.set_loaded(member, json!({ "id": index }));
                    manager.reference_did_change(member);
                    if flush_each {
                        manager.update_record_arrays(&mut table);
                        let last = step + 1 == order.len();
                        prop_assert_eq!(manager.array(many).unwrap().is_loaded(), last);
                    }
                }
                manager.update_record_arrays(&mut table);
                manager.update_record_arrays(&mut table);

                prop_assert!(manager.array(many).unwrap().is_loaded());
                prop_assert_eq!(fired.get(), 1);
            }

            #[test]
            fn prop_update_record_array_idempotent(age in 0i64..40, repeats in 1usize..6) {
                let mut table = ReferenceTable::new();
                let mut manager = RecordArrayManager::new();
                let p1 = person(&mut table, "1", age);
                let array = manager.register_filtered_record_array(&mut table, adults());
                let filter = filter_of(&manager.arrays, array);

                let before = content(&manager, array);
                for _ in 0..repeats {
                    manager.update_record_array(&mut table, array, filter.as_ref(), p1);
                }

                prop_assert_eq!(content(&manager, array), before);
                prop_assert_eq!(table.get(p1).unwrap().record_arrays().len(), usize::from(age > 18));
            }
        }
    }
}
