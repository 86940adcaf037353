//! Adapter round trips through the store's run loop.

mod common;

use common::{init_tracing, post_model, test_schema};
use futures::executor::block_on;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tether_engine::{
    AdapterError, BasicAdapter, Error, FixtureAdapter, FixtureConfig, HasManyOptions, RecordData,
    RecordState, Store, TypeSync,
};
use uuid::Uuid;

fn fixture_store(config: FixtureConfig) -> (Rc<FixtureAdapter>, Store) {
    init_tracing();
    let adapter = Rc::new(FixtureAdapter::new(config));
    let store = Store::with_adapter(test_schema(), adapter.clone());
    (adapter, store)
}

// ============================================================================
// Fixture Adapter
// ============================================================================

#[test]
fn create_without_simulated_latency_resolves_in_the_same_tick() {
    let (adapter, mut store) = fixture_store(FixtureConfig::immediate());
    adapter.set_fixtures("person", vec![]).unwrap();

    let person = store
        .create_record("person", json!({"id": 5, "name": "Tom"}))
        .unwrap();
    let mut saved = store.save(person).unwrap();
    assert_eq!(saved.try_take(), None);

    store.run();

    assert_eq!(store.now(), 0);
    assert_eq!(
        saved.try_take(),
        Some(Ok(Some(json!({"id": "5", "name": "Tom"}))))
    );
    assert_eq!(
        adapter.fixtures_for_type("person").unwrap().unwrap(),
        vec![json!({"id": "5", "name": "Tom"})]
    );
    assert_eq!(store.record(person).unwrap().state, RecordState::Clean);
    assert!(matches!(
        store.reference(person).unwrap().data(),
        RecordData::Loaded(_)
    ));
}

#[test]
fn simulated_latency_delays_responses() {
    let (adapter, mut store) = fixture_store(FixtureConfig {
        simulate_remote_response: true,
        latency_ms: 50,
    });
    adapter
        .set_fixtures("person", vec![json!({"id": 1, "age": 33})])
        .unwrap();
    let all = store.all("person").unwrap();

    let (_, mut found) = store.find("person", "1").unwrap();
    store.advance(49);
    assert_eq!(found.try_take(), None);
    assert!(store.record_ids(all).is_empty());

    store.advance(1);
    assert_eq!(store.now(), 50);
    assert!(found.try_take().unwrap().is_ok());
    assert_eq!(store.record_ids(all), vec!["1"]);
}

#[test]
fn updates_replace_the_fixture_and_append_it() {
    let (adapter, mut store) = fixture_store(FixtureConfig::immediate());
    adapter
        .set_fixtures(
            "person",
            vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})],
        )
        .unwrap();
    let (p1, _) = store.find("person", "1").unwrap();
    store.run();

    store.set_attribute(p1, "name", json!("z")).unwrap();
    assert_eq!(store.record(p1).unwrap().state, RecordState::Dirty);
    let saved = store.save(p1).unwrap();
    store.run();

    assert!(block_on(saved).is_ok());
    let fixtures = adapter.fixtures_for_type("person").unwrap().unwrap();
    assert_eq!(fixtures.len(), 2);
    assert_eq!(fixtures[1], json!({"id": "1", "name": "z"}));
    assert_eq!(store.record(p1).unwrap().state, RecordState::Clean);
}

#[test]
fn created_records_get_generated_ids() {
    let (adapter, mut store) = fixture_store(FixtureConfig::immediate());
    adapter.set_fixtures("person", vec![]).unwrap();

    let person = store.create_record("person", json!({"name": "x"})).unwrap();
    let id = store.reference(person).unwrap().id().to_string();
    assert!(Uuid::parse_str(&id).is_ok());

    store.save(person).unwrap();
    store.run();
    let fixtures = adapter.fixtures_for_type("person").unwrap().unwrap();
    assert_eq!(fixtures[0]["id"], json!(id));
}

#[test]
fn find_many_requests_only_missing_ids() {
    let (adapter, mut store) = fixture_store(FixtureConfig::immediate());
    adapter
        .set_fixtures("person", vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})])
        .unwrap();
    store.load("person", json!({"id": 1, "local": true})).unwrap();

    let ids = vec!["1".to_string(), "3".to_string()];
    let (references, found) = store.find_many("person", &ids).unwrap();
    store.run();

    assert_eq!(references.len(), 2);
    assert_eq!(block_on(found).unwrap(), vec![json!({"id": "3"})]);
    assert!(store.reference(references[1]).unwrap().is_loaded());
}

#[test]
fn fixture_has_many_loads_linked_members() {
    let (adapter, mut store) = fixture_store(FixtureConfig::immediate());
    adapter
        .set_fixtures(
            "comment",
            vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})],
        )
        .unwrap();
    let post = store
        .load("post", json!({"id": "1", "comments": [1, 3]}))
        .unwrap();

    let loaded = store.find_has_many(post, "comments").unwrap();
    let comments = store.has_many(post, "comments").unwrap();
    assert!(!store.record_array(comments).unwrap().is_loaded());

    store.run();

    assert!(block_on(loaded).is_ok());
    assert!(store.record_array(comments).unwrap().is_loaded());
    assert_eq!(store.record_ids(comments), vec!["1", "3"]);
}

#[test]
fn far_future_latency_does_not_overflow_the_clock() {
    let (adapter, mut store) = fixture_store(FixtureConfig {
        simulate_remote_response: true,
        latency_ms: u64::MAX,
    });
    adapter.set_fixtures("person", vec![json!({"id": 1})]).unwrap();

    store.advance(1);
    let (_, mut found) = store.find("person", "1").unwrap();
    store.advance(1000);

    assert_eq!(found.try_take(), None);
    assert_eq!(store.now(), 1001);
}

#[test]
fn deferreds_are_futures() {
    let (adapter, mut store) = fixture_store(FixtureConfig::default());
    adapter.set_fixtures("person", vec![json!({"id": 1})]).unwrap();

    let (_, all) = store.find_all("person").unwrap();
    store.settle();

    assert_eq!(block_on(all), Ok(vec![json!({"id": "1"})]));
}

// ============================================================================
// Basic Adapter
// ============================================================================

fn basic_store(sync: TypeSync) -> Store {
    init_tracing();
    let adapter = BasicAdapter::new().with_sync(&post_model(), sync);
    Store::new(test_schema(), adapter)
}

#[test]
fn has_many_without_any_sync_handler_fails_before_requesting() {
    let mut store = basic_store(TypeSync::new());
    let post = store
        .load("post", json!({"id": "1", "comments": [1]}))
        .unwrap();
    store.run();

    let err = store.find_has_many(post, "comments").unwrap_err();

    assert!(matches!(err, Error::MissingHasManySync { .. }));
    assert!(err.to_string().contains("findComments"));
    assert!(store.scheduler().is_idle());

    let comment = store.lookup("comment", "1").unwrap();
    let reference = store.reference(comment).unwrap();
    assert!(reference.loading_record_arrays().is_empty());
    assert!(reference.record_arrays().is_empty());
}

#[test]
fn generic_has_many_handler_serves_relationship() {
    let seen: Rc<RefCell<Vec<HasManyOptions>>> = Rc::default();
    let log = seen.clone();
    let sync = TypeSync::new().find_has_many(move |record, options, done| {
        assert_eq!(record.id, "1");
        log.borrow_mut().push(options.clone());
        done.call(json!([{"id": 1, "body": "first"}, {"id": 2, "body": "second"}]));
    });
    let mut store = basic_store(sync);
    let post = store
        .load("post", json!({"id": "1", "comments": [1, 2]}))
        .unwrap();

    let loaded = store.find_has_many(post, "comments").unwrap();
    store.run();

    assert!(block_on(loaded).is_ok());
    let comments = store.has_many(post, "comments").unwrap();
    assert!(store.record_array(comments).unwrap().is_loaded());
    assert_eq!(store.record_ids(comments), vec!["1", "2"]);
    assert_eq!(
        seen.borrow().as_slice(),
        &[HasManyOptions {
            relationship: "comments".to_string(),
            data: json!([1, 2]),
        }]
    );
}

#[test]
fn relationship_handler_is_preferred() {
    let calls: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    let generic = calls.clone();
    let specific = calls.clone();
    let sync = TypeSync::new()
        .find_has_many(move |_, _, done| {
            generic.borrow_mut().push("generic");
            done.call(Value::Array(vec![]));
        })
        .find_relationship("comments", move |_, _, done| {
            specific.borrow_mut().push("comments");
            done.call(Value::Array(vec![]));
        });
    let mut store = basic_store(sync);
    let post = store.load("post", json!({"id": "1"})).unwrap();

    store.find_has_many(post, "comments").unwrap();
    store.run();

    assert_eq!(*calls.borrow(), vec!["comments"]);
}

#[test]
fn save_lifecycle_goes_through_sync() {
    let sync = TypeSync::new()
        .create_record(|record, done| done.call(Some(record.to_json())))
        .update_record(|_, done| done.call(None))
        .delete_record(|_, done| done.call(()));
    let mut store = basic_store(sync);

    let post = store.create_record("post", json!({"id": "1", "title": "a"})).unwrap();
    let created = store.save(post).unwrap();
    store.run();
    assert_eq!(block_on(created), Ok(Some(json!({"id": "1", "title": "a"}))));
    assert_eq!(store.record(post).unwrap().state, RecordState::Clean);

    store.set_attribute(post, "title", json!("b")).unwrap();
    let updated = store.save(post).unwrap();
    store.run();
    assert_eq!(block_on(updated), Ok(None));
    assert_eq!(store.record(post).unwrap().get("title"), Some(&json!("b")));

    store.delete_record(post).unwrap();
    let deleted = store.save(post).unwrap();
    store.run();
    assert_eq!(block_on(deleted), Ok(None));
    assert!(store.reference(post).unwrap().is_deleted());
}

#[test]
fn missing_save_handler_is_a_configuration_error() {
    let mut store = basic_store(TypeSync::new());
    let post = store.create_record("post", json!({"id": "1"})).unwrap();

    let err = store.save(post).unwrap_err();
    assert_eq!(
        err,
        Error::MissingSyncMethod {
            type_key: "post".to_string(),
            method: "createRecord",
        }
    );
}

#[test]
fn failed_query_leaves_the_array_empty() {
    let sync = TypeSync::new().query(|_, done| done.fail(json!({"error": "offline"})));
    let mut store = basic_store(sync);

    let (array, result) = store.find_query("post", json!({"q": "x"})).unwrap();
    store.run();

    assert_eq!(
        block_on(result),
        Err(AdapterError::Rejected(json!({"error": "offline"})))
    );
    assert!(store.record_ids(array).is_empty());
    assert!(!store.record_array(array).unwrap().is_loaded());
}
