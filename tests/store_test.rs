//! Store tests: prefix-range semantics and atomic batch application

mod common;

use std::sync::Arc;

use common::TestStore;
use namedex::store::{DiffOp, NO_DESCRIPTION};

#[test]
fn test_empty_store_finds_nothing() {
    let store = TestStore::new();
    assert!(store.find("anything", None).unwrap().is_empty());
    assert!(store.find("", None).unwrap().is_empty());
}

#[test]
fn test_prefix_correctness() {
    let store = TestStore::new();
    store.seed(&[
        ("primus", "realtime framework"),
        ("primus-emit", "emit plugin"),
        ("primus-rooms", "rooms plugin"),
        ("primal", "something else"),
        ("express", "web framework"),
        ("zz-last", "sorts last"),
    ]);

    let results = store.find("primus", None).unwrap();
    let names: Vec<&str> = results.iter().map(|e| e.name.as_str()).collect();
    // Exactly the keys with the literal prefix, ascending
    assert_eq!(names, vec!["primus", "primus-emit", "primus-rooms"]);
}

#[test]
fn test_prefix_excludes_near_misses() {
    let store = TestStore::new();
    store.seed(&[("prim", "x"), ("primt", "y"), ("primu", "z"), ("prin", "w")]);

    let names: Vec<String> = store
        .find("primu", None)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["primu"]);
}

#[test]
fn test_empty_prefix_returns_everything_in_order() {
    let store = TestStore::new();
    store.seed(&[("b", "2"), ("a", "1"), ("c", "3")]);

    let names: Vec<String> = store
        .find("", None)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_find_respects_limit() {
    let store = TestStore::new();
    let seeded: Vec<(String, String)> = (0..20)
        .map(|i| (format!("pkg-{i:02}"), format!("description {i}")))
        .collect();
    let plan: Vec<DiffOp> = seeded
        .iter()
        .map(|(k, v)| DiffOp::Put(k.clone(), v.clone()))
        .collect();
    store.apply_batch(&plan).unwrap();

    assert_eq!(store.find("pkg-", Some(5)).unwrap().len(), 5);
    assert_eq!(store.find("pkg-", None).unwrap().len(), 20);
    // Truncation keeps the lowest keys
    let first = store.find("pkg-", Some(3)).unwrap();
    assert_eq!(first[0].name, "pkg-00");
    assert_eq!(first[2].name, "pkg-02");
}

#[test]
fn test_all_entries_is_raw_and_ordered() {
    let store = TestStore::new();
    store.seed(&[("b", NO_DESCRIPTION), ("a", "desc")]);

    let entries = store.all_entries().unwrap();
    assert_eq!(
        entries,
        vec![
            ("a".to_string(), "desc".to_string()),
            ("b".to_string(), NO_DESCRIPTION.to_string()),
        ]
    );
}

#[test]
fn test_apply_batch_mixed_ops() {
    let store = TestStore::new();
    store.seed(&[("keep", "same"), ("drop", "old"), ("change", "before")]);

    store
        .apply_batch(&[
            DiffOp::Delete("drop".into()),
            DiffOp::Put("change".into(), "after".into()),
            DiffOp::Put("new".into(), "fresh".into()),
        ])
        .unwrap();

    let entries = store.all_entries().unwrap();
    assert_eq!(
        entries,
        vec![
            ("change".to_string(), "after".to_string()),
            ("keep".to_string(), "same".to_string()),
            ("new".to_string(), "fresh".to_string()),
        ]
    );
}

#[test]
fn test_delete_missing_key_is_harmless() {
    let store = TestStore::new();
    store.seed(&[("a", "1")]);
    store
        .apply_batch(&[DiffOp::Delete("not-there".into())])
        .unwrap();
    assert_eq!(store.all_entries().unwrap().len(), 1);
}

#[test]
fn test_batch_updates_refresh_metadata() {
    let store = TestStore::new();
    assert!(store.stats().unwrap().last_refresh.is_none());
    store.seed(&[("a", "1")]);
    assert!(store.stats().unwrap().last_refresh.is_some());
}

/// A reader racing a large batch sees either the full pre-batch or full
/// post-batch key set, never a mix.
#[test]
fn test_atomic_batch_visibility() {
    let store = Arc::new(TestStore::new());

    // Pre-batch state: generation "old" for every key
    let initial: Vec<DiffOp> = (0..200)
        .map(|i| DiffOp::Put(format!("atom-{i:03}"), "old".to_string()))
        .collect();
    store.apply_batch(&initial).unwrap();

    // Post-batch state flips every value in one transaction
    let flip: Vec<DiffOp> = (0..200)
        .map(|i| DiffOp::Put(format!("atom-{i:03}"), "new".to_string()))
        .collect();

    let reader = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            for _ in 0..50 {
                let snapshot = store.find("atom-", None).unwrap();
                assert_eq!(snapshot.len(), 200);
                let first = snapshot[0].description.clone();
                assert!(
                    snapshot.iter().all(|e| e.description == first),
                    "reader observed a partially applied batch"
                );
            }
        })
    };

    store.apply_batch(&flip).unwrap();
    reader.join().unwrap();

    assert!(store
        .find("atom-", None)
        .unwrap()
        .iter()
        .all(|e| e.description.as_deref() == Some("new")));
}
