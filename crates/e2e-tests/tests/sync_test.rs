//! Synchronization E2E tests: saves and deletes flowing into the index.

use pretty_assertions::assert_eq;

use e2e_tests::{record, TestHarness};
use mirror_indexing::{IndexingError, SearchOptions, SyncOutcome};
use mirror_types::{AssociationKey, EntitySettings, FieldSelection, IndexFailurePolicy};

fn people() -> TestHarness {
    let harness = TestHarness::single(
        "Person",
        EntitySettings::default().with_fields(FieldSelection::only(["name", "bio"])),
    );
    harness.save("Person", record(1, &[("name", "Ada"), ("bio", "analytical engine notes")]));
    harness.save("Person", record(2, &[("name", "Alan"), ("bio", "computable numbers paper")]));
    harness.save("Person", record(3, &[("name", "Grace"), ("bio", "compiler for cobol")]));
    harness
}

#[test]
fn test_round_trip_unique_token() {
    let harness = people();
    harness.save(
        "Person",
        record(4, &[("name", "Edsger"), ("bio", "xylophonic semaphores")]),
    );

    let keys = harness
        .sync
        .engine()
        .search_keys("Person", "xylophonic", &SearchOptions::new())
        .unwrap();
    assert_eq!(keys, vec![AssociationKey::from(4)]);
}

#[test]
fn test_upsert_is_idempotent() {
    let harness = people();
    let key = AssociationKey::from(2);
    let before = harness
        .sync
        .engine()
        .find_document("Person", &key)
        .unwrap()
        .unwrap();

    let outcome = harness
        .sync
        .sync_upsert("Person", Some(&key), None)
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Updated);

    let after = harness
        .sync
        .engine()
        .find_document("Person", &key)
        .unwrap()
        .unwrap();
    assert_eq!(before.id, after.id);
    assert_eq!(before.created_at, after.created_at);
    assert!(after.modified_at >= before.modified_at);
    assert_eq!(harness.doc_count("Person"), 3);
}

#[test]
fn test_empty_text_removes_document() {
    let harness = people();
    let key = AssociationKey::from(1);
    let options = SearchOptions::new();
    assert_eq!(
        harness.sync.engine().search_keys("Person", "analytical", &options).unwrap(),
        vec![key.clone()]
    );

    // Only non-whitelisted fields left
    harness
        .store
        .insert("Person", record(1, &[("nickname", "countess")]))
        .unwrap();
    let outcome = harness.sync.on_record_saved("Person", Some(&key), None).unwrap();
    assert_eq!(outcome, SyncOutcome::Deleted);

    assert!(harness.sync.engine().find_document("Person", &key).unwrap().is_none());
    assert!(harness
        .sync
        .engine()
        .search_keys("Person", "analytical", &options)
        .unwrap()
        .is_empty());
    assert_eq!(harness.doc_count("Person"), 2);
}

#[test]
fn test_delete_follows_primary_store() {
    let harness = people();
    let key = AssociationKey::from(3);
    harness.store.remove("Person", &key);

    assert_eq!(
        harness.sync.on_record_deleted("Person", &key).unwrap(),
        SyncOutcome::Deleted
    );
    assert_eq!(harness.doc_count("Person"), 2);
}

#[test]
fn test_deleting_absent_document_succeeds() {
    let harness = people();
    let outcome = harness
        .sync
        .sync_delete("Person", &AssociationKey::from(99))
        .unwrap();
    assert_eq!(outcome, SyncOutcome::NothingToIndex);
    assert_eq!(harness.doc_count("Person"), 3);
}

#[test]
fn test_provisioning_happens_once_per_table() {
    let harness = people();
    for id in 10..15 {
        harness.save("Person", record(id, &[("name", "temp"), ("bio", "batch")]));
    }
    harness
        .sync
        .engine()
        .search_keys("Person", "batch", &SearchOptions::new())
        .unwrap();

    assert_eq!(harness.backend.create_index_calls(), 1);
    assert_eq!(harness.backend.create_mapping_calls(), 1);
}

#[test]
fn test_entities_sharing_a_table_stay_apart() {
    let shared = || EntitySettings::default().with_table("shared");
    let harness = TestHarness::new([("Person", shared()), ("Robot", shared())]);
    harness.save("Person", record(1, &[("name", "Ada")]));
    harness.save("Robot", record(1, &[("name", "Bender")]));

    let person = harness
        .sync
        .engine()
        .find_document("Person", &AssociationKey::from(1))
        .unwrap()
        .unwrap();
    let robot = harness
        .sync
        .engine()
        .find_document("Robot", &AssociationKey::from(1))
        .unwrap()
        .unwrap();
    assert_eq!(person.text, "Ada");
    assert_eq!(robot.text, "Bender");
    assert_eq!(harness.doc_count("Person"), 2);
}

#[test]
fn test_strict_policy_surfaces_rejection() {
    let harness = TestHarness::single("Person", EntitySettings::default());
    let key = harness
        .store
        .insert("Person", record(1, &[("name", "Ada")]))
        .unwrap();

    harness.backend.set_failing(true);
    let err = harness
        .sync
        .on_record_saved("Person", Some(&key), None)
        .unwrap_err();
    match err {
        IndexingError::Sync { entity_type, key, .. } => {
            assert_eq!(entity_type, "Person");
            assert_eq!(key, "1");
        }
        other => panic!("Expected sync failure, got {:?}", other),
    }
}

#[test]
fn test_best_effort_policy_swallows_rejection() {
    let harness = TestHarness::single(
        "Person",
        EntitySettings::default().with_failure_policy(IndexFailurePolicy::BestEffort),
    );
    let key = harness
        .store
        .insert("Person", record(1, &[("name", "Ada")]))
        .unwrap();

    harness.backend.set_failing(true);
    let outcome = harness
        .sync
        .on_record_saved("Person", Some(&key), None)
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped);
    assert_eq!(harness.backend.write_calls(), 1);

    harness.backend.set_failing(false);
    assert_eq!(
        harness.sync.on_record_saved("Person", Some(&key), None).unwrap(),
        SyncOutcome::Created
    );
}

#[test]
fn test_resync_keeps_one_document_per_entity_in_shared_table() {
    let names: Vec<String> = (0..12).map(|i| format!("Kind{}", i)).collect();
    let harness = TestHarness::new(
        names
            .iter()
            .map(|name| (name.clone(), EntitySettings::default().with_table("shared"))),
    );
    for name in &names {
        harness.save(name, record(1, &[("label", name.as_str())]));
    }
    assert_eq!(harness.doc_count("Kind0"), 12);

    for name in names.iter().rev() {
        let key = AssociationKey::from(1);
        assert_eq!(
            harness.sync.sync_upsert(name, Some(&key), None).unwrap(),
            SyncOutcome::Updated
        );
        let document = harness
            .sync
            .engine()
            .find_document(name, &key)
            .unwrap()
            .unwrap();
        assert_eq!(&document.entity_type, name);
    }
    assert_eq!(harness.doc_count("Kind0"), 12);
}
