//! Configuration E2E tests: settings file to a working synchronizer.

use std::io::Write;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::{init_tracing, record};
use mirror_indexing::{
    EntityRegistry, IndexSynchronizer, IndexingError, MemoryStore, SearchOptions, SyncOutcome,
};
use mirror_search::{SearchIndexConfig, TantivyBackend};
use mirror_types::{ColumnType, ColumnTypes, EntitySettings, IndexLocation, Settings};

#[test]
fn test_settings_file_drives_indexing() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("mirror.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
index_root = "{}"
writer_memory_mb = 15

[entities.news]
url = "http://search.local:9200/content/stories"
fields = "headline,body"
limit = 3
"#,
        dir.path().join("indexes").display()
    )
    .unwrap();

    let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
    let registry = EntityRegistry::from_settings(&settings).unwrap();
    let news = registry.get("news").unwrap();
    let mut expected = IndexLocation::new("content", "stories");
    expected.host = Some("http://search.local:9200".to_string());
    assert_eq!(news.location, expected);

    let store = Arc::new(MemoryStore::new());
    let mut columns = ColumnTypes::new();
    columns.insert("headline".to_string(), ColumnType::parse("VARCHAR"));
    columns.insert("body".to_string(), ColumnType::parse("json"));
    store.define("news", "id", Some(columns));

    let backend = Arc::new(TantivyBackend::new(SearchIndexConfig::from_settings(&settings)));
    let sync = IndexSynchronizer::new(registry, backend, store.clone());

    for id in 1..=5 {
        let key = store
            .insert(
                "news",
                record(id, &[("headline", "market update"), ("body", "{\"market\": 1}")]),
            )
            .unwrap();
        sync.on_record_saved("news", Some(&key), None).unwrap();
    }

    let keys = sync
        .engine()
        .search_keys("news", "market", &SearchOptions::new())
        .unwrap();
    assert_eq!(keys.len(), 3);

    let document = sync
        .engine()
        .find_document("news", &keys[0])
        .unwrap()
        .unwrap();
    assert_eq!(document.text, "market update");
}

#[test]
fn test_mixed_case_entity_from_settings_file() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("mirror.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
index_root = "{}"
writer_memory_mb = 15

[entities.Person]
name = "Person"
index = "site"
"#,
        dir.path().join("indexes").display()
    )
    .unwrap();

    let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
    let registry = EntityRegistry::from_settings(&settings).unwrap();
    assert_eq!(registry.entity_types().collect::<Vec<_>>(), vec!["Person"]);

    let store = Arc::new(MemoryStore::new());
    store.define("Person", "id", None);
    let key = store
        .insert("Person", record(1, &[("name", "Ada Lovelace")]))
        .unwrap();

    let backend = Arc::new(TantivyBackend::new(SearchIndexConfig::from_settings(&settings)));
    let sync = IndexSynchronizer::new(registry, backend, store.clone());
    assert_eq!(
        sync.on_record_saved("Person", Some(&key), None).unwrap(),
        SyncOutcome::Created
    );

    let document = sync
        .engine()
        .find_document("Person", &key)
        .unwrap()
        .unwrap();
    assert_eq!(document.entity_type, "Person");
    assert_eq!(document.text, "Ada Lovelace");
}

#[test]
fn test_missing_location_fails_at_registration() {
    let mut settings = Settings::default();
    settings
        .entities
        .insert("Orphan".to_string(), EntitySettings::default());

    let err = EntityRegistry::from_settings(&settings).unwrap_err();
    assert!(matches!(err, IndexingError::Config(_)));
}
