//! End-to-end test infrastructure for the mirror index.
//!
//! Provides a shared TestHarness wiring an in-memory primary store to an
//! on-disk Tantivy backend, plus a backend double that counts calls and can
//! be switched into failing writes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use mirror_indexing::{EntityConfig, EntityRegistry, IndexSynchronizer, MemoryStore};
use mirror_search::{
    IndexDocument, Mapping, SearchBackend, SearchError, SearchHit, SearchIndexConfig,
    SearchRequest, TantivyBackend,
};
use mirror_types::{AssociationKey, EntitySettings, IndexLocation, Record, Settings};

/// Index used by harness entities that do not name one.
pub const TEST_INDEX: &str = "e2e";

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// `RUST_LOG` wins; otherwise the default settings' log level applies.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(Settings::default().log_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Backend double that forwards to a real backend.
///
/// Counts provisioning and write calls, and fails every write while
/// `set_failing(true)` is in effect.
pub struct ProbeBackend {
    inner: Arc<dyn SearchBackend>,
    failing: AtomicBool,
    create_index_calls: AtomicUsize,
    create_mapping_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl ProbeBackend {
    pub fn new(inner: Arc<dyn SearchBackend>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            create_index_calls: AtomicUsize::new(0),
            create_mapping_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn create_index_calls(&self) -> usize {
        self.create_index_calls.load(Ordering::SeqCst)
    }

    pub fn create_mapping_calls(&self) -> usize {
        self.create_mapping_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn before_write(&self) -> Result<(), SearchError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SearchError::IndexLocked("backend rejected the write".to_string()));
        }
        Ok(())
    }
}

impl SearchBackend for ProbeBackend {
    fn create_index(&self, location: &IndexLocation) -> Result<(), SearchError> {
        self.create_index_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_index(location)
    }

    fn create_mapping(
        &self,
        location: &IndexLocation,
        mapping: &Mapping,
    ) -> Result<(), SearchError> {
        self.create_mapping_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_mapping(location, mapping)
    }

    fn exists(&self, location: &IndexLocation, id: &str) -> Result<bool, SearchError> {
        self.inner.exists(location, id)
    }

    fn create_record(
        &self,
        location: &IndexLocation,
        document: &IndexDocument,
    ) -> Result<String, SearchError> {
        self.before_write()?;
        self.inner.create_record(location, document)
    }

    fn update_record(
        &self,
        location: &IndexLocation,
        id: &str,
        document: &IndexDocument,
    ) -> Result<String, SearchError> {
        self.before_write()?;
        self.inner.update_record(location, id, document)
    }

    fn delete_record(&self, location: &IndexLocation, id: &str) -> Result<(), SearchError> {
        self.before_write()?;
        self.inner.delete_record(location, id)
    }

    fn search(
        &self,
        location: &IndexLocation,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.inner.search(location, request)
    }
}

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub store: Arc<MemoryStore>,
    pub backend: Arc<ProbeBackend>,
    pub tantivy: Arc<TantivyBackend>,
    pub sync: IndexSynchronizer,
}

impl TestHarness {
    /// Harness with one registered entity per `(name, settings)` pair.
    ///
    /// Each entity gets an empty primary-store table keyed by its configured
    /// primary key, and the `e2e` index when its settings name none.
    pub fn new<I, N>(entities: I) -> Self
    where
        I: IntoIterator<Item = (N, EntitySettings)>,
        N: Into<String>,
    {
        init_tracing();
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let tantivy = Arc::new(TantivyBackend::new(
            SearchIndexConfig::on_disk(temp_dir.path().join("indexes")).with_memory_mb(15),
        ));
        let backend = Arc::new(ProbeBackend::new(tantivy.clone()));
        let store = Arc::new(MemoryStore::new());

        let mut registry = EntityRegistry::new();
        for (name, mut settings) in entities {
            let name = name.into();
            if settings.url.is_none() && settings.index.is_none() {
                settings.index = Some(TEST_INDEX.to_string());
            }
            store.define(&name, settings.primary_key.clone(), None);
            registry.register(EntityConfig::new(name, settings).expect("Invalid entity settings"));
        }

        let sync = IndexSynchronizer::new(registry, backend.clone(), store.clone());
        Self {
            _temp_dir: temp_dir,
            store,
            backend,
            tantivy,
            sync,
        }
    }

    /// Harness with a single entity.
    pub fn single(entity_type: &'static str, settings: EntitySettings) -> Self {
        Self::new([(entity_type, settings)])
    }

    pub fn location(&self, entity_type: &str) -> IndexLocation {
        self.sync
            .registry()
            .get(entity_type)
            .expect("Entity not registered")
            .location
            .clone()
    }

    /// Documents currently stored for the entity's table.
    pub fn doc_count(&self, entity_type: &str) -> u64 {
        self.tantivy
            .num_docs(&self.location(entity_type))
            .unwrap_or(0)
    }

    /// Insert a record into the primary store and index it.
    pub fn save(&self, entity_type: &str, record: Record) -> AssociationKey {
        let key = self
            .store
            .insert(entity_type, record)
            .expect("Failed to insert record");
        self.sync
            .on_record_saved(entity_type, Some(&key), None)
            .expect("Failed to index record");
        key
    }
}

/// A record with an integer id and the given text fields.
pub fn record(id: i64, fields: &[(&str, &str)]) -> Record {
    fields
        .iter()
        .fold(Record::new().with("id", id), |record, (name, value)| {
            record.with(*name, *value)
        })
}

/// `count` filler words that share no vocabulary with test terms.
pub fn filler(count: usize) -> String {
    (0..count)
        .map(|i| format!("filler{}", i))
        .collect::<Vec<_>>()
        .join(" ")
}
