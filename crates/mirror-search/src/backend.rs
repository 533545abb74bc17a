//! The backend interface and its embedded Tantivy implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};
use ulid::Ulid;

use mirror_types::IndexLocation;

use crate::document::{IndexDocument, SearchHit};
use crate::error::SearchError;
use crate::index::{SearchIndexConfig, TableIndex};
use crate::query::SearchRequest;
use crate::schema::Mapping;

/// Indexing and query services of a search engine.
///
/// Every call names the `(index, table)` it applies to. Provisioning calls are
/// idempotent; the others expect the table to be provisioned.
pub trait SearchBackend: Send + Sync {
    /// Create the index namespace.
    fn create_index(&self, location: &IndexLocation) -> Result<(), SearchError>;

    /// Create the table with the given document mapping.
    fn create_mapping(&self, location: &IndexLocation, mapping: &Mapping)
        -> Result<(), SearchError>;

    /// Whether a document with this backend id exists.
    fn exists(&self, location: &IndexLocation, id: &str) -> Result<bool, SearchError>;

    /// Store a new document and return its assigned id.
    fn create_record(
        &self,
        location: &IndexLocation,
        document: &IndexDocument,
    ) -> Result<String, SearchError>;

    /// Replace the document stored under `id`, returning the id.
    fn update_record(
        &self,
        location: &IndexLocation,
        id: &str,
        document: &IndexDocument,
    ) -> Result<String, SearchError>;

    /// Delete a document; an unknown id is `SearchError::DocumentNotFound`.
    fn delete_record(&self, location: &IndexLocation, id: &str) -> Result<(), SearchError>;

    fn search(
        &self,
        location: &IndexLocation,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

/// Embedded backend with one Tantivy index per table.
///
/// Writes commit immediately and reload the reader, so a write is visible to
/// the next search.
pub struct TantivyBackend {
    config: SearchIndexConfig,
    indexes: RwLock<HashSet<String>>,
    tables: RwLock<HashMap<String, Arc<TableIndex>>>,
}

impl TantivyBackend {
    pub fn new(config: SearchIndexConfig) -> Self {
        Self {
            config,
            indexes: RwLock::new(HashSet::new()),
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_ram() -> Self {
        Self::new(SearchIndexConfig::in_ram())
    }

    /// Look up a provisioned table.
    pub fn table(&self, location: &IndexLocation) -> Result<Arc<TableIndex>, SearchError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        tables
            .get(&location.cache_key())
            .cloned()
            .ok_or_else(|| SearchError::IndexNotFound(location.to_string()))
    }

    /// Number of documents in a table.
    pub fn num_docs(&self, location: &IndexLocation) -> Result<u64, SearchError> {
        Ok(self.table(location)?.searcher().num_docs())
    }
}

impl SearchBackend for TantivyBackend {
    fn create_index(&self, location: &IndexLocation) -> Result<(), SearchError> {
        let mut indexes = self
            .indexes
            .write()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        if indexes.contains(&location.index) {
            return Ok(());
        }
        if let Some(dir) = self.config.index_dir(location) {
            std::fs::create_dir_all(&dir)?;
        }
        indexes.insert(location.index.clone());
        info!(index = %location.index, "Created index");
        Ok(())
    }

    fn create_mapping(
        &self,
        location: &IndexLocation,
        mapping: &Mapping,
    ) -> Result<(), SearchError> {
        let indexes = self
            .indexes
            .read()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        if !indexes.contains(&location.index) {
            return Err(SearchError::IndexNotFound(location.index.clone()));
        }

        let mut tables = self
            .tables
            .write()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        let key = location.cache_key();
        if tables.contains_key(&key) {
            return Ok(());
        }

        let dir = self.config.table_dir(location);
        let table = TableIndex::open_or_create(dir.as_deref(), mapping, self.config.writer_memory_mb)?;
        tables.insert(key, Arc::new(table));
        info!(location = %location, "Created mapping");
        Ok(())
    }

    fn exists(&self, location: &IndexLocation, id: &str) -> Result<bool, SearchError> {
        self.table(location)?.searcher().contains_id(id)
    }

    fn create_record(
        &self,
        location: &IndexLocation,
        document: &IndexDocument,
    ) -> Result<String, SearchError> {
        let table = self.table(location)?;
        let id = Ulid::new().to_string();
        table.indexer().put_document(&id, document)?;
        table.commit()?;
        debug!(location = %location, id = %id, "Created record");
        Ok(id)
    }

    fn update_record(
        &self,
        location: &IndexLocation,
        id: &str,
        document: &IndexDocument,
    ) -> Result<String, SearchError> {
        let table = self.table(location)?;
        table.indexer().put_document(id, document)?;
        table.commit()?;
        debug!(location = %location, id, "Updated record");
        Ok(id.to_string())
    }

    fn delete_record(&self, location: &IndexLocation, id: &str) -> Result<(), SearchError> {
        let table = self.table(location)?;
        if !table.searcher().contains_id(id)? {
            return Err(SearchError::DocumentNotFound(id.to_string()));
        }
        table.indexer().delete_document(id)?;
        table.commit()?;
        debug!(location = %location, id, "Deleted record");
        Ok(())
    }

    fn search(
        &self,
        location: &IndexLocation,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.table(location)?.searcher().search(request)
    }
}
