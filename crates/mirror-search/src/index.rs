//! Tantivy index management.
//!
//! Each provisioned `(index, table)` pair is one Tantivy index, held either in
//! RAM or on disk under `<root>/<index>/<table>`.

use std::path::{Path, PathBuf};

use tantivy::{Index, IndexReader, ReloadPolicy};
use tracing::{debug, info};

use mirror_types::{IndexLocation, Settings};

use crate::error::SearchError;
use crate::indexer::SearchIndexer;
use crate::schema::{Mapping, MirrorSchema};
use crate::searcher::TableSearcher;

/// Default memory budget for IndexWriter (50MB)
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Search index configuration
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Root directory for on-disk indexes; `None` keeps everything in RAM
    pub root: Option<PathBuf>,
    /// Memory budget for each table's writer in MB
    pub writer_memory_mb: usize,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            root: None,
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }
}

impl SearchIndexConfig {
    pub fn in_ram() -> Self {
        Self::default()
    }

    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    /// On-disk config under `index_root` with the configured writer budget.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::on_disk(&settings.index_root).with_memory_mb(settings.writer_memory_mb)
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }

    /// Directory of an index namespace, if on disk.
    pub fn index_dir(&self, location: &IndexLocation) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(&location.index))
    }

    /// Directory of one table, if on disk.
    pub fn table_dir(&self, location: &IndexLocation) -> Option<PathBuf> {
        self.index_dir(location).map(|dir| dir.join(&location.table))
    }
}

/// One table: a Tantivy index with its writer and reader.
pub struct TableIndex {
    index: Index,
    schema: MirrorSchema,
    mapping: Mapping,
    indexer: SearchIndexer,
    reader: IndexReader,
}

impl TableIndex {
    /// Open the table at `path`, or create it; `None` creates it in RAM.
    pub fn open_or_create(
        path: Option<&Path>,
        mapping: &Mapping,
        writer_memory_mb: usize,
    ) -> Result<Self, SearchError> {
        let index = match path {
            Some(path) => open_or_create_index(path, mapping)?,
            None => Index::create_in_ram(mapping.to_schema()?.schema().clone()),
        };
        let schema = MirrorSchema::from_schema(index.schema())?;

        let memory_budget = writer_memory_mb * 1024 * 1024;
        let writer = index.writer_with_num_threads(1, memory_budget)?;
        debug!(memory_mb = writer_memory_mb, "Created index writer");

        // Reloaded explicitly after every commit
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            indexer: SearchIndexer::from_writer(writer, schema.clone()),
            index,
            schema,
            mapping: mapping.clone(),
            reader,
        })
    }

    pub fn schema(&self) -> &MirrorSchema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn indexer(&self) -> &SearchIndexer {
        &self.indexer
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    /// Searcher over the last reloaded state.
    pub fn searcher(&self) -> TableSearcher<'_> {
        TableSearcher::new(self)
    }

    /// Commit pending writes and make them visible to the next search.
    ///
    /// A failed commit rolls the pending writes back.
    pub fn commit(&self) -> Result<u64, SearchError> {
        match self.indexer.commit() {
            Ok(opstamp) => {
                self.reader.reload()?;
                Ok(opstamp)
            }
            Err(e) => {
                self.indexer.rollback()?;
                Err(e)
            }
        }
    }
}

/// Open an existing index or create a new one.
///
/// Uses MmapDirectory for persistence.
pub fn open_or_create_index(path: &Path, mapping: &Mapping) -> Result<Index, SearchError> {
    if path.join("meta.json").exists() {
        debug!(path = ?path, "Opening existing index");
        let index = Index::open_in_dir(path)?;
        Ok(index)
    } else {
        info!(path = ?path, "Creating new index");
        std::fs::create_dir_all(path)?;
        let schema = mapping.to_schema()?;
        let index = Index::create_in_dir(path, schema.schema().clone())?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_new_table_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let config = SearchIndexConfig::on_disk(temp_dir.path()).with_memory_mb(15);
        let location = IndexLocation::new("site", "pages");
        let dir = config.table_dir(&location).unwrap();

        let _table = TableIndex::open_or_create(Some(&dir), &Mapping::default(), 15).unwrap();
        assert!(dir.join("meta.json").exists());
        assert_eq!(dir, temp_dir.path().join("site").join("pages"));
    }

    #[test]
    fn test_reopen_existing_table() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("site").join("pages");

        {
            let table = TableIndex::open_or_create(Some(&dir), &Mapping::default(), 15).unwrap();
            table.commit().unwrap();
        }

        let table = TableIndex::open_or_create(Some(&dir), &Mapping::default(), 15).unwrap();
        assert_eq!(table.searcher().num_docs(), 0);
    }

    #[test]
    fn test_in_ram_table() {
        let table = TableIndex::open_or_create(None, &Mapping::default(), 15).unwrap();
        assert_eq!(table.searcher().num_docs(), 0);
    }

    #[test]
    fn test_config_default() {
        let config = SearchIndexConfig::default();
        assert!(config.root.is_none());
        assert_eq!(config.writer_memory_mb, DEFAULT_WRITER_MEMORY_MB);
        assert!(config.table_dir(&IndexLocation::new("a", "b")).is_none());
    }
}
