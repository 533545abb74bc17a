//! Search indexer for writing documents to a table's Tantivy index.
//!
//! The indexer wraps IndexWriter behind a Mutex so one table can be written
//! from several threads. Documents are not visible until commit() is called.

use std::sync::Mutex;

use tantivy::{IndexWriter, Term};
use tracing::{debug, warn};

use crate::document::{to_tantivy_doc, IndexDocument};
use crate::error::SearchError;
use crate::schema::MirrorSchema;

/// Manages document writes for one table.
pub struct SearchIndexer {
    writer: Mutex<IndexWriter>,
    schema: MirrorSchema,
}

impl SearchIndexer {
    /// Create from an existing writer.
    pub fn from_writer(writer: IndexWriter, schema: MirrorSchema) -> Self {
        Self {
            writer: Mutex::new(writer),
            schema,
        }
    }

    /// Write a document under `id`.
    ///
    /// If a document with the same id exists, it will be replaced.
    pub fn put_document(&self, id: &str, document: &IndexDocument) -> Result<(), SearchError> {
        let doc = to_tantivy_doc(&self.schema, id, document);

        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        // Delete existing document with same ID (for update)
        let term = Term::from_field_text(self.schema.id, id);
        writer.delete_term(term);

        writer.add_document(doc)?;

        debug!(
            id,
            entity_type = %document.entity_type,
            key = %document.association_key,
            "Indexed document"
        );
        Ok(())
    }

    /// Delete a document by ID.
    pub fn delete_document(&self, id: &str) -> Result<(), SearchError> {
        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let term = Term::from_field_text(self.schema.id, id);
        writer.delete_term(term);

        debug!(id, "Deleted document");
        Ok(())
    }

    /// Commit pending changes.
    pub fn commit(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.commit()?;
        debug!(opstamp, "Committed index changes");
        Ok(opstamp)
    }

    /// Rollback uncommitted changes.
    pub fn rollback(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.rollback()?;
        warn!(opstamp, "Rolled back index changes");
        Ok(opstamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TableIndex;
    use crate::schema::Mapping;
    use mirror_types::AssociationKey;

    fn table() -> TableIndex {
        TableIndex::open_or_create(None, &Mapping::default(), 15).unwrap()
    }

    fn sample(key: &str, text: &str) -> IndexDocument {
        IndexDocument::new("Page", AssociationKey::from(key), text)
    }

    #[test]
    fn test_put_document() {
        let table = table();
        table.indexer().put_document("id-1", &sample("p1", "hello")).unwrap();
        table.commit().unwrap();
        assert_eq!(table.searcher().num_docs(), 1);
    }

    #[test]
    fn test_replace_existing_document() {
        let table = table();
        let indexer = table.indexer();

        indexer.put_document("id-1", &sample("p1", "version one")).unwrap();
        table.commit().unwrap();
        indexer.put_document("id-1", &sample("p1", "version two")).unwrap();
        table.commit().unwrap();

        assert_eq!(table.searcher().num_docs(), 1);
    }

    #[test]
    fn test_delete_document() {
        let table = table();
        table.indexer().put_document("id-1", &sample("p1", "hello")).unwrap();
        table.commit().unwrap();

        table.indexer().delete_document("id-1").unwrap();
        table.commit().unwrap();
        assert_eq!(table.searcher().num_docs(), 0);
    }

    #[test]
    fn test_rollback() {
        let table = table();
        table.indexer().put_document("id-1", &sample("p1", "hello")).unwrap();
        table.indexer().rollback().unwrap();
        table.commit().unwrap();
        assert_eq!(table.searcher().num_docs(), 0);
    }
}
