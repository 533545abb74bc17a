//! Keeps one index document per `(entity type, key)` in step with the
//! primary store.
//!
//! The synchronizer is the only writer to the index. Upserts extract the
//! record's text and create, update or delete the document accordingly;
//! deletes remove it and treat an already-missing document as done. With
//! deferred writes the computed operation is queued until `flush`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use mirror_search::{IndexDocument, SearchBackend, SearchError};
use mirror_types::{AssociationKey, IndexFailurePolicy, Record};

use crate::engine::QueryEngine;
use crate::error::IndexingError;
use crate::extractor::FieldExtractor;
use crate::provision::Provisioner;
use crate::queue::{FlushReport, WriteQueue, WriteTask};
use crate::registry::{EntityConfig, EntityRegistry};
use crate::store::PrimaryStore;

/// What a synchronization call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No key could be resolved, or indexing is disabled for the call
    Skipped,
    /// Empty text and no existing document
    NothingToIndex,
    Created,
    Updated,
    Deleted,
    /// Held in the write queue until the next flush
    Queued,
}

pub struct IndexSynchronizer {
    registry: Arc<EntityRegistry>,
    backend: Arc<dyn SearchBackend>,
    store: Arc<dyn PrimaryStore>,
    engine: QueryEngine,
    provisioner: Arc<Provisioner>,
    queue: WriteQueue,
}

fn sync_error(entity: &EntityConfig, key: &AssociationKey, source: SearchError) -> IndexingError {
    IndexingError::Sync {
        entity_type: entity.entity_type.clone(),
        key: key.to_string(),
        source,
    }
}

impl IndexSynchronizer {
    pub fn new(
        registry: EntityRegistry,
        backend: Arc<dyn SearchBackend>,
        store: Arc<dyn PrimaryStore>,
    ) -> Self {
        let registry = Arc::new(registry);
        let provisioner = Arc::new(Provisioner::new());
        let engine = QueryEngine::new(
            registry.clone(),
            backend.clone(),
            store.clone(),
            provisioner.clone(),
        );
        Self {
            registry,
            backend,
            store,
            engine,
            provisioner,
            queue: WriteQueue::new(),
        }
    }

    /// The read side sharing this synchronizer's provisioning state.
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn PrimaryStore {
        self.store.as_ref()
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// Bring the document for one record up to date.
    ///
    /// The key is `key`, else the record's primary-key value; without either
    /// the call is a no-op. The record is re-read from the primary store when
    /// `query_after_save` is set or no record is supplied.
    pub fn sync_upsert(
        &self,
        entity_type: &str,
        key: Option<&AssociationKey>,
        record: Option<&Record>,
    ) -> Result<SyncOutcome, IndexingError> {
        let entity = self.registry.get(entity_type)?;
        let Some(task) = self.prepare_upsert(&entity, key, record)? else {
            return Ok(SyncOutcome::Skipped);
        };

        if entity.settings.deferred_writes {
            self.queue.push(task);
            return Ok(SyncOutcome::Queued);
        }

        self.execute(&entity, &task)
    }

    /// Compute the upsert for `key` without executing or queueing it.
    ///
    /// Lets a caller batch its own writes apart from the shared queue.
    pub fn stage_upsert(
        &self,
        entity_type: &str,
        key: &AssociationKey,
    ) -> Result<Option<WriteTask>, IndexingError> {
        let entity = self.registry.get(entity_type)?;
        self.prepare_upsert(&entity, Some(key), None)
    }

    /// Remove the document for one key. A missing document is not an error.
    pub fn sync_delete(
        &self,
        entity_type: &str,
        key: &AssociationKey,
    ) -> Result<SyncOutcome, IndexingError> {
        let entity = self.registry.get(entity_type)?;
        if key.is_empty() {
            return Ok(SyncOutcome::Skipped);
        }

        if entity.settings.deferred_writes {
            self.queue.push(WriteTask::Delete {
                entity_type: entity.entity_type.clone(),
                key: key.clone(),
            });
            return Ok(SyncOutcome::Queued);
        }

        self.delete_now(&entity, key)
    }

    /// Index a record after the primary store saved it.
    ///
    /// Skips when `rebuild_on_update` is off. Falls back to the store's last
    /// inserted key when neither `key` nor the record provides one. Under the
    /// `best_effort` policy a failed index write is logged and reported as
    /// `Skipped`.
    pub fn on_record_saved(
        &self,
        entity_type: &str,
        key: Option<&AssociationKey>,
        record: Option<&Record>,
    ) -> Result<SyncOutcome, IndexingError> {
        let entity = self.registry.get(entity_type)?;
        if !entity.settings.rebuild_on_update {
            return Ok(SyncOutcome::Skipped);
        }

        let known = key.filter(|k| !k.is_empty()).cloned().or_else(|| {
            record.and_then(|r| r.unwrap_alias(entity_type).key_of(entity.primary_key()))
        });
        let key = match known {
            Some(key) => Some(key),
            None => self.store.last_inserted_key(entity_type)?,
        };

        let result = self.sync_upsert(entity_type, key.as_ref(), record);
        self.apply_policy(&entity, result)
    }

    /// Remove a record's document after the primary store deleted it.
    pub fn on_record_deleted(
        &self,
        entity_type: &str,
        key: &AssociationKey,
    ) -> Result<SyncOutcome, IndexingError> {
        let entity = self.registry.get(entity_type)?;
        let result = self.sync_delete(entity_type, key);
        self.apply_policy(&entity, result)
    }

    /// Execute every queued write in order.
    ///
    /// A failing task is logged and counted; later tasks still run.
    pub fn flush(&self) -> FlushReport {
        self.apply_tasks(self.queue.drain())
    }

    /// Execute `tasks` in order, as `flush` does for the shared queue.
    pub fn apply_tasks(&self, tasks: impl IntoIterator<Item = WriteTask>) -> FlushReport {
        let mut report = FlushReport::default();
        for task in tasks {
            let result = self
                .registry
                .get(task.entity_type())
                .and_then(|entity| self.execute(&entity, &task));
            match result {
                Ok(_) => report.executed += 1,
                Err(e) => {
                    warn!(
                        entity_type = task.entity_type(),
                        key = %task.key(),
                        error = %e,
                        "Deferred index write failed"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.executed + report.failed > 0 {
            info!(
                executed = report.executed,
                failed = report.failed,
                "Flushed deferred index writes"
            );
        }
        report
    }

    fn execute(&self, entity: &EntityConfig, task: &WriteTask) -> Result<SyncOutcome, IndexingError> {
        match task {
            WriteTask::Upsert { key, text, .. } => self.write_text(entity, key, text),
            WriteTask::Delete { key, .. } => self.delete_now(entity, key),
        }
    }

    /// Resolve the key (explicit, else the record's primary key) and
    /// compute the text. `None` when no key is known.
    fn prepare_upsert(
        &self,
        entity: &EntityConfig,
        key: Option<&AssociationKey>,
        record: Option<&Record>,
    ) -> Result<Option<WriteTask>, IndexingError> {
        let known = key.filter(|k| !k.is_empty()).cloned().or_else(|| {
            record.and_then(|r| r.unwrap_alias(&entity.entity_type).key_of(entity.primary_key()))
        });
        let Some(key) = known else {
            debug!(entity_type = %entity.entity_type, "No association key, skipping index");
            return Ok(None);
        };

        let text = self.compute_text(entity, &key, record)?;
        Ok(Some(WriteTask::Upsert {
            entity_type: entity.entity_type.clone(),
            key,
            text,
        }))
    }

    fn apply_policy(
        &self,
        entity: &EntityConfig,
        result: Result<SyncOutcome, IndexingError>,
    ) -> Result<SyncOutcome, IndexingError> {
        match (result, entity.settings.index_failure_policy) {
            (Err(e), IndexFailurePolicy::BestEffort) => {
                warn!(
                    entity_type = %entity.entity_type,
                    error = %e,
                    "Index write failed, continuing"
                );
                Ok(SyncOutcome::Skipped)
            }
            (result, _) => result,
        }
    }

    /// Text to index for `key`, re-reading the record when required.
    fn compute_text(
        &self,
        entity: &EntityConfig,
        key: &AssociationKey,
        supplied: Option<&Record>,
    ) -> Result<String, IndexingError> {
        let fetched;
        let record = if entity.settings.query_after_save || supplied.is_none() {
            fetched = match &entity.hooks.fetch {
                Some(fetch) => fetch(key)?,
                None => self.store.read_by_key(&entity.entity_type, key)?,
            };
            fetched.as_ref()
        } else {
            supplied
        };

        let Some(record) = record else {
            debug!(entity_type = %entity.entity_type, key = %key, "Record not found");
            return Ok(String::new());
        };

        let columns = self.store.column_types(&entity.entity_type)?;
        Ok(FieldExtractor::new(entity)
            .with_columns(columns.as_ref())
            .extract(record))
    }

    /// Apply already-computed text to the index.
    fn write_text(
        &self,
        entity: &EntityConfig,
        key: &AssociationKey,
        text: &str,
    ) -> Result<SyncOutcome, IndexingError> {
        self.provisioner
            .ensure(self.backend.as_ref(), &entity.location)
            .map_err(|e| sync_error(entity, key, e))?;
        let existing = self.engine.find_document(&entity.entity_type, key)?;

        if text.trim().is_empty() {
            return match existing {
                Some(document) => self.delete_document(entity, key, document),
                None => Ok(SyncOutcome::NothingToIndex),
            };
        }

        if let Some(mut document) = existing {
            if let Some(id) = document.id.clone() {
                // The id may have vanished since the lookup; fall through to create
                let still_there = self
                    .backend
                    .exists(&entity.location, &id)
                    .map_err(|e| sync_error(entity, key, e))?;
                if still_there {
                    document.touch(text);
                    self.backend
                        .update_record(&entity.location, &id, &document)
                        .map_err(|e| sync_error(entity, key, e))?;
                    debug!(entity_type = %entity.entity_type, key = %key, id = %id, "Updated index document");
                    return Ok(SyncOutcome::Updated);
                }
            }
        }

        let document = IndexDocument::new(&entity.entity_type, key.clone(), text);
        let id = self
            .backend
            .create_record(&entity.location, &document)
            .map_err(|e| sync_error(entity, key, e))?;
        debug!(entity_type = %entity.entity_type, key = %key, id = %id, "Created index document");
        Ok(SyncOutcome::Created)
    }

    fn delete_now(
        &self,
        entity: &EntityConfig,
        key: &AssociationKey,
    ) -> Result<SyncOutcome, IndexingError> {
        self.provisioner
            .ensure(self.backend.as_ref(), &entity.location)
            .map_err(|e| sync_error(entity, key, e))?;
        match self.engine.find_document(&entity.entity_type, key)? {
            Some(document) => self.delete_document(entity, key, document),
            None => Ok(SyncOutcome::NothingToIndex),
        }
    }

    fn delete_document(
        &self,
        entity: &EntityConfig,
        key: &AssociationKey,
        document: IndexDocument,
    ) -> Result<SyncOutcome, IndexingError> {
        let Some(id) = document.id else {
            return Ok(SyncOutcome::NothingToIndex);
        };
        match self.backend.delete_record(&entity.location, &id) {
            Ok(()) => {
                debug!(entity_type = %entity.entity_type, key = %key, id = %id, "Deleted index document");
                Ok(SyncOutcome::Deleted)
            }
            Err(SearchError::DocumentNotFound(_)) => {
                debug!(entity_type = %entity.entity_type, key = %key, id = %id, "Index document already gone");
                Ok(SyncOutcome::Deleted)
            }
            Err(e) => Err(sync_error(entity, key, e)),
        }
    }
}
