//! Primary-store interface and an in-memory implementation.
//!
//! The primary store owns the authoritative records. The index only reads
//! from it: single records by key, pages of keys for re-indexing, and key-set
//! lookups when turning search hits back into records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::RwLock;

use indexmap::IndexMap;
use thiserror::Error;

use mirror_types::{AssociationKey, ColumnTypes, FieldValue, Record};

/// Errors reported by a primary store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A filter on records.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value
    Equals { field: String, value: FieldValue },
    /// Primary key is one of the keys
    KeyIn(Vec<AssociationKey>),
}

impl Condition {
    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Condition::Equals {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Sort direction on the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    Ascending,
    Descending,
}

/// Options for `find_all` and `list_keys`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub conditions: Vec<Condition>,
    /// Fields to return; all when `None`
    pub fields: Option<Vec<String>>,
    pub limit: Option<usize>,
    /// 1-based page number, used with `limit`
    pub page: Option<usize>,
    pub order: Option<KeyOrder>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn ordered(mut self, order: KeyOrder) -> Self {
        self.order = Some(order);
        self
    }
}

/// Read access to the primary store.
pub trait PrimaryStore: Send + Sync {
    /// Read one record; `None` when it does not exist.
    fn read_by_key(
        &self,
        entity_type: &str,
        key: &AssociationKey,
    ) -> Result<Option<Record>, StoreError>;

    fn find_all(&self, entity_type: &str, options: &FindOptions)
        -> Result<Vec<Record>, StoreError>;

    fn list_keys(
        &self,
        entity_type: &str,
        options: &FindOptions,
    ) -> Result<Vec<AssociationKey>, StoreError>;

    /// Column types of the entity; `None` when the store has no metadata.
    fn column_types(&self, entity_type: &str) -> Result<Option<ColumnTypes>, StoreError>;

    /// Key of the most recently inserted record.
    fn last_inserted_key(&self, entity_type: &str) -> Result<Option<AssociationKey>, StoreError>;
}

struct MemoryTable {
    primary_key: String,
    columns: Option<ColumnTypes>,
    rows: IndexMap<AssociationKey, Record>,
    last_inserted: Option<AssociationKey>,
}

impl MemoryTable {
    fn matching(&self, options: &FindOptions) -> Vec<(&AssociationKey, &Record)> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .filter(|(key, record)| {
                options
                    .conditions
                    .iter()
                    .all(|condition| matches_condition(key, record, condition))
            })
            .collect();

        match options.order {
            Some(KeyOrder::Ascending) => rows.sort_by(|a, b| a.0.natural_cmp(b.0)),
            Some(KeyOrder::Descending) => rows.sort_by(|a, b| b.0.natural_cmp(a.0)),
            None => {}
        }

        match options.limit {
            Some(limit) => {
                let page = options.page.unwrap_or(1).max(1);
                rows.into_iter().skip((page - 1) * limit).take(limit).collect()
            }
            None => rows,
        }
    }
}

fn matches_condition(key: &AssociationKey, record: &Record, condition: &Condition) -> bool {
    match condition {
        Condition::Equals { field, value } => record.get(field) == Some(value),
        Condition::KeyIn(keys) => keys.contains(key),
    }
}

/// In-memory primary store.
///
/// Counts `find_all` and `list_keys` calls as page reads.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
    page_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity type, replacing any earlier definition.
    pub fn define(
        &self,
        entity_type: impl Into<String>,
        primary_key: impl Into<String>,
        columns: Option<ColumnTypes>,
    ) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.insert(
            entity_type.into(),
            MemoryTable {
                primary_key: primary_key.into(),
                columns,
                rows: IndexMap::new(),
                last_inserted: None,
            },
        );
    }

    /// Insert or replace a record, returning its key.
    pub fn insert(&self, entity_type: &str, record: Record) -> Result<AssociationKey, StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let table = tables
            .get_mut(entity_type)
            .ok_or_else(|| StoreError::UnknownEntity(entity_type.to_string()))?;
        let key = record.key_of(&table.primary_key).ok_or_else(|| {
            StoreError::Backend(format!(
                "record has no {} value",
                table.primary_key
            ))
        })?;
        table.rows.insert(key.clone(), record);
        table.last_inserted = Some(key.clone());
        Ok(key)
    }

    pub fn remove(&self, entity_type: &str, key: &AssociationKey) -> Option<Record> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables
            .get_mut(entity_type)
            .and_then(|table| table.rows.shift_remove(key))
    }

    /// Number of `find_all`/`list_keys` calls so far.
    pub fn page_reads(&self) -> usize {
        self.page_reads.load(AtomicOrdering::SeqCst)
    }

    pub fn reset_page_reads(&self) {
        self.page_reads.store(0, AtomicOrdering::SeqCst);
    }

    fn with_table<T>(
        &self,
        entity_type: &str,
        f: impl FnOnce(&MemoryTable) -> T,
    ) -> Result<T, StoreError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .get(entity_type)
            .map(f)
            .ok_or_else(|| StoreError::UnknownEntity(entity_type.to_string()))
    }
}

impl PrimaryStore for MemoryStore {
    fn read_by_key(
        &self,
        entity_type: &str,
        key: &AssociationKey,
    ) -> Result<Option<Record>, StoreError> {
        self.with_table(entity_type, |table| table.rows.get(key).cloned())
    }

    fn find_all(
        &self,
        entity_type: &str,
        options: &FindOptions,
    ) -> Result<Vec<Record>, StoreError> {
        self.page_reads.fetch_add(1, AtomicOrdering::SeqCst);
        self.with_table(entity_type, |table| {
            table
                .matching(options)
                .into_iter()
                .map(|(_, record)| match &options.fields {
                    Some(fields) => record
                        .iter()
                        .filter(|(name, _)| fields.iter().any(|f| f == name))
                        .map(|(name, value)| (name, value.clone()))
                        .collect(),
                    None => record.clone(),
                })
                .collect()
        })
    }

    fn list_keys(
        &self,
        entity_type: &str,
        options: &FindOptions,
    ) -> Result<Vec<AssociationKey>, StoreError> {
        self.page_reads.fetch_add(1, AtomicOrdering::SeqCst);
        self.with_table(entity_type, |table| {
            table
                .matching(options)
                .into_iter()
                .map(|(key, _)| key.clone())
                .collect()
        })
    }

    fn column_types(&self, entity_type: &str) -> Result<Option<ColumnTypes>, StoreError> {
        self.with_table(entity_type, |table| table.columns.clone())
    }

    fn last_inserted_key(&self, entity_type: &str) -> Result<Option<AssociationKey>, StoreError> {
        self.with_table(entity_type, |table| table.last_inserted.clone())
    }
}
