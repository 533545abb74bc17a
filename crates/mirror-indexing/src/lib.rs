//! Keeps a search index in sync with a primary store and queries it.
//!
//! ## Key Components
//!
//! - [`EntityRegistry`]: per-entity settings, resolved locations and hooks
//! - [`FieldExtractor`]: turns a record into normalized index text
//! - [`IndexSynchronizer`]: upserts and deletes index documents, optionally
//!   through the deferred [`WriteQueue`]
//! - [`QueryEngine`]: free-text, structured and proximity searches
//! - [`reconcile`]: restores relevance order on primary-store results
//! - [`BatchReindexer`]: pages through the primary store to rebuild an entity
//!
//! ## Flow
//!
//! 1. The host reports a save or delete to the [`IndexSynchronizer`]
//! 2. The record's text is extracted and the document created, updated or
//!    removed on the [`mirror_search::SearchBackend`]
//! 3. Searches go through the [`QueryEngine`], which maps hits back to keys
//!    and, on request, to primary-store records in relevance order
//!
//! ## Example
//!
//! ```ignore
//! use mirror_indexing::{EntityRegistry, IndexSynchronizer, SearchOptions};
//!
//! let registry = EntityRegistry::from_settings(&settings)?;
//! let sync = IndexSynchronizer::new(registry, backend, store);
//! sync.on_record_saved("Page", Some(&key), None)?;
//!
//! let keys = sync.engine().search_keys("Page", "rust", &SearchOptions::new())?;
//! ```

pub mod engine;
pub mod error;
pub mod extractor;
pub mod html;
pub mod provision;
pub mod queue;
pub mod rebuild;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod synchronizer;

pub use engine::{build_proximity_query, ProximityOptions, QueryEngine, SearchInput, SearchOptions};
pub use error::IndexingError;
pub use extractor::{FieldExtractor, FIELD_SEPARATOR};
pub use provision::Provisioner;
pub use queue::{FlushReport, WriteQueue, WriteTask};
pub use rebuild::{
    BatchReindexer, LoggingProgressCallback, NoOpProgressCallback, ProgressCallback,
    RebuildConfig, RebuildProgress, RebuildResult, ThrottleConfig,
};
pub use reconcile::{reconcile, reconcile_records};
pub use registry::{EntityConfig, EntityHooks, EntityRegistry};
pub use store::{Condition, FindOptions, KeyOrder, MemoryStore, PrimaryStore, StoreError};
pub use synchronizer::{IndexSynchronizer, SyncOutcome};
