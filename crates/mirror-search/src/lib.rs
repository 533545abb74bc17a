//! # mirror-search
//!
//! Search backend interface and embedded Tantivy adapter for the mirror index.
//!
//! The index holds one document per `(entity type, association key)` pair,
//! each carrying the normalized text of a primary-store record. This crate
//! knows nothing about records; it stores and ranks documents.
//!
//! ## Features
//! - `SearchBackend` trait: provisioning, record writes, search
//! - Query DSL with JSON form, including a rescore pass for proximity boosting
//! - Embedded Tantivy implementation, in RAM or on disk, BM25 ranking

pub mod backend;
pub mod document;
pub mod error;
pub mod index;
pub mod indexer;
pub mod query;
pub mod schema;
pub mod searcher;

pub use backend::{SearchBackend, TantivyBackend};
pub use document::{IndexDocument, SearchHit};
pub use error::SearchError;
pub use index::{SearchIndexConfig, TableIndex};
pub use indexer::SearchIndexer;
pub use query::{FieldTarget, Projection, Query, Rescore, SearchRequest};
pub use schema::{FieldKind, FieldMapping, Mapping, MirrorSchema};
pub use searcher::TableSearcher;
