//! Error types for indexing, synchronization and querying.

use mirror_search::SearchError;
use mirror_types::MirrorError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while keeping the index in sync or querying it
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Missing or invalid entity configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend rejected an index write
    #[error("Sync failed for {entity_type} {key}: {source}")]
    Sync {
        entity_type: String,
        key: String,
        #[source]
        source: SearchError,
    },

    /// Query could not be built or the backend failed to answer
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Primary store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<MirrorError> for IndexingError {
    fn from(err: MirrorError) -> Self {
        match err {
            MirrorError::Config(msg) => IndexingError::Config(msg),
        }
    }
}
