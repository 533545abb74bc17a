//! # mirror-types
//!
//! Shared domain types for the mirror index.
//!
//! This crate defines the data structures every other crate speaks:
//! - Records: heterogeneous primary-store rows (`Record`, `FieldValue`)
//! - Keys: the primary-store identifier an index document points back to
//! - Column metadata: type tags used to decide which fields are text-like
//! - Settings: per-entity indexing configuration and its loader
//!
//! ## Usage
//!
//! ```rust
//! use mirror_types::{AssociationKey, Record};
//!
//! let record = Record::new().with("id", 7).with("title", "Hello");
//! assert_eq!(record.key_of("id"), Some(AssociationKey::from(7)));
//! ```

pub mod column;
pub mod config;
pub mod error;
pub mod key;
pub mod record;

pub use column::{ColumnType, ColumnTypes};
pub use config::{
    EntitySettings, FieldSelection, IndexFailurePolicy, IndexLocation, Settings,
};
pub use error::MirrorError;
pub use key::AssociationKey;
pub use record::{FieldValue, Record};
