//! Association keys: the primary-store identifier an index document refers to.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary-store key of a source record.
///
/// Keys are opaque strings. Integer primary keys are carried in their
/// decimal form; UUID keys as-is. An empty key means "not known yet".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociationKey(String);

impl AssociationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the key is empty or whitespace only.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Ordering used for primary-key traversal.
    ///
    /// Keys that both parse as integers compare numerically so that
    /// `"9" < "10"`; everything else compares lexicographically.
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<i64>(), other.0.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssociationKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AssociationKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for AssociationKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for AssociationKey {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for AssociationKey {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for AssociationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
