//! Structured query DSL understood by every search backend.
//!
//! Queries serialize externally tagged, in the familiar search-engine shape:
//!
//! ```json
//! {"query": {"match": {"field": "text", "query": "rust memory"}},
//!  "rescore": {"window_size": 50,
//!              "query": {"match_phrase": {"field": "text", "query": "rust memory", "slop": 50}}},
//!  "size": 20}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SearchError;

/// Field a query applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldTarget {
    /// All analyzed fields, each with its mapping boost
    #[default]
    All,
    Named(String),
}

impl FieldTarget {
    pub fn named(name: impl Into<String>) -> Self {
        FieldTarget::Named(name.into())
    }
}

impl From<String> for FieldTarget {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | "*" | "_all" => FieldTarget::All,
            _ => FieldTarget::Named(value),
        }
    }
}

impl From<&str> for FieldTarget {
    fn from(value: &str) -> Self {
        FieldTarget::from(value.to_string())
    }
}

impl fmt::Display for FieldTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldTarget::All => f.write_str("_all"),
            FieldTarget::Named(name) => f.write_str(name),
        }
    }
}

impl Serialize for FieldTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(FieldTarget::from)
    }
}

/// A query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Query-string syntax (`rust AND memory`, `"exact phrase"`)
    QueryString {
        query: String,
        #[serde(default)]
        field: FieldTarget,
    },
    /// Any-term match over the analyzed text
    Match {
        #[serde(default)]
        field: FieldTarget,
        query: String,
    },
    /// Phrase match; `slop` is the largest term distance still considered near
    MatchPhrase {
        #[serde(default)]
        field: FieldTarget,
        query: String,
        #[serde(default)]
        slop: u32,
    },
    /// Exact, non-analyzed term
    Term { field: String, value: String },
    Bool {
        #[serde(default)]
        must: Vec<Query>,
        #[serde(default)]
        should: Vec<Query>,
        #[serde(default)]
        must_not: Vec<Query>,
    },
    MatchAll {},
}

impl Query {
    pub fn query_string(query: impl Into<String>, field: FieldTarget) -> Self {
        Query::QueryString {
            query: query.into(),
            field,
        }
    }

    pub fn matching(field: FieldTarget, query: impl Into<String>) -> Self {
        Query::Match {
            field,
            query: query.into(),
        }
    }

    pub fn phrase(field: FieldTarget, query: impl Into<String>, slop: u32) -> Self {
        Query::MatchPhrase {
            field,
            query: query.into(),
            slop,
        }
    }

    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn match_all() -> Self {
        Query::MatchAll {}
    }
}

/// Which part of each hit to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    /// Association key, id and score only
    #[default]
    KeysOnly,
    FullDocument,
}

/// Second-pass re-ranking of the top `window_size` hits.
///
/// Within the window, `score = base * query_weight + rescore * rescore_query_weight`,
/// where a document the rescore query does not match contributes 0. Hits
/// outside the window keep their base score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rescore {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    pub query: Query,
    #[serde(default = "default_weight")]
    pub query_weight: f32,
    #[serde(default = "default_weight")]
    pub rescore_query_weight: f32,
}

fn default_window_size() -> usize {
    50
}

fn default_weight() -> f32 {
    1.0
}

impl Rescore {
    pub fn new(window_size: usize, query: Query) -> Self {
        Self {
            window_size,
            query,
            query_weight: default_weight(),
            rescore_query_weight: default_weight(),
        }
    }
}

/// A complete search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Query,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescore: Option<Rescore>,
    /// Maximum hits to return (backend default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Number of hits to skip
    #[serde(default)]
    pub from: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub projection: Projection,
}

/// Hits returned when a request does not set `size`.
pub const DEFAULT_SIZE: usize = 10;

impl SearchRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            rescore: None,
            size: None,
            from: 0,
            min_score: None,
            projection: Projection::KeysOnly,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_rescore(mut self, rescore: Rescore) -> Self {
        self.rescore = Some(rescore);
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn size_or_default(&self) -> usize {
        self.size.unwrap_or(DEFAULT_SIZE)
    }

    /// Parse a request from JSON.
    ///
    /// An object with a top-level `"query"` key is a full request; anything
    /// else is taken to be a bare query and wrapped as `{"query": ...}`.
    pub fn from_json(value: JsonValue) -> Result<Self, SearchError> {
        let wrapped = match value {
            JsonValue::Object(map) if map.contains_key("query") => JsonValue::Object(map),
            JsonValue::Object(map) => serde_json::json!({ "query": JsonValue::Object(map) }),
            other => {
                return Err(SearchError::InvalidQuery(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };
        Ok(serde_json::from_value(wrapped)?)
    }

    /// Parse a request from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, SearchError> {
        Self::from_json(serde_json::from_str(raw)?)
    }
}
