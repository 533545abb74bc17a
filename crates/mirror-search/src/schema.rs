//! Index mapping and the Tantivy schema built from it.
//!
//! Every table holds documents of one shape:
//! - id: STRING | STORED - backend-assigned document id
//! - association_key: STRING | STORED - primary-store key of the source record
//! - entity_type: TEXT | STORED - entity type name, weighted low
//! - entity_type_exact: STRING | STORED - entity type name for exact filters
//! - text: TEXT | STORED - normalized indexable text (with positions)
//! - created_at / modified_at: i64 | STORED - epoch milliseconds

use serde::{Deserialize, Serialize};
use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};

use crate::error::SearchError;

/// Weight of the entity type relative to the text when querying all fields.
pub const ENTITY_TYPE_BOOST: f32 = 0.2;

/// How a mapped field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Exact-match keyword, not tokenized
    Keyword,
    /// Tokenized full text with positions
    Text,
    /// Epoch milliseconds
    Timestamp,
}

/// One field of the at-rest document shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_boost")]
    pub boost: f32,
}

fn default_boost() -> f32 {
    1.0
}

impl FieldMapping {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            boost: default_boost(),
        }
    }

    fn boosted(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

/// At-rest schema handed to `create_mapping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub fields: Vec<FieldMapping>,
}

impl Default for Mapping {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldMapping::new("id", FieldKind::Keyword),
                FieldMapping::new("association_key", FieldKind::Keyword),
                FieldMapping::new("entity_type", FieldKind::Text).boosted(ENTITY_TYPE_BOOST),
                FieldMapping::new("entity_type_exact", FieldKind::Keyword),
                FieldMapping::new("text", FieldKind::Text),
                FieldMapping::new("created_at", FieldKind::Timestamp),
                FieldMapping::new("modified_at", FieldKind::Timestamp),
            ],
        }
    }
}

impl Mapping {
    /// Boost configured for a field (1.0 when unmapped).
    pub fn boost_of(&self, name: &str) -> f32 {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.boost)
            .unwrap_or(1.0)
    }

    /// Build the Tantivy schema for this mapping.
    pub fn to_schema(&self) -> Result<MirrorSchema, SearchError> {
        let mut builder = Schema::builder();
        for field in &self.fields {
            match field.kind {
                FieldKind::Keyword => {
                    builder.add_text_field(&field.name, STRING | STORED);
                }
                FieldKind::Text => {
                    builder.add_text_field(&field.name, TEXT | STORED);
                }
                FieldKind::Timestamp => {
                    builder.add_i64_field(&field.name, STORED);
                }
            }
        }
        MirrorSchema::from_schema(builder.build())
    }
}

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct MirrorSchema {
    schema: Schema,
    pub id: Field,
    pub association_key: Field,
    pub entity_type: Field,
    pub entity_type_exact: Field,
    pub text: Field,
    pub created_at: Field,
    pub modified_at: Field,
}

impl MirrorSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a MirrorSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
        };

        Ok(Self {
            id: field("id")?,
            association_key: field("association_key")?,
            entity_type: field("entity_type")?,
            entity_type_exact: field("entity_type_exact")?,
            text: field("text")?,
            created_at: field("created_at")?,
            modified_at: field("modified_at")?,
            schema,
        })
    }

    /// Fields a query over "all fields" targets, with their boosts.
    pub fn analyzed_fields(&self, mapping: &Mapping) -> Vec<(Field, f32)> {
        vec![
            (self.text, mapping.boost_of("text")),
            (self.entity_type, mapping.boost_of("entity_type")),
        ]
    }

    /// Resolve a field by name.
    pub fn field(&self, name: &str) -> Result<Field, SearchError> {
        self.schema
            .get_field(name)
            .map_err(|_| SearchError::InvalidQuery(format!("unknown field: {}", name)))
    }
}
