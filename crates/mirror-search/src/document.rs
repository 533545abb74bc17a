//! Index documents and search hits, and their Tantivy mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tantivy::doc;
use tantivy::schema::Value;
use tantivy::TantivyDocument;

use mirror_types::AssociationKey;

use crate::error::SearchError;
use crate::schema::MirrorSchema;

/// The backend-stored representation of one primary-store record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Backend-assigned id, absent until the first write
    pub id: Option<String>,
    pub entity_type: String,
    pub association_key: AssociationKey,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl IndexDocument {
    /// A fresh document with `created_at == modified_at == now`.
    pub fn new(
        entity_type: impl Into<String>,
        association_key: AssociationKey,
        text: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            entity_type: entity_type.into(),
            association_key,
            text: text.into(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Replace the text and refresh `modified_at`; `created_at` is kept.
    pub fn touch(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.modified_at = Utc::now();
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Backend document id
    pub id: String,
    pub association_key: AssociationKey,
    /// Relevance score, higher is more relevant
    pub score: Option<f32>,
    /// Full document, only when requested
    pub document: Option<IndexDocument>,
}

/// Convert an IndexDocument to a Tantivy document under the given id.
pub fn to_tantivy_doc(schema: &MirrorSchema, id: &str, document: &IndexDocument) -> TantivyDocument {
    doc!(
        schema.id => id.to_string(),
        schema.association_key => document.association_key.as_str().to_string(),
        schema.entity_type => document.entity_type.clone(),
        schema.entity_type_exact => document.entity_type.clone(),
        schema.text => document.text.clone(),
        schema.created_at => document.created_at.timestamp_millis(),
        schema.modified_at => document.modified_at.timestamp_millis()
    )
}

/// Rebuild an IndexDocument from its stored fields.
pub fn from_tantivy_doc(
    schema: &MirrorSchema,
    doc: &TantivyDocument,
) -> Result<IndexDocument, SearchError> {
    let text_of = |field, name: &str| {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| SearchError::SchemaMismatch(format!("stored document lacks {}", name)))
    };
    let time_of = |field| {
        doc.get_first(field)
            .and_then(|v| v.as_i64())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default()
    };

    Ok(IndexDocument {
        id: Some(text_of(schema.id, "id")?),
        entity_type: text_of(schema.entity_type, "entity_type")?,
        association_key: AssociationKey::new(text_of(schema.association_key, "association_key")?),
        text: text_of(schema.text, "text")?,
        created_at: time_of(schema.created_at),
        modified_at: time_of(schema.modified_at),
    })
}

/// Read the id and association key of a stored document.
pub fn hit_identity(
    schema: &MirrorSchema,
    doc: &TantivyDocument,
) -> Result<(String, AssociationKey), SearchError> {
    let id = doc
        .get_first(schema.id)
        .and_then(|v| v.as_str())
        .ok_or_else(|| SearchError::SchemaMismatch("stored document lacks id".into()))?;
    let key = doc
        .get_first(schema.association_key)
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Ok((id.to_string(), AssociationKey::new(key)))
}
