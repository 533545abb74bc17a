//! Read side of the index: building requests and turning hits into keys,
//! scores and primary-store records.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use mirror_search::{
    FieldTarget, IndexDocument, Projection, Query, Rescore, SearchBackend, SearchError, SearchHit,
    SearchRequest,
};
use mirror_types::{AssociationKey, Record};

use crate::error::IndexingError;
use crate::provision::Provisioner;
use crate::reconcile::reconcile_records;
use crate::registry::{EntityConfig, EntityRegistry};
use crate::store::{Condition, FindOptions, PrimaryStore};

/// What the caller wants to search for.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchInput {
    /// Free text, parsed with query-string syntax
    Text(String),
    Query(Query),
    Request(SearchRequest),
    /// A request or bare query in JSON form
    Json(JsonValue),
}

impl From<&str> for SearchInput {
    fn from(text: &str) -> Self {
        SearchInput::Text(text.to_string())
    }
}

impl From<String> for SearchInput {
    fn from(text: String) -> Self {
        SearchInput::Text(text)
    }
}

impl From<Query> for SearchInput {
    fn from(query: Query) -> Self {
        SearchInput::Query(query)
    }
}

impl From<SearchRequest> for SearchInput {
    fn from(request: SearchRequest) -> Self {
        SearchInput::Request(request)
    }
}

impl From<JsonValue> for SearchInput {
    fn from(value: JsonValue) -> Self {
        SearchInput::Json(value)
    }
}

/// Per-call search options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// Field searched by free text
    pub field: FieldTarget,
    /// Page size; the entity's `limit` when absent
    pub size: Option<usize>,
    /// 1-based page
    pub page: Option<usize>,
    pub min_score: Option<f32>,
    /// Return stored documents with each hit
    pub full_documents: bool,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<FieldTarget>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_full_documents(mut self) -> Self {
        self.full_documents = true;
        self
    }
}

/// Options for `build_proximity_query`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityOptions {
    pub field: FieldTarget,
    /// Number of top hits the phrase pass rescores
    pub window_size: usize,
    /// Largest term distance still counted as near
    pub slop: u32,
}

impl Default for ProximityOptions {
    fn default() -> Self {
        Self {
            field: FieldTarget::All,
            window_size: 50,
            slop: 50,
        }
    }
}

/// Build a two-stage proximity request.
///
/// Stage one matches any of the terms. Stage two adds a sloppy phrase score
/// to the top `window_size` hits, so terms that sit close together rank
/// higher and nothing matched by stage one is dropped.
pub fn build_proximity_query(terms: &str, options: &ProximityOptions) -> SearchRequest {
    let base = Query::matching(options.field.clone(), terms);
    let phrase = Query::phrase(options.field.clone(), terms, options.slop);
    SearchRequest::new(base).with_rescore(Rescore::new(options.window_size, phrase))
}

/// Runs searches for registered entity types.
#[derive(Clone)]
pub struct QueryEngine {
    registry: Arc<EntityRegistry>,
    backend: Arc<dyn SearchBackend>,
    store: Arc<dyn PrimaryStore>,
    provisioner: Arc<Provisioner>,
}

impl QueryEngine {
    pub fn new(
        registry: Arc<EntityRegistry>,
        backend: Arc<dyn SearchBackend>,
        store: Arc<dyn PrimaryStore>,
        provisioner: Arc<Provisioner>,
    ) -> Self {
        Self {
            registry,
            backend,
            store,
            provisioner,
        }
    }

    /// Turn an input and options into a backend request.
    ///
    /// Options override what a supplied request sets. Paging counts in
    /// whole pages of `size`.
    pub fn build_request(
        &self,
        entity: &EntityConfig,
        input: SearchInput,
        options: &SearchOptions,
    ) -> Result<SearchRequest, IndexingError> {
        let mut request = match input {
            SearchInput::Text(text) => {
                SearchRequest::new(Query::query_string(text, options.field.clone()))
            }
            SearchInput::Query(query) => SearchRequest::new(query),
            SearchInput::Request(request) => request,
            SearchInput::Json(value) => SearchRequest::from_json(value)?,
        };

        let size = options
            .size
            .or(request.size)
            .unwrap_or(entity.settings.limit);
        request.size = Some(size);
        if let Some(page) = options.page {
            request.from = page.saturating_sub(1).checked_mul(size).ok_or_else(|| {
                SearchError::InvalidQuery(format!("page {} of size {} is out of range", page, size))
            })?;
        }
        if options.min_score.is_some() {
            request.min_score = options.min_score;
        }
        if options.full_documents {
            request.projection = Projection::FullDocument;
        }
        Ok(request)
    }

    /// Search an entity's table.
    pub fn search(
        &self,
        entity_type: &str,
        input: impl Into<SearchInput>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, IndexingError> {
        let entity = self.registry.get(entity_type)?;
        let request = self.build_request(&entity, input.into(), options)?;
        self.provisioner
            .ensure(self.backend.as_ref(), &entity.location)?;

        let hits = self.backend.search(&entity.location, &request)?;
        debug!(
            entity_type,
            location = %entity.location,
            hits = hits.len(),
            "Searched"
        );
        Ok(hits)
    }

    /// Association keys of the hits, in relevance order.
    pub fn search_keys(
        &self,
        entity_type: &str,
        input: impl Into<SearchInput>,
        options: &SearchOptions,
    ) -> Result<Vec<AssociationKey>, IndexingError> {
        Ok(self
            .search_keys_with_score(entity_type, input, options)?
            .into_keys()
            .collect())
    }

    /// Key to score, in relevance order. The first score seen for a key wins.
    pub fn search_keys_with_score(
        &self,
        entity_type: &str,
        input: impl Into<SearchInput>,
        options: &SearchOptions,
    ) -> Result<IndexMap<AssociationKey, Option<f32>>, IndexingError> {
        let hits = self.search(entity_type, input, options)?;
        let mut scores = IndexMap::with_capacity(hits.len());
        for hit in hits {
            if scores.contains_key(&hit.association_key) {
                debug!(
                    entity_type,
                    key = %hit.association_key,
                    "Duplicate key in search hits"
                );
                continue;
            }
            scores.insert(hit.association_key, hit.score);
        }
        Ok(scores)
    }

    /// The stored document for `(entity_type, key)`, if any.
    pub fn find_document(
        &self,
        entity_type: &str,
        key: &AssociationKey,
    ) -> Result<Option<IndexDocument>, IndexingError> {
        let entity = self.registry.get(entity_type)?;
        // A table may hold several entity types
        let query = Query::Bool {
            must: vec![
                Query::term("association_key", key.as_str()),
                Query::term("entity_type_exact", entity.entity_type.as_str()),
            ],
            should: Vec::new(),
            must_not: Vec::new(),
        };
        let request = SearchRequest::new(query).with_projection(Projection::FullDocument);
        let options = SearchOptions::new().with_size(1);

        Ok(self
            .search(&entity.entity_type, request, &options)?
            .into_iter()
            .find_map(|hit| hit.document))
    }

    /// Search, then load the matching records from the primary store in
    /// relevance order.
    pub fn search_records(
        &self,
        entity_type: &str,
        input: impl Into<SearchInput>,
        find: FindOptions,
        options: &SearchOptions,
    ) -> Result<Vec<Record>, IndexingError> {
        let keys = self.search_keys(entity_type, input, options)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let entity = self.registry.get(entity_type)?;
        let find = find.with_condition(Condition::KeyIn(keys.clone()));
        let records = self.store.find_all(entity_type, &find)?;
        Ok(reconcile_records(
            records,
            &keys,
            entity.primary_key(),
            &entity.entity_type,
        ))
    }
}
