//! Query translation and execution over one table.
//!
//! Translates the query DSL into Tantivy queries, runs them with BM25
//! scoring, and applies the optional rescore pass.

use std::cmp::Ordering;
use std::time::Instant;

use tantivy::collector::{Count, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, EmptyQuery, Occur, PhraseQuery, Query as TantivyQuery,
    QueryParser, TermQuery,
};
use tantivy::schema::{Field, FieldType, IndexRecordOption};
use tantivy::tokenizer::TokenStream;
use tantivy::{DocAddress, Score, TantivyDocument, Term};
use tracing::debug;

use crate::document::{from_tantivy_doc, hit_identity, SearchHit};
use crate::error::SearchError;
use crate::index::TableIndex;
use crate::query::{FieldTarget, Projection, Query, SearchRequest};

/// Read-only view of a table for searching.
pub struct TableSearcher<'a> {
    table: &'a TableIndex,
}

impl<'a> TableSearcher<'a> {
    pub fn new(table: &'a TableIndex) -> Self {
        Self { table }
    }

    /// Get the number of indexed documents.
    pub fn num_docs(&self) -> u64 {
        self.table.reader().searcher().num_docs()
    }

    /// Whether a document with this backend id exists.
    pub fn contains_id(&self, id: &str) -> Result<bool, SearchError> {
        let searcher = self.table.reader().searcher();
        let term = Term::from_field_text(self.table.schema().id, id);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        Ok(searcher.search(&query, &Count)? > 0)
    }

    /// Execute a search request.
    ///
    /// Ranking is BM25; with a rescore, the top `window_size` hits get the
    /// weighted rescore contribution added and are re-sorted among
    /// themselves. `min_score` is applied after rescoring, then `from`/`size`.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        let started = Instant::now();
        let size = request.size_or_default();
        if size == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.table.reader().searcher();
        let base = self.build_query(&request.query)?;

        let end = request.from.checked_add(size).ok_or_else(|| {
            SearchError::InvalidQuery(format!(
                "result window out of range: from {} size {}",
                request.from, size
            ))
        })?;
        let window = request.rescore.as_ref().map_or(0, |r| r.window_size);
        // Never collect more hits than the table holds
        let num_docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        let limit = end.max(window).min(num_docs).max(1);
        let mut top: Vec<(Score, DocAddress)> =
            searcher.search(&base, &TopDocs::with_limit(limit))?;

        if let Some(rescore) = &request.rescore {
            let rescore_query = self.build_query(&rescore.query)?;
            let window = rescore.window_size.min(top.len());
            for (score, address) in top.iter_mut().take(window) {
                // Documents the rescore query does not match add nothing
                let extra = rescore_query
                    .explain(&searcher, *address)
                    .map(|explanation| explanation.value())
                    .unwrap_or(0.0);
                *score = *score * rescore.query_weight + extra * rescore.rescore_query_weight;
            }
            top[..window].sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        }

        let schema = self.table.schema();
        let mut hits = Vec::with_capacity(size.min(top.len()));
        for (score, address) in top
            .into_iter()
            .filter(|(score, _)| request.min_score.map_or(true, |min| *score >= min))
            .skip(request.from)
            .take(size)
        {
            let doc: TantivyDocument = searcher.doc(address)?;
            let (id, association_key) = hit_identity(schema, &doc)?;
            let document = match request.projection {
                Projection::FullDocument => Some(from_tantivy_doc(schema, &doc)?),
                Projection::KeysOnly => None,
            };
            hits.push(SearchHit {
                id,
                association_key,
                score: Some(score),
                document,
            });
        }

        debug!(
            hits = hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            rescored = request.rescore.is_some(),
            "Search complete"
        );
        Ok(hits)
    }

    /// Translate a DSL query into a Tantivy query.
    pub fn build_query(&self, query: &Query) -> Result<Box<dyn TantivyQuery>, SearchError> {
        match query {
            Query::QueryString { query, field } => {
                if query.trim().is_empty() {
                    return Ok(Box::new(EmptyQuery));
                }
                let fields = self.target_fields(field)?;
                let mut parser = QueryParser::for_index(
                    self.table.index(),
                    fields.iter().map(|(f, _)| *f).collect(),
                );
                for (f, boost) in &fields {
                    parser.set_field_boost(*f, *boost);
                }
                Ok(parser.parse_query(query)?)
            }
            Query::Match { field, query } => {
                let mut clauses = Vec::new();
                for (f, boost) in self.target_fields(field)? {
                    for term in self.analyze(f, query)? {
                        let term_query: Box<dyn TantivyQuery> =
                            Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                        clauses.push((Occur::Should, boosted(term_query, boost)));
                    }
                }
                Ok(disjunction(clauses))
            }
            Query::MatchPhrase { field, query, slop } => {
                let mut clauses = Vec::new();
                for (f, boost) in self.target_fields(field)? {
                    let mut terms = self.analyze(f, query)?;
                    let phrase: Box<dyn TantivyQuery> = match terms.len() {
                        0 => continue,
                        // A one-word phrase is a term match
                        1 => Box::new(TermQuery::new(
                            terms.remove(0),
                            IndexRecordOption::WithFreqs,
                        )),
                        _ => {
                            let mut phrase = PhraseQuery::new(terms);
                            phrase.set_slop(*slop);
                            Box::new(phrase)
                        }
                    };
                    clauses.push((Occur::Should, boosted(phrase, boost)));
                }
                Ok(disjunction(clauses))
            }
            Query::Term { field, value } => {
                let f = self.table.schema().field(field)?;
                let entry = self.table.schema().schema().get_field_entry(f);
                if !matches!(entry.field_type(), FieldType::Str(_)) {
                    return Err(SearchError::InvalidQuery(format!(
                        "term query on non-text field: {}",
                        field
                    )));
                }
                Ok(Box::new(TermQuery::new(
                    Term::from_field_text(f, value),
                    IndexRecordOption::Basic,
                )))
            }
            Query::Bool {
                must,
                should,
                must_not,
            } => {
                let mut clauses: Vec<(Occur, Box<dyn TantivyQuery>)> = Vec::new();
                for q in must {
                    clauses.push((Occur::Must, self.build_query(q)?));
                }
                for q in should {
                    clauses.push((Occur::Should, self.build_query(q)?));
                }
                for q in must_not {
                    clauses.push((Occur::MustNot, self.build_query(q)?));
                }
                // A bool with no positive clause matches everything not excluded
                if must.is_empty() && should.is_empty() {
                    clauses.push((Occur::Must, Box::new(AllQuery)));
                }
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            Query::MatchAll {} => Ok(Box::new(AllQuery)),
        }
    }

    fn target_fields(&self, target: &FieldTarget) -> Result<Vec<(Field, f32)>, SearchError> {
        let schema = self.table.schema();
        match target {
            FieldTarget::All => Ok(schema.analyzed_fields(self.table.mapping())),
            FieldTarget::Named(name) => Ok(vec![(schema.field(name)?, 1.0)]),
        }
    }

    /// Run `text` through the field's tokenizer.
    fn analyze(&self, field: Field, text: &str) -> Result<Vec<Term>, SearchError> {
        let mut analyzer = self.table.index().tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        while stream.advance() {
            terms.push(Term::from_field_text(field, &stream.token().text));
        }
        Ok(terms)
    }
}

fn boosted(query: Box<dyn TantivyQuery>, boost: f32) -> Box<dyn TantivyQuery> {
    if (boost - 1.0).abs() < f32::EPSILON {
        query
    } else {
        Box::new(BoostQuery::new(query, boost))
    }
}

fn disjunction(clauses: Vec<(Occur, Box<dyn TantivyQuery>)>) -> Box<dyn TantivyQuery> {
    if clauses.is_empty() {
        Box::new(EmptyQuery)
    } else {
        Box::new(BooleanQuery::new(clauses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::IndexDocument;
    use crate::query::Rescore;
    use crate::schema::Mapping;
    use mirror_types::AssociationKey;

    fn setup_table(docs: &[(&str, &str, &str)]) -> TableIndex {
        let table = TableIndex::open_or_create(None, &Mapping::default(), 15).unwrap();
        for (id, key, text) in docs {
            let document = IndexDocument::new("Page", AssociationKey::from(*key), *text);
            table.indexer().put_document(id, &document).unwrap();
        }
        table.commit().unwrap();
        table
    }

    fn keys(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.association_key.as_str()).collect()
    }

    #[test]
    fn test_match_any_term() {
        let table = setup_table(&[
            ("1", "a", "rust memory safety"),
            ("2", "b", "python performance"),
            ("3", "c", "memory allocation in rust"),
        ]);

        let request = SearchRequest::new(Query::matching(FieldTarget::named("text"), "rust"));
        let hits = table.searcher().search(&request).unwrap();

        let mut found = keys(&hits);
        found.sort();
        assert_eq!(found, vec!["a", "c"]);
        assert!(hits.iter().all(|h| h.score.unwrap() > 0.0));
        assert!(hits.iter().all(|h| h.document.is_none()));
    }

    #[test]
    fn test_query_string_over_all_fields() {
        let table = setup_table(&[("1", "a", "zebra"), ("2", "b", "giraffe")]);
        let request = SearchRequest::new(Query::query_string("zebra", FieldTarget::All));
        let hits = table.searcher().search(&request).unwrap();
        assert_eq!(keys(&hits), vec!["a"]);
    }

    #[test]
    fn test_term_lookup_and_full_projection() {
        let table = setup_table(&[("1", "a", "zebra"), ("2", "b", "giraffe")]);
        let request = SearchRequest::new(Query::term("association_key", "b"))
            .with_projection(Projection::FullDocument);
        let hits = table.searcher().search(&request).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "2");
        let document = hits[0].document.as_ref().unwrap();
        assert_eq!(document.text, "giraffe");
        assert_eq!(document.entity_type, "Page");
    }

    #[test]
    fn test_term_on_timestamp_field_is_invalid() {
        let table = setup_table(&[]);
        let err = table
            .searcher()
            .search(&SearchRequest::new(Query::term("created_at", "1")))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery(_)));
    }

    #[test]
    fn test_unknown_field_is_invalid() {
        let table = setup_table(&[]);
        let request = SearchRequest::new(Query::matching(FieldTarget::named("nope"), "x"));
        assert!(table.searcher().search(&request).is_err());
    }

    #[test]
    fn test_phrase_slop() {
        let table = setup_table(&[
            ("1", "near", "alpha beta"),
            ("2", "far", "alpha one two three beta"),
        ]);

        let exact = SearchRequest::new(Query::phrase(FieldTarget::named("text"), "alpha beta", 0));
        assert_eq!(keys(&table.searcher().search(&exact).unwrap()), vec!["near"]);

        let loose = SearchRequest::new(Query::phrase(FieldTarget::named("text"), "alpha beta", 5));
        assert_eq!(table.searcher().search(&loose).unwrap().len(), 2);
    }

    #[test]
    fn test_single_word_phrase() {
        let table = setup_table(&[("1", "a", "alpha"), ("2", "b", "beta")]);
        let request = SearchRequest::new(Query::phrase(FieldTarget::All, "alpha", 10));
        assert_eq!(keys(&table.searcher().search(&request).unwrap()), vec!["a"]);
    }

    #[test]
    fn test_rescore_only_adds() {
        let filler = vec!["filler"; 51].join(" ");
        let table = setup_table(&[
            ("1", "x", "alpha beta"),
            ("2", "y", &format!("alpha {} beta", filler)),
            ("3", "z", "alpha only"),
        ]);

        let base = SearchRequest::new(Query::matching(FieldTarget::named("text"), "alpha beta"));
        let base_hits = table.searcher().search(&base).unwrap();

        let rescored = base.clone().with_rescore(Rescore::new(
            50,
            Query::phrase(FieldTarget::named("text"), "alpha beta", 50),
        ));
        let hits = table.searcher().search(&rescored).unwrap();

        // Nothing is dropped by the rescore pass
        assert_eq!(hits.len(), base_hits.len());
        assert_eq!(hits[0].association_key.as_str(), "x");

        let score_of = |hits: &[SearchHit], key: &str| {
            hits.iter()
                .find(|h| h.association_key.as_str() == key)
                .and_then(|h| h.score)
                .unwrap()
        };
        assert!(score_of(&hits, "x") > score_of(&base_hits, "x"));
        assert_eq!(score_of(&hits, "y"), score_of(&base_hits, "y"));
        assert!(score_of(&hits, "x") >= score_of(&hits, "y"));
    }

    #[test]
    fn test_rescore_outside_window_is_unchanged() {
        let table = setup_table(&[
            ("1", "top", "alpha alpha alpha beta"),
            ("2", "low", "alpha beta and many other words here"),
        ]);

        let base = SearchRequest::new(Query::matching(FieldTarget::named("text"), "alpha"));
        let base_hits = table.searcher().search(&base).unwrap();
        assert_eq!(base_hits[1].association_key.as_str(), "low");

        let rescored = base.clone().with_rescore(Rescore::new(
            1,
            Query::phrase(FieldTarget::named("text"), "alpha beta", 0),
        ));
        let hits = table.searcher().search(&rescored).unwrap();
        assert_eq!(hits[1].association_key.as_str(), "low");
        assert_eq!(hits[1].score, base_hits[1].score);
    }

    #[test]
    fn test_pagination_and_min_score() {
        let table = setup_table(&[
            ("1", "a", "rust rust rust"),
            ("2", "b", "rust rust"),
            ("3", "c", "rust"),
        ]);
        let request = SearchRequest::new(Query::matching(FieldTarget::named("text"), "rust"));

        let all = table.searcher().search(&request).unwrap();
        assert_eq!(keys(&all), vec!["a", "b", "c"]);

        let page = table
            .searcher()
            .search(&request.clone().with_size(1).with_from(1))
            .unwrap();
        assert_eq!(keys(&page), vec!["b"]);

        let threshold = all[1].score.unwrap();
        let strong = table
            .searcher()
            .search(&request.clone().with_min_score(threshold))
            .unwrap();
        assert_eq!(keys(&strong), vec!["a", "b"]);

        assert!(table.searcher().search(&request.with_size(0)).unwrap().is_empty());
    }

    #[test]
    fn test_oversized_window() {
        let table = setup_table(&[("1", "a", "rust"), ("2", "b", "rust rust")]);
        let request = SearchRequest::new(Query::matching(FieldTarget::named("text"), "rust"));

        let huge = table
            .searcher()
            .search(&request.clone().with_size(usize::MAX / 2))
            .unwrap();
        assert_eq!(keys(&huge), vec!["b", "a"]);

        let err = table
            .searcher()
            .search(&request.with_size(usize::MAX / 2).with_from(usize::MAX / 2 + 2))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery(_)));
    }

    #[test]
    fn test_bool_query() {
        let table = setup_table(&[("1", "a", "red apple"), ("2", "b", "green apple")]);
        let request = SearchRequest::new(Query::Bool {
            must: vec![Query::matching(FieldTarget::named("text"), "apple")],
            should: vec![],
            must_not: vec![Query::matching(FieldTarget::named("text"), "green")],
        });
        assert_eq!(keys(&table.searcher().search(&request).unwrap()), vec!["a"]);

        let only_not = SearchRequest::new(Query::Bool {
            must: vec![],
            should: vec![],
            must_not: vec![Query::term("association_key", "a")],
        });
        assert_eq!(keys(&table.searcher().search(&only_not).unwrap()), vec!["b"]);
    }

    #[test]
    fn test_empty_query_string() {
        let table = setup_table(&[("1", "a", "anything")]);
        let request = SearchRequest::new(Query::query_string("   ", FieldTarget::All));
        assert!(table.searcher().search(&request).unwrap().is_empty());
    }

    #[test]
    fn test_contains_id() {
        let table = setup_table(&[("id-1", "a", "text")]);
        assert!(table.searcher().contains_id("id-1").unwrap());
        assert!(!table.searcher().contains_id("id-2").unwrap());
    }
}
