//! Multi-term query support.
//!
//! Prefix, wildcard, fuzzy and term range queries match every term of a
//! field that satisfies some criterion. None of them can be scored directly:
//! they are rewritten, against a concrete reader, into either a boolean
//! union of term queries or a constant-score filter. [`RewriteMethod`]
//! picks between the two.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::error::Result;
use crate::index::{IndexReader, Term};
use crate::query::boolean::{BooleanQuery, Occur};
use crate::query::constant_score::ConstantScoreQuery;
use crate::query::term::TermQuery;
use crate::query::Query;
use crate::search::filter::{MultiTermQueryWrapperFilter, QueryWrapperFilter};

/// One term produced by a multi-term enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumeratedTerm {
    /// The matching term.
    pub term: Term,
    /// Number of documents containing it.
    pub doc_freq: u32,
    /// How well the term matches, in `(0, 1]`; scales the clause boost when
    /// rewriting to a scoring boolean.
    pub difference: f32,
}

impl EnumeratedTerm {
    pub(crate) fn exact(term: Term, doc_freq: u32) -> Self {
        EnumeratedTerm {
            term,
            doc_freq,
            difference: 1.0,
        }
    }
}

/// How a multi-term query turns into something that can be scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RewriteMethod {
    /// A coordination-free boolean with one SHOULD clause per term; every
    /// document gets a full relevance score. Fails with too many clauses
    /// once the expansion exceeds the clause limit.
    ScoringBoolean,
    /// A filter over the union of the terms' postings, scored with the
    /// query boost. Never hits the clause limit.
    ConstantScoreFilter,
    /// The scoring boolean wrapped as a filter, so every document scores the
    /// query boost.
    ConstantScoreBoolean,
    /// Constant-score boolean for small expansions, filter for large ones.
    /// Unset cutoffs fall back to the searcher's configuration.
    ConstantScoreAuto {
        /// Switch to the filter once this many terms are pending.
        term_count_cutoff: Option<usize>,
        /// Switch to the filter once the pending terms cover this percentage
        /// of the index.
        doc_count_percent: Option<f64>,
    },
}

impl Default for RewriteMethod {
    fn default() -> Self {
        RewriteMethod::ConstantScoreAuto {
            term_count_cutoff: None,
            doc_count_percent: None,
        }
    }
}

/// The term enumeration behind a multi-term query.
pub trait MultiTermSource: Send + Sync + Debug + Display {
    /// The field whose terms are enumerated.
    fn field(&self) -> &str;

    /// Boost of the query.
    fn boost(&self) -> f32;

    /// How the query is rewritten.
    fn rewrite_method(&self) -> RewriteMethod;

    /// Matching terms of the reader in term order.
    fn term_enum<'a>(
        &'a self,
        reader: &'a dyn IndexReader,
    ) -> Result<Box<dyn Iterator<Item = EnumeratedTerm> + 'a>>;
}

/// Rewrite `query` against `reader` with the query's rewrite method.
pub(crate) fn rewrite<Q>(query: &Q, reader: &dyn IndexReader, config: &SearchConfig) -> Result<Query>
where
    Q: MultiTermSource + Clone + Into<Query>,
{
    match query.rewrite_method() {
        RewriteMethod::ScoringBoolean => Ok(scoring_boolean(query, reader, config)?.into()),
        RewriteMethod::ConstantScoreFilter => constant_score_filter(query),
        RewriteMethod::ConstantScoreBoolean => {
            let expanded = scoring_boolean(query, reader, config)?;
            Ok(constant_score_boolean(expanded, query.boost()))
        }
        RewriteMethod::ConstantScoreAuto {
            term_count_cutoff,
            doc_count_percent,
        } => {
            let term_count_cutoff =
                term_count_cutoff.unwrap_or(config.auto_rewrite_term_count_cutoff);
            let doc_count_percent =
                doc_count_percent.unwrap_or(config.auto_rewrite_doc_count_percent);
            auto_rewrite(query, reader, config, term_count_cutoff, doc_count_percent)
        }
    }
}

/// One SHOULD clause per term, boosted by the query boost times the term's
/// difference.
pub(crate) fn scoring_boolean<Q>(
    query: &Q,
    reader: &dyn IndexReader,
    config: &SearchConfig,
) -> Result<BooleanQuery>
where
    Q: MultiTermSource + ?Sized,
{
    let mut result =
        BooleanQuery::with_coord_disabled().with_max_clause_count(config.max_clause_count);
    for entry in query.term_enum(reader)? {
        let clause = TermQuery::new(entry.term).with_boost(query.boost() * entry.difference);
        result.add(clause.into(), Occur::Should)?;
    }
    debug!(
        "rewrote {} into a boolean of {} terms",
        query,
        result.clauses().len()
    );
    Ok(result)
}

fn constant_score_filter<Q>(query: &Q) -> Result<Query>
where
    Q: MultiTermSource + Clone + Into<Query>,
{
    let filter = MultiTermQueryWrapperFilter::new(query.clone().into())?;
    Ok(ConstantScoreQuery::new(Arc::new(filter))
        .with_boost(query.boost())
        .into())
}

fn constant_score_boolean(expanded: BooleanQuery, boost: f32) -> Query {
    let filter = QueryWrapperFilter::new(expanded.into());
    ConstantScoreQuery::new(Arc::new(filter))
        .with_boost(boost)
        .into()
}

fn auto_rewrite<Q>(
    query: &Q,
    reader: &dyn IndexReader,
    config: &SearchConfig,
    term_count_cutoff: usize,
    doc_count_percent: f64,
) -> Result<Query>
where
    Q: MultiTermSource + Clone + Into<Query>,
{
    let doc_count_cutoff = ((doc_count_percent / 100.0) * reader.max_doc() as f64) as i64;
    let term_count_limit = config.max_clause_count.min(term_count_cutoff);

    let mut pending: Vec<Term> = Vec::new();
    let mut doc_visit_count = 0i64;
    let mut terms = query.term_enum(reader)?;
    loop {
        if pending.len() >= term_count_limit || doc_visit_count >= doc_count_cutoff {
            debug!(
                "auto rewrite of {} uses a filter after {} terms covering {} docs",
                query,
                pending.len(),
                doc_visit_count
            );
            return constant_score_filter(query);
        }
        let Some(entry) = terms.next() else {
            break;
        };
        doc_visit_count += i64::from(entry.doc_freq);
        pending.push(entry.term);
    }

    debug!(
        "auto rewrite of {} uses a boolean of {} terms",
        query,
        pending.len()
    );
    let mut expanded =
        BooleanQuery::with_coord_disabled().with_max_clause_count(config.max_clause_count);
    for term in pending {
        expanded.add(TermQuery::new(term).into(), Occur::Should)?;
    }
    Ok(constant_score_boolean(expanded, query.boost()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};
    use crate::query::PrefixQuery;
    use crate::search::searcher::{IndexSearcher, Searchable};

    fn reader() -> MemoryIndex {
        MemoryIndex::from_documents(vec![
            Document::new().add_text("body", "apple apricot"),
            Document::new().add_text("body", "apple banana"),
            Document::new().add_text("body", "avocado"),
            Document::new().add_text("body", "cherry"),
        ])
    }

    fn prefix(method: RewriteMethod) -> PrefixQuery {
        PrefixQuery::new(Term::new("body", "a"))
            .with_rewrite_method(method)
            .with_boost(2.0)
    }

    #[test]
    fn test_scoring_boolean_rewrite() {
        let reader = reader();
        let rewritten = rewrite(
            &prefix(RewriteMethod::ScoringBoolean),
            &reader,
            &SearchConfig::default(),
        )
        .unwrap();
        let Query::Boolean(bq) = rewritten else {
            panic!("expected a boolean query");
        };
        assert!(bq.is_coord_disabled());
        let terms: Vec<String> = bq.clauses().iter().map(|c| c.query().to_string()).collect();
        assert_eq!(terms, vec!["body:apple^2.0", "body:apricot^2.0", "body:avocado^2.0"]);
    }

    #[test]
    fn test_scoring_boolean_respects_clause_limit() {
        let reader = reader();
        let config = SearchConfig::default().with_max_clause_count(2);
        let err = rewrite(&prefix(RewriteMethod::ScoringBoolean), &reader, &config).unwrap_err();
        assert!(matches!(err, crate::error::TesseraError::TooManyClauses { max: 2 }));
    }

    #[test]
    fn test_filter_rewrite_is_constant_score() {
        let reader = reader();
        let rewritten = rewrite(
            &prefix(RewriteMethod::ConstantScoreFilter),
            &reader,
            &SearchConfig::default().with_max_clause_count(1),
        )
        .unwrap();
        assert!(matches!(rewritten, Query::ConstantScore(_)));
        assert_eq!(rewritten.boost(), 2.0);
    }

    #[test]
    fn test_auto_rewrite_thresholds() {
        let reader = reader();
        let config = SearchConfig::default();

        let small = RewriteMethod::ConstantScoreAuto {
            term_count_cutoff: Some(10),
            doc_count_percent: Some(200.0),
        };
        let Query::ConstantScore(q) = rewrite(&prefix(small), &reader, &config).unwrap() else {
            panic!("expected a constant score query");
        };
        assert!(q.to_string().starts_with("ConstantScore(QueryWrapperFilter("));

        let few_terms = RewriteMethod::ConstantScoreAuto {
            term_count_cutoff: Some(2),
            doc_count_percent: Some(200.0),
        };
        let Query::ConstantScore(q) = rewrite(&prefix(few_terms), &reader, &config).unwrap()
        else {
            panic!("expected a constant score query");
        };
        assert_eq!(q.to_string(), "ConstantScore(body:a*^2.0)^2.0");
    }

    #[test]
    fn test_every_method_finds_the_same_documents() {
        let reader: Arc<dyn IndexReader> = Arc::new(reader());
        let searcher = IndexSearcher::new(reader);
        let methods = [
            RewriteMethod::ScoringBoolean,
            RewriteMethod::ConstantScoreFilter,
            RewriteMethod::ConstantScoreBoolean,
            RewriteMethod::default(),
        ];
        for method in methods {
            let query: Query = prefix(method).into();
            let mut docs = searcher.search(&query, None, 10).unwrap().doc_ids();
            docs.sort_unstable();
            assert_eq!(docs, vec![0, 1, 2], "{method:?}");
        }
    }
}
