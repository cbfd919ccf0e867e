//! Query trees, their rewriting, and the weights and scorers they build.
//!
//! A [`Query`] is a closed set of node kinds. Searching one goes through
//! three stages: [`Query::rewrite`] to a fixed point turns multi-term and
//! degenerate nodes into primitive ones, [`Query::weight`] builds a
//! normalized [`Weight`] tree against collection statistics, and the weight
//! hands out one scorer per segment.

pub mod boolean;
pub mod boolean_scorer;
pub mod bucket_scorer;
pub mod conjunction;
pub mod constant_score;
pub mod disjunction;
pub mod dismax;
pub mod fuzzy;
pub mod match_all;
pub mod multi_term;
pub mod phrase;
pub mod phrase_scorer;
pub mod range;
pub mod req_excl;
pub mod req_opt;
pub mod term;
pub mod wildcard;

use std::collections::BTreeSet;
use std::fmt;

use log::debug;

use crate::config::SearchConfig;
use crate::error::{Result, TesseraError};
use crate::index::{IndexReader, Term};
use crate::search::searcher::Searcher;
use crate::search::weight::Weight;

pub use self::boolean::{BooleanClause, BooleanQuery, BooleanWeight, Occur};
pub use self::constant_score::ConstantScoreQuery;
pub use self::dismax::DisjunctionMaxQuery;
pub use self::fuzzy::FuzzyQuery;
pub use self::match_all::MatchAllDocsQuery;
pub use self::multi_term::{EnumeratedTerm, MultiTermSource, RewriteMethod};
pub use self::phrase::{MultiPhraseQuery, PhraseQuery};
pub use self::range::TermRangeQuery;
pub use self::term::{TermQuery, TermScorer, TermWeight};
pub use self::wildcard::{PrefixQuery, WildcardQuery};

/// A node of a query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Documents containing a term.
    Term(TermQuery),
    /// Required, optional and prohibited sub-queries.
    Boolean(BooleanQuery),
    /// Terms at fixed relative positions.
    Phrase(PhraseQuery),
    /// A phrase whose positions accept any of several terms.
    MultiPhrase(MultiPhraseQuery),
    /// Terms starting with a prefix.
    Prefix(PrefixQuery),
    /// Terms matching a `*`/`?` pattern.
    Wildcard(WildcardQuery),
    /// Terms within an edit-distance similarity.
    Fuzzy(FuzzyQuery),
    /// Terms between two bounds.
    TermRange(TermRangeQuery),
    /// Every live document.
    MatchAll(MatchAllDocsQuery),
    /// Union scored by the best sub-query plus a tie-breaking share.
    DisjunctionMax(DisjunctionMaxQuery),
    /// Documents passing a filter, all with the same score.
    ConstantScore(ConstantScoreQuery),
}

macro_rules! query_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Query {
                fn from(query: $ty) -> Self {
                    Query::$variant(query)
                }
            }
        )*
    };
}

query_from!(
    Term(TermQuery),
    Boolean(BooleanQuery),
    Phrase(PhraseQuery),
    MultiPhrase(MultiPhraseQuery),
    Prefix(PrefixQuery),
    Wildcard(WildcardQuery),
    Fuzzy(FuzzyQuery),
    TermRange(TermRangeQuery),
    MatchAll(MatchAllDocsQuery),
    DisjunctionMax(DisjunctionMaxQuery),
    ConstantScore(ConstantScoreQuery),
);

impl Query {
    /// Multiplier applied to this node's scores.
    pub fn boost(&self) -> f32 {
        match self {
            Query::Term(q) => q.boost(),
            Query::Boolean(q) => q.boost(),
            Query::Phrase(q) => q.boost(),
            Query::MultiPhrase(q) => q.boost(),
            Query::Prefix(q) => q.boost(),
            Query::Wildcard(q) => q.boost(),
            Query::Fuzzy(q) => q.boost(),
            Query::TermRange(q) => q.boost(),
            Query::MatchAll(q) => q.boost(),
            Query::DisjunctionMax(q) => q.boost(),
            Query::ConstantScore(q) => q.boost(),
        }
    }

    /// Replace the boost.
    pub fn set_boost(&mut self, boost: f32) {
        match self {
            Query::Term(q) => q.set_boost(boost),
            Query::Boolean(q) => q.set_boost(boost),
            Query::Phrase(q) => q.set_boost(boost),
            Query::MultiPhrase(q) => q.set_boost(boost),
            Query::Prefix(q) => q.set_boost(boost),
            Query::Wildcard(q) => q.set_boost(boost),
            Query::Fuzzy(q) => q.set_boost(boost),
            Query::TermRange(q) => q.set_boost(boost),
            Query::MatchAll(q) => q.set_boost(boost),
            Query::DisjunctionMax(q) => q.set_boost(boost),
            Query::ConstantScore(q) => q.set_boost(boost),
        }
    }

    /// Builder form of [`set_boost`](Self::set_boost).
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.set_boost(boost);
        self
    }

    /// One rewrite step. `None` means the node is already primitive; callers
    /// repeat until that happens.
    pub fn rewrite(&self, reader: &dyn IndexReader, config: &SearchConfig) -> Result<Option<Query>> {
        match self {
            Query::Term(_) | Query::MatchAll(_) | Query::ConstantScore(_) => Ok(None),
            Query::Boolean(q) => q.rewrite(reader, config),
            Query::Phrase(q) => Ok(q.rewrite()),
            Query::MultiPhrase(q) => q.rewrite(config),
            Query::Prefix(q) => multi_term::rewrite(q, reader, config).map(Some),
            Query::Wildcard(q) => q.rewrite(reader, config).map(Some),
            Query::Fuzzy(q) => q.rewrite(reader, config).map(Some),
            Query::TermRange(q) => multi_term::rewrite(q, reader, config).map(Some),
            Query::DisjunctionMax(q) => q.rewrite(reader, config),
        }
    }

    /// Build this node's weight without normalizing it.
    pub fn create_weight(&self, searcher: &dyn Searcher) -> Result<Box<dyn Weight>> {
        match self {
            Query::Term(q) => Ok(Box::new(TermWeight::new(q, searcher)?)),
            Query::Boolean(q) => Ok(Box::new(BooleanWeight::new(q, searcher)?)),
            Query::Phrase(q) => q.create_weight(searcher),
            Query::MultiPhrase(q) => q.create_weight(searcher),
            Query::MatchAll(q) => q.create_weight(searcher),
            Query::DisjunctionMax(q) => q.create_weight(searcher),
            Query::ConstantScore(q) => q.create_weight(searcher),
            Query::Prefix(_) | Query::Wildcard(_) | Query::Fuzzy(_) | Query::TermRange(_) => {
                Err(TesseraError::unsupported(format!(
                    "{self} must be rewritten before it can be weighted"
                )))
            }
        }
    }

    /// Build and normalize the weight of a rewritten query.
    pub fn weight(&self, searcher: &dyn Searcher) -> Result<Box<dyn Weight>> {
        let mut weight = self.create_weight(searcher)?;
        let sum = weight.sum_of_squared_weights()?;
        let mut norm = searcher.similarity().query_norm(sum);
        if !norm.is_finite() {
            norm = 1.0;
        }
        weight.normalize(norm)?;
        debug!("weighted {self}: sum of squares {sum}, query norm {norm}");
        Ok(weight)
    }

    /// Add every term this (rewritten) query scores against.
    pub fn extract_terms(&self, terms: &mut BTreeSet<Term>) -> Result<()> {
        match self {
            Query::Term(q) => {
                terms.insert(q.term().clone());
            }
            Query::Boolean(q) => {
                for clause in q.clauses() {
                    clause.query().extract_terms(terms)?;
                }
            }
            Query::Phrase(q) => terms.extend(q.terms().iter().cloned()),
            Query::MultiPhrase(q) => {
                for array in q.term_arrays() {
                    terms.extend(array.iter().cloned());
                }
            }
            Query::DisjunctionMax(q) => {
                for disjunct in q.disjuncts() {
                    disjunct.extract_terms(terms)?;
                }
            }
            Query::MatchAll(_) | Query::ConstantScore(_) => {}
            Query::Prefix(_) | Query::Wildcard(_) | Query::Fuzzy(_) | Query::TermRange(_) => {
                return Err(TesseraError::unsupported(format!(
                    "cannot extract terms from un-rewritten {self}"
                )));
            }
        }
        Ok(())
    }

    /// The term-enumeration view of prefix, wildcard, fuzzy and range nodes.
    pub fn as_multi_term(&self) -> Option<&dyn MultiTermSource> {
        match self {
            Query::Prefix(q) => Some(q),
            Query::Wildcard(q) => Some(q),
            Query::Fuzzy(q) => Some(q),
            Query::TermRange(q) => Some(q),
            _ => None,
        }
    }

    /// Merge the per-part rewrites of one query into a single query.
    ///
    /// Identical rewrites collapse to one; otherwise the distinct ones are
    /// OR-ed together with coordination disabled. Coord-free all-SHOULD
    /// booleans without a boost or a minimum match count are flattened first.
    pub fn combine(queries: Vec<Query>, config: &SearchConfig) -> Result<Query> {
        let mut uniques: Vec<Query> = Vec::new();
        let mut push_unique = |query: Query, uniques: &mut Vec<Query>| {
            if !uniques.contains(&query) {
                uniques.push(query);
            }
        };
        for query in queries {
            match query {
                Query::Boolean(bq)
                    if bq.is_coord_disabled()
                        && bq.minimum_should_match() == 0
                        && bq.boost() == 1.0
                        && bq.clauses().iter().all(|c| c.occur() == Occur::Should) =>
                {
                    for clause in bq.into_clauses() {
                        push_unique(clause.into_query(), &mut uniques);
                    }
                }
                other => push_unique(other, &mut uniques),
            }
        }

        if uniques.len() == 1 {
            if let Some(only) = uniques.pop() {
                return Ok(only);
            }
        }
        let mut combined =
            BooleanQuery::with_coord_disabled().with_max_clause_count(config.max_clause_count);
        for query in uniques {
            combined.add(query, Occur::Should)?;
        }
        Ok(combined.into())
    }
}

/// Boost suffix: empty at 1.0, otherwise `^boost`.
pub(crate) fn boost_suffix(boost: f32) -> String {
    if boost == 1.0 {
        String::new()
    } else {
        format!("^{boost:?}")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(q) => q.fmt(f),
            Query::Boolean(q) => q.fmt(f),
            Query::Phrase(q) => q.fmt(f),
            Query::MultiPhrase(q) => q.fmt(f),
            Query::Prefix(q) => q.fmt(f),
            Query::Wildcard(q) => q.fmt(f),
            Query::Fuzzy(q) => q.fmt(f),
            Query::TermRange(q) => q.fmt(f),
            Query::MatchAll(q) => q.fmt(f),
            Query::DisjunctionMax(q) => q.fmt(f),
            Query::ConstantScore(q) => q.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(text: &str) -> Query {
        TermQuery::new(Term::new("f", text)).into()
    }

    #[test]
    fn test_boost_roundtrip_and_display() {
        let query = term("a").with_boost(2.0);
        assert_eq!(query.boost(), 2.0);
        assert_eq!(query.to_string(), "f:a^2.0");
        assert_eq!(term("a").to_string(), "f:a");
    }

    #[test]
    fn test_combine_identical() {
        let combined = Query::combine(vec![term("a"), term("a")], &SearchConfig::default()).unwrap();
        assert_eq!(combined, term("a"));
    }

    #[test]
    fn test_combine_flattens_coord_free_disjunctions() {
        let mut bq = BooleanQuery::with_coord_disabled();
        bq.add(term("a"), Occur::Should).unwrap();
        bq.add(term("b"), Occur::Should).unwrap();
        let combined =
            Query::combine(vec![bq.into(), term("b"), term("c")], &SearchConfig::default())
                .unwrap();
        match combined {
            Query::Boolean(bq) => {
                assert!(bq.is_coord_disabled());
                let texts: Vec<String> = bq.clauses().iter().map(|c| c.query().to_string()).collect();
                assert_eq!(texts, vec!["f:a", "f:b", "f:c"]);
            }
            other => panic!("expected a boolean, got {other}"),
        }
    }

    #[test]
    fn test_combine_keeps_minimum_match_and_boost() {
        let mut strict = BooleanQuery::with_coord_disabled().with_minimum_should_match(2);
        strict.add(term("a"), Occur::Should).unwrap();
        strict.add(term("b"), Occur::Should).unwrap();
        let strict: Query = strict.into();
        let combined =
            Query::combine(vec![strict.clone(), strict.clone()], &SearchConfig::default())
                .unwrap();
        assert_eq!(combined, strict);

        let mut boosted = BooleanQuery::with_coord_disabled().with_boost(2.0);
        boosted.add(term("a"), Occur::Should).unwrap();
        boosted.add(term("b"), Occur::Should).unwrap();
        let boosted: Query = boosted.into();
        let combined =
            Query::combine(vec![boosted.clone(), term("c")], &SearchConfig::default()).unwrap();
        let Query::Boolean(outer) = combined else {
            panic!("expected a boolean");
        };
        assert_eq!(outer.clauses().len(), 2);
        assert_eq!(outer.clauses()[0].query(), &boosted);
    }

    #[test]
    fn test_extract_terms_rejects_multi_term() {
        let mut terms = BTreeSet::new();
        let prefix: Query = PrefixQuery::new(Term::new("f", "a")).into();
        assert!(prefix.extract_terms(&mut terms).is_err());

        let mut bq = BooleanQuery::new();
        bq.add(term("a"), Occur::Must).unwrap();
        bq.add(term("b"), Occur::MustNot).unwrap();
        Query::from(bq).extract_terms(&mut terms).unwrap();
        assert_eq!(terms.len(), 2);
    }

    #[test]
    fn test_unrewritten_multi_term_cannot_be_weighted() {
        use crate::index::MemoryIndex;
        use crate::search::searcher::IndexSearcher;
        use std::sync::Arc;

        let searcher = IndexSearcher::new(Arc::new(MemoryIndex::from_documents(Vec::new())));
        let prefix: Query = PrefixQuery::new(Term::new("f", "a")).into();
        assert!(prefix.create_weight(&searcher).is_err());
    }
}
