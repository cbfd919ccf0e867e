//! Disjunction-max queries: the best matching sub-query wins, the others
//! contribute a tie-breaking share.

use std::fmt;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader, NO_MORE_DOCS, NOT_STARTED};
use crate::query::disjunction::ScorerDocQueue;
use crate::query::{Query, boost_suffix};
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::explanation::Explanation;
use crate::search::scorer::Scorer;
use crate::search::searcher::Searcher;
use crate::search::weight::{PhaseGuard, Weight};

/// Union of sub-queries scored by `max + tie * (sum - max)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisjunctionMaxQuery {
    disjuncts: Vec<Query>,
    tie_breaker: f32,
    boost: f32,
}

impl DisjunctionMaxQuery {
    /// An empty disjunction; `tie_breaker` must lie in `[0, 1]`.
    pub fn new(tie_breaker: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&tie_breaker) {
            return Err(TesseraError::invalid_argument(format!(
                "tie breaker multiplier must be in [0, 1], got {tie_breaker}"
            )));
        }
        Ok(DisjunctionMaxQuery {
            disjuncts: Vec::new(),
            tie_breaker,
            boost: 1.0,
        })
    }

    /// A disjunction over `disjuncts`.
    pub fn with_disjuncts<I>(disjuncts: I, tie_breaker: f32) -> Result<Self>
    where
        I: IntoIterator<Item = Query>,
    {
        let mut query = Self::new(tie_breaker)?;
        query.disjuncts.extend(disjuncts);
        Ok(query)
    }

    /// Add a sub-query.
    pub fn add(&mut self, query: Query) {
        self.disjuncts.push(query);
    }

    /// The sub-queries.
    pub fn disjuncts(&self) -> &[Query] {
        &self.disjuncts
    }

    /// Share of the non-maximal scores added to the maximum.
    pub fn tie_breaker(&self) -> f32 {
        self.tie_breaker
    }

    /// Get the boost.
    pub fn boost(&self) -> f32 {
        self.boost
    }

    /// Set the boost.
    pub fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    /// Set the boost for this query.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// A single disjunct replaces the whole query; otherwise disjuncts are
    /// rewritten in place.
    pub fn rewrite(&self, reader: &dyn IndexReader, config: &SearchConfig) -> Result<Option<Query>> {
        if let [single] = self.disjuncts.as_slice() {
            let mut result = single.rewrite(reader, config)?.unwrap_or_else(|| single.clone());
            if self.boost != 1.0 {
                result.set_boost(self.boost * result.boost());
            }
            return Ok(Some(result));
        }

        let mut rewritten: Option<DisjunctionMaxQuery> = None;
        for (i, disjunct) in self.disjuncts.iter().enumerate() {
            if let Some(replacement) = disjunct.rewrite(reader, config)? {
                rewritten.get_or_insert_with(|| self.clone()).disjuncts[i] = replacement;
            }
        }
        Ok(rewritten.map(Query::DisjunctionMax))
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searcher) -> Result<Box<dyn Weight>> {
        let weights = self
            .disjuncts
            .iter()
            .map(|q| q.create_weight(searcher))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(DisjunctionMaxWeight {
            weights,
            tie_breaker: self.tie_breaker,
            boost: self.boost,
            guard: PhaseGuard::new(),
        }))
    }
}

impl fmt::Display for DisjunctionMaxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, disjunct) in self.disjuncts.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            match disjunct {
                Query::Boolean(_) => write!(f, "({disjunct})")?,
                _ => write!(f, "{disjunct}")?,
            }
        }
        f.write_str(")")?;
        if self.tie_breaker != 0.0 {
            write!(f, "~{:?}", self.tie_breaker)?;
        }
        f.write_str(&boost_suffix(self.boost))
    }
}

#[derive(Debug)]
struct DisjunctionMaxWeight {
    weights: Vec<Box<dyn Weight>>,
    tie_breaker: f32,
    boost: f32,
    guard: PhaseGuard,
}

impl Weight for DisjunctionMaxWeight {
    fn value(&self) -> f32 {
        self.boost
    }

    fn sum_of_squared_weights(&mut self) -> Result<f32> {
        self.guard.summed()?;
        let mut max = 0.0f32;
        let mut sum = 0.0f32;
        for weight in self.weights.iter_mut() {
            let sub = weight.sum_of_squared_weights()?;
            sum += sub;
            max = max.max(sub);
        }
        let tie = self.tie_breaker;
        Ok(((sum - max) * tie * tie + max) * self.boost * self.boost)
    }

    fn normalize(&mut self, norm: f32) -> Result<()> {
        self.guard.normalized()?;
        let norm = norm * self.boost;
        for weight in self.weights.iter_mut() {
            weight.normalize(norm)?;
        }
        Ok(())
    }

    fn scorer(
        &self,
        reader: &Arc<dyn IndexReader>,
        _score_docs_in_order: bool,
        _top_scorer: bool,
    ) -> Result<Option<Box<dyn Scorer>>> {
        self.guard.ensure_normalized()?;
        let mut queue = ScorerDocQueue::with_capacity(self.weights.len());
        for weight in &self.weights {
            if let Some(mut scorer) = weight.scorer(reader, true, false)? {
                if scorer.next()? != NO_MORE_DOCS {
                    queue.push(scorer);
                }
            }
        }
        if queue.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(DisjunctionMaxScorer {
            queue,
            tie_breaker: self.tie_breaker,
            doc: NOT_STARTED,
        })))
    }

    fn explain(&self, reader: &Arc<dyn IndexReader>, doc: DocId) -> Result<Explanation> {
        if let [single] = self.weights.as_slice() {
            return single.explain(reader, doc);
        }
        let description = if self.tie_breaker == 0.0 {
            "max of:".to_string()
        } else {
            format!("max plus {:?} times others of:", self.tie_breaker)
        };
        let mut result = Explanation::new(0.0, description);
        let mut max = 0.0f32;
        let mut sum = 0.0f32;
        for weight in &self.weights {
            let sub = weight.explain(reader, doc)?;
            if sub.is_match() {
                result.set_match(Some(true));
                sum += sub.value();
                max = max.max(sub.value());
                result.add_detail(sub);
            }
        }
        result.set_value(max + (sum - max) * self.tie_breaker);
        Ok(result)
    }
}

/// Scorer behind [`DisjunctionMaxQuery`].
#[derive(Debug)]
pub struct DisjunctionMaxScorer {
    queue: ScorerDocQueue,
    tie_breaker: f32,
    doc: DocId,
}

impl DocIdSetIterator for DisjunctionMaxScorer {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        if self.queue.is_empty() {
            self.doc = NO_MORE_DOCS;
            return Ok(self.doc);
        }
        while self.queue.top_doc() == self.doc {
            if !self.queue.top_next_and_adjust_else_pop()? && self.queue.is_empty() {
                self.doc = NO_MORE_DOCS;
                return Ok(self.doc);
            }
        }
        self.doc = self.queue.top_doc();
        Ok(self.doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.queue.is_empty() {
            self.doc = NO_MORE_DOCS;
            return Ok(self.doc);
        }
        while self.queue.top_doc() < target {
            if !self.queue.top_advance_and_adjust_else_pop(target)? && self.queue.is_empty() {
                self.doc = NO_MORE_DOCS;
                return Ok(self.doc);
            }
        }
        self.doc = self.queue.top_doc();
        Ok(self.doc)
    }
}

impl Scorer for DisjunctionMaxScorer {
    fn score(&mut self) -> Result<f32> {
        let (sum, max) = self.queue.top_matches_sum_and_max()?;
        Ok(max + (sum - max) * self.tie_breaker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex, Term};
    use crate::query::TermQuery;
    use crate::search::scorer::test_support::{VecScorer, drain};
    use crate::search::searcher::{IndexSearcher, Searchable};

    fn term(field: &str, text: &str) -> Query {
        TermQuery::new(Term::new(field, text)).into()
    }

    #[test]
    fn test_tie_breaker_validated() {
        assert!(DisjunctionMaxQuery::new(-0.1).is_err());
        assert!(DisjunctionMaxQuery::new(1.5).is_err());
        assert!(DisjunctionMaxQuery::new(1.0).is_ok());
    }

    #[test]
    fn test_display() {
        let query =
            DisjunctionMaxQuery::with_disjuncts(vec![term("title", "a"), term("body", "a")], 0.1)
                .unwrap();
        assert_eq!(query.to_string(), "(title:a | body:a)~0.1");
    }

    #[test]
    fn test_scorer_max_plus_tie() {
        let mut queue = ScorerDocQueue::default();
        for hits in [vec![(1, 2.0), (3, 1.0)], vec![(1, 4.0)], vec![(2, 1.0), (3, 3.0)]] {
            let mut scorer = VecScorer::boxed(hits);
            scorer.next().unwrap();
            queue.push(scorer);
        }
        let mut scorer = DisjunctionMaxScorer {
            queue,
            tie_breaker: 0.5,
            doc: NOT_STARTED,
        };
        assert_eq!(drain(&mut scorer), vec![(1, 5.0), (2, 1.0), (3, 3.5)]);
    }

    #[test]
    fn test_single_disjunct_rewrites_away() {
        let reader = MemoryIndex::from_documents(Vec::<Document>::new());
        let query = DisjunctionMaxQuery::with_disjuncts(vec![term("f", "x")], 0.0)
            .unwrap()
            .with_boost(3.0);
        let rewritten = query.rewrite(&reader, &SearchConfig::default()).unwrap().unwrap();
        assert_eq!(rewritten, term("f", "x").with_boost(3.0));
    }

    #[test]
    fn test_search_and_explain_agree() {
        let reader: Arc<dyn IndexReader> = Arc::new(MemoryIndex::from_documents(vec![
            Document::new().add_text("title", "rust").add_text("body", "rust book"),
            Document::new().add_text("title", "go").add_text("body", "rust mention"),
            Document::new().add_text("title", "java").add_text("body", "coffee"),
        ]));
        let searcher = IndexSearcher::new(Arc::clone(&reader));
        let query: Query = DisjunctionMaxQuery::with_disjuncts(
            vec![term("title", "rust"), term("body", "rust")],
            0.2,
        )
        .unwrap()
        .into();

        let top = searcher.search(&query, None, 10).unwrap();
        assert_eq!(top.total_hits, 2);
        assert_eq!(top.score_docs[0].doc, 0);
        for hit in &top.score_docs {
            let explanation = searcher.explain(&query, hit.doc).unwrap();
            assert!(explanation.is_match());
            assert!((explanation.value() - hit.score).abs() < 1e-5);
        }
        assert!(!searcher.explain(&query, 2).unwrap().is_match());
    }
}
