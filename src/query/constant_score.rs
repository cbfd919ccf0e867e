//! A query that scores every document passed by a filter with the same
//! value: its boost times the query norm.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{DocId, IndexReader};
use crate::query::boost_suffix;
use crate::search::explanation::Explanation;
use crate::search::filter::Filter;
use crate::search::scorer::{ConstantScorer, Scorer};
use crate::search::searcher::{SearchContext, Searcher};
use crate::search::weight::{PhaseGuard, Weight};

/// Wraps a [`Filter`] as a query.
#[derive(Debug, Clone)]
pub struct ConstantScoreQuery {
    filter: Arc<dyn Filter>,
    boost: f32,
}

impl PartialEq for ConstantScoreQuery {
    fn eq(&self, other: &Self) -> bool {
        self.boost == other.boost
            && (Arc::ptr_eq(&self.filter, &other.filter)
                || self.filter.description() == other.filter.description())
    }
}

impl ConstantScoreQuery {
    /// Create a constant score query over `filter`.
    pub fn new(filter: Arc<dyn Filter>) -> Self {
        ConstantScoreQuery { filter, boost: 1.0 }
    }

    /// The wrapped filter.
    pub fn filter(&self) -> &Arc<dyn Filter> {
        &self.filter
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

    pub(crate) fn create_weight(&self, searcher: &dyn Searcher) -> Result<Box<dyn Weight>> {
        Ok(Box::new(ConstantWeight {
            filter: Arc::clone(&self.filter),
            context: searcher.context().clone(),
            boost: self.boost,
            query_norm: 0.0,
            query_weight: 0.0,
            guard: PhaseGuard::new(),
        }))
    }
}

impl fmt::Display for ConstantScoreQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConstantScore({}){}",
            self.filter.description(),
            boost_suffix(self.boost)
        )
    }
}

#[derive(Debug)]
struct ConstantWeight {
    filter: Arc<dyn Filter>,
    context: SearchContext,
    boost: f32,
    query_norm: f32,
    query_weight: f32,
    guard: PhaseGuard,
}

impl Weight for ConstantWeight {
    fn value(&self) -> f32 {
        self.query_weight
    }

    fn sum_of_squared_weights(&mut self) -> Result<f32> {
        self.guard.summed()?;
        self.query_weight = self.boost;
        Ok(self.query_weight * self.query_weight)
    }

    fn normalize(&mut self, norm: f32) -> Result<()> {
        self.guard.normalized()?;
        self.query_norm = norm;
        self.query_weight *= norm;
        Ok(())
    }

    fn scorer(
        &self,
        reader: &Arc<dyn IndexReader>,
        _score_docs_in_order: bool,
        _top_scorer: bool,
    ) -> Result<Option<Box<dyn Scorer>>> {
        self.guard.ensure_normalized()?;
        let docs = self.filter.doc_id_set(reader, &self.context)?;
        if docs.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(ConstantScorer::new(
            docs.iterator(),
            self.query_weight,
        ))))
    }

    fn explain(&self, reader: &Arc<dyn IndexReader>, doc: DocId) -> Result<Explanation> {
        let description = self.filter.description();
        let docs = self.filter.doc_id_set(reader, &self.context)?;
        if docs.contains(doc) {
            Ok(Explanation::with_match(
                true,
                self.query_weight,
                format!("ConstantScoreQuery({description}), product of:"),
            )
            .with_detail(Explanation::new(self.boost, "boost"))
            .with_detail(Explanation::new(self.query_norm, "queryNorm")))
        } else {
            Ok(Explanation::with_match(
                false,
                0.0,
                format!("ConstantScoreQuery({description}) doesn't match id {doc}"),
            ))
        }
    }
}
