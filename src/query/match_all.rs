//! Query matching every live document.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{DocId, IndexReader, NO_MORE_DOCS, NOT_STARTED};
use crate::query::boost_suffix;
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::explanation::Explanation;
use crate::search::scorer::Scorer;
use crate::search::searcher::Searcher;
use crate::search::similarity::Similarity;
use crate::search::weight::{PhaseGuard, Weight};

/// Matches all non-deleted documents with a constant score, optionally
/// scaled by the norms of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchAllDocsQuery {
    norms_field: Option<String>,
    boost: f32,
}

impl Default for MatchAllDocsQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchAllDocsQuery {
    /// Create a match-all query.
    pub fn new() -> Self {
        MatchAllDocsQuery {
            norms_field: None,
            boost: 1.0,
        }
    }

    /// Multiply each document's score by its norm in `field`.
    pub fn with_norms_field<F: Into<String>>(mut self, field: F) -> Self {
        self.norms_field = Some(field.into());
        self
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
        Ok(Box::new(MatchAllWeight {
            norms_field: self.norms_field.clone(),
            similarity: Arc::clone(&searcher.context().similarity),
            boost: self.boost,
            query_norm: 0.0,
            query_weight: 0.0,
            guard: PhaseGuard::new(),
        }))
    }
}

impl fmt::Display for MatchAllDocsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*:*{}", boost_suffix(self.boost))
    }
}

#[derive(Debug)]
struct MatchAllWeight {
    norms_field: Option<String>,
    similarity: Arc<dyn Similarity>,
    boost: f32,
    query_norm: f32,
    query_weight: f32,
    guard: PhaseGuard,
}

impl Weight for MatchAllWeight {
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
        Ok(Some(Box::new(MatchAllScorer {
            reader: Arc::clone(reader),
            norms: self.norms_field.as_deref().and_then(|f| reader.norms(f)),
            similarity: Arc::clone(&self.similarity),
            score: self.query_weight,
            doc: NOT_STARTED,
        })))
    }

    fn explain(&self, reader: &Arc<dyn IndexReader>, doc: DocId) -> Result<Explanation> {
        if doc < 0 || doc >= reader.max_doc() || reader.is_deleted(doc) {
            return Ok(Explanation::with_match(
                false,
                0.0,
                format!("MatchAllDocsQuery doesn't match id {doc}"),
            ));
        }
        let mut result =
            Explanation::with_match(true, self.query_weight, "MatchAllDocsQuery, product of:");
        if self.boost != 1.0 {
            result.add_detail(Explanation::new(self.boost, "boost"));
        }
        result.add_detail(Explanation::new(self.query_norm, "queryNorm"));
        Ok(result)
    }
}

/// Walks every live document id of one reader.
#[derive(Debug)]
struct MatchAllScorer {
    reader: Arc<dyn IndexReader>,
    norms: Option<Arc<Vec<u8>>>,
    similarity: Arc<dyn Similarity>,
    score: f32,
    doc: DocId,
}

impl MatchAllScorer {
    fn settle(&mut self, mut doc: DocId) -> DocId {
        let max_doc = self.reader.max_doc();
        while doc < max_doc && self.reader.is_deleted(doc) {
            doc += 1;
        }
        self.doc = if doc < max_doc { doc } else { NO_MORE_DOCS };
        self.doc
    }
}

impl DocIdSetIterator for MatchAllScorer {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        Ok(self.settle(self.doc + 1))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        Ok(self.settle(target.max(self.doc + 1)))
    }
}

impl Scorer for MatchAllScorer {
    fn score(&mut self) -> Result<f32> {
        Ok(
            match self.norms.as_ref().and_then(|n| n.get(self.doc as usize)) {
                Some(&b) => self.score * self.similarity.decode_norm(b),
                None => self.score,
            },
        )
    }
}
