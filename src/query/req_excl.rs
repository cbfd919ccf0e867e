//! Required scorer minus an exclusion.

use crate::error::{Result, TesseraError};
use crate::index::{DocId, NO_MORE_DOCS, NOT_STARTED};
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::scorer::Scorer;

/// Documents of a required scorer that the excluded scorer does not
/// contain. Scores come from the required scorer alone.
#[derive(Debug)]
pub struct ReqExclScorer {
    required: Option<Box<dyn Scorer>>,
    excluded: Option<Box<dyn Scorer>>,
    doc: DocId,
}

impl ReqExclScorer {
    /// Combine an unpositioned required and excluded scorer.
    pub fn new(required: Box<dyn Scorer>, excluded: Box<dyn Scorer>) -> Self {
        ReqExclScorer {
            required: Some(required),
            excluded: Some(excluded),
            doc: NOT_STARTED,
        }
    }

    /// Starting at the required scorer's current document, find the first
    /// one that is not excluded.
    fn to_non_excluded(&mut self) -> Result<DocId> {
        let Some(required) = self.required.as_mut() else {
            return Ok(NO_MORE_DOCS);
        };
        let Some(excluded) = self.excluded.as_mut() else {
            return Ok(required.doc_id());
        };

        let mut excl_doc = excluded.doc_id();
        let mut req_doc = required.doc_id();
        while req_doc != NO_MORE_DOCS {
            if req_doc < excl_doc {
                return Ok(req_doc);
            }
            if req_doc > excl_doc {
                excl_doc = excluded.advance(req_doc)?;
                if excl_doc == NO_MORE_DOCS {
                    self.excluded = None;
                    return Ok(req_doc);
                }
                if excl_doc > req_doc {
                    return Ok(req_doc);
                }
            }
            req_doc = required.next()?;
        }
        self.required = None;
        Ok(NO_MORE_DOCS)
    }
}

impl DocIdSetIterator for ReqExclScorer {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        let Some(required) = self.required.as_mut() else {
            return Ok(self.doc);
        };
        self.doc = required.next()?;
        if self.doc == NO_MORE_DOCS {
            self.required = None;
            return Ok(self.doc);
        }
        self.doc = self.to_non_excluded()?;
        Ok(self.doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let Some(required) = self.required.as_mut() else {
            self.doc = NO_MORE_DOCS;
            return Ok(self.doc);
        };
        if required.advance(target)? == NO_MORE_DOCS {
            self.required = None;
            self.doc = NO_MORE_DOCS;
            return Ok(self.doc);
        }
        self.doc = self.to_non_excluded()?;
        Ok(self.doc)
    }
}

impl Scorer for ReqExclScorer {
    fn score(&mut self) -> Result<f32> {
        match self.required.as_mut() {
            Some(required) => required.score(),
            None => Err(TesseraError::illegal_state("score of an exhausted scorer")),
        }
    }
}
