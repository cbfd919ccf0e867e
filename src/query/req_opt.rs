//! Required scorer with an optional score contribution.

use crate::error::Result;
use crate::index::{DocId, NO_MORE_DOCS};
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::scorer::Scorer;

/// Iterates the required scorer; adds the optional scorer's score on
/// documents it also contains.
#[derive(Debug)]
pub struct ReqOptSumScorer {
    required: Box<dyn Scorer>,
    optional: Option<Box<dyn Scorer>>,
}

impl ReqOptSumScorer {
    /// Combine unpositioned required and optional scorers.
    pub fn new(required: Box<dyn Scorer>, optional: Box<dyn Scorer>) -> Self {
        ReqOptSumScorer {
            required,
            optional: Some(optional),
        }
    }
}

impl DocIdSetIterator for ReqOptSumScorer {
    fn doc_id(&self) -> DocId {
        self.required.doc_id()
    }

    fn next(&mut self) -> Result<DocId> {
        self.required.next()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.required.advance(target)
    }
}

impl Scorer for ReqOptSumScorer {
    fn score(&mut self) -> Result<f32> {
        let doc = self.required.doc_id();
        let req_score = self.required.score()?;
        let Some(optional) = self.optional.as_mut() else {
            return Ok(req_score);
        };

        let mut opt_doc = optional.doc_id();
        if opt_doc < doc {
            opt_doc = optional.advance(doc)?;
            if opt_doc == NO_MORE_DOCS {
                self.optional = None;
                return Ok(req_score);
            }
        }
        if opt_doc == doc {
            Ok(req_score + optional.score()?)
        } else {
            Ok(req_score)
        }
    }
}
