//! Intersection of scorers.

use crate::error::Result;
use crate::index::{DocId, NO_MORE_DOCS, NOT_STARTED};
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::scorer::Scorer;

/// Matches documents present in every sub-scorer; the score is the sum of
/// the sub-scores.
#[derive(Debug)]
pub struct ConjunctionScorer {
    scorers: Vec<Box<dyn Scorer>>,
    last_doc: DocId,
}

impl ConjunctionScorer {
    /// Position every sub-scorer on the first common document.
    pub fn new(mut scorers: Vec<Box<dyn Scorer>>) -> Result<Self> {
        if scorers.is_empty() {
            return Ok(ConjunctionScorer {
                scorers,
                last_doc: NO_MORE_DOCS,
            });
        }
        for scorer in scorers.iter_mut() {
            if scorer.next()? == NO_MORE_DOCS {
                return Ok(ConjunctionScorer {
                    scorers,
                    last_doc: NO_MORE_DOCS,
                });
            }
        }

        // Sorting by first document and reversing all but the last scorer
        // afterwards makes the sparsest scorers lead the leapfrog.
        scorers.sort_by_key(|s| s.doc_id());
        let mut conjunction = ConjunctionScorer {
            scorers,
            last_doc: NOT_STARTED,
        };
        if conjunction.do_next()? == NO_MORE_DOCS {
            conjunction.last_doc = NO_MORE_DOCS;
            return Ok(conjunction);
        }
        let end = conjunction.scorers.len() - 1;
        conjunction.scorers[..end].reverse();
        Ok(conjunction)
    }

    /// Leapfrog until all scorers agree, starting from the last one's doc.
    fn do_next(&mut self) -> Result<DocId> {
        let count = self.scorers.len();
        let mut first = 0;
        let mut doc = self.scorers[count - 1].doc_id();
        while self.scorers[first].doc_id() < doc {
            doc = self.scorers[first].advance(doc)?;
            first = if first == count - 1 { 0 } else { first + 1 };
        }
        Ok(doc)
    }
}

impl DocIdSetIterator for ConjunctionScorer {
    fn doc_id(&self) -> DocId {
        self.last_doc
    }

    fn next(&mut self) -> Result<DocId> {
        if self.last_doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let last = self.scorers.len() - 1;
        if self.last_doc == NOT_STARTED {
            self.last_doc = self.scorers[last].doc_id();
            return Ok(self.last_doc);
        }
        self.scorers[last].next()?;
        self.last_doc = self.do_next()?;
        Ok(self.last_doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.last_doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let last = self.scorers.len() - 1;
        if self.scorers[last].doc_id() < target {
            self.scorers[last].advance(target)?;
        }
        self.last_doc = self.do_next()?;
        Ok(self.last_doc)
    }
}

impl Scorer for ConjunctionScorer {
    fn score(&mut self) -> Result<f32> {
        let mut sum = 0.0;
        for scorer in self.scorers.iter_mut() {
            sum += scorer.score()?;
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::scorer::test_support::{VecScorer, drain};

    fn conjunction(lists: &[&[DocId]]) -> ConjunctionScorer {
        let scorers = lists
            .iter()
            .map(|docs| Box::new(VecScorer::docs(docs)) as Box<dyn Scorer>)
            .collect();
        ConjunctionScorer::new(scorers).unwrap()
    }

    #[test]
    fn test_intersection() {
        let mut scorer = conjunction(&[&[1, 2, 5, 7, 9], &[2, 5, 9, 10], &[0, 2, 3, 5, 9]]);
        assert_eq!(drain(&mut scorer), vec![(2, 3.0), (5, 3.0), (9, 3.0)]);
    }

    #[test]
    fn test_first_docs_ahead_of_each_other() {
        // First docs 1, 2, 3, 5, 5: every scorer has to catch up to 5.
        let mut scorer =
            conjunction(&[&[1, 5, 8], &[2, 5, 8], &[3, 5], &[5, 8], &[5, 6, 8]]);
        assert_eq!(scorer.next().unwrap(), 5);
        assert_eq!(scorer.next().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_advance() {
        let mut scorer = conjunction(&[&[1, 4, 6, 11], &[4, 6, 8, 11]]);
        assert_eq!(scorer.advance(5).unwrap(), 6);
        assert_eq!(scorer.advance(7).unwrap(), 11);
        assert_eq!(scorer.next().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_empty_sub_scorer_exhausts() {
        let mut scorer = conjunction(&[&[1, 2], &[]]);
        assert_eq!(scorer.doc_id(), NO_MORE_DOCS);
        assert_eq!(scorer.next().unwrap(), NO_MORE_DOCS);
        let mut none = conjunction(&[]);
        assert_eq!(none.next().unwrap(), NO_MORE_DOCS);
    }
}
