//! The scorer abstraction and its simplest implementation.

use crate::error::{Result, TesseraError};
use crate::index::{DocId, NO_MORE_DOCS};
use crate::search::collector::Collector;
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::explanation::Explanation;

/// A segment-bound cursor that also scores its current document.
pub trait Scorer: DocIdSetIterator {
    /// Score of the current document. Only valid between a successful
    /// positioning call and the next one.
    fn score(&mut self) -> Result<f32>;

    /// Feed every remaining document to `collector`.
    fn score_all(&mut self, collector: &mut dyn Collector) -> Result<()> {
        let needs_scores = collector.needs_scores();
        let mut doc = self.next()?;
        while doc != NO_MORE_DOCS {
            let score = if needs_scores { self.score()? } else { 0.0 };
            collector.collect(doc, score)?;
            doc = self.next()?;
        }
        Ok(())
    }

    /// Feed documents from `first_doc` (the current one) up to, not
    /// including, `max`. Returns whether documents remain.
    fn score_window(
        &mut self,
        collector: &mut dyn Collector,
        max: DocId,
        first_doc: DocId,
    ) -> Result<bool> {
        let needs_scores = collector.needs_scores();
        let mut doc = first_doc;
        while doc < max {
            let score = if needs_scores { self.score()? } else { 0.0 };
            collector.collect(doc, score)?;
            doc = self.next()?;
        }
        Ok(doc != NO_MORE_DOCS)
    }

    /// Explain the score of `doc`; combinators cannot.
    fn explain(&mut self, _doc: DocId) -> Result<Explanation> {
        Err(TesseraError::unsupported(
            "this scorer cannot explain its scores",
        ))
    }
}

/// Scores every document of an iterator with one constant.
#[derive(Debug)]
pub struct ConstantScorer {
    iter: Box<dyn DocIdSetIterator>,
    score: f32,
}

impl ConstantScorer {
    /// Create a constant scorer over `iter`.
    pub fn new(iter: Box<dyn DocIdSetIterator>, score: f32) -> Self {
        ConstantScorer { iter, score }
    }
}

impl DocIdSetIterator for ConstantScorer {
    fn doc_id(&self) -> DocId {
        self.iter.doc_id()
    }

    fn next(&mut self) -> Result<DocId> {
        self.iter.next()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.iter.advance(target)
    }
}

impl Scorer for ConstantScorer {
    fn score(&mut self) -> Result<f32> {
        Ok(self.score)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::search::doc_id_set::DocIdSet;

    #[test]
    fn test_constant_scorer() {
        let set = DocIdSet::from_docs(vec![2, 5, 7]);
        let mut scorer = ConstantScorer::new(set.iterator(), 0.25);
        assert_eq!(drain(&mut scorer), vec![(2, 0.25), (5, 0.25), (7, 0.25)]);
        assert!(scorer.explain(2).is_err());
    }

    #[test]
    fn test_score_window_stops_at_max() {
        use crate::search::collector::TopScoreDocCollector;

        let mut scorer = VecScorer::docs(&[1, 3, 5, 8]);
        let mut collector = TopScoreDocCollector::new(10, true);
        let first = scorer.next().unwrap();
        let more = scorer.score_window(&mut collector, 5, first).unwrap();
        assert!(more);
        assert_eq!(scorer.doc_id(), 5);
        assert_eq!(collector.total_hits(), 2);
    }
}
