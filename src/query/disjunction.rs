//! Disjunction scoring: a min-heap of scorers keyed by their current
//! document, and the summing union built on it.

use crate::error::{Result, TesseraError};
use crate::index::{DocId, NO_MORE_DOCS, NOT_STARTED};
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::scorer::Scorer;

#[derive(Debug)]
struct HeapedScorer {
    scorer: Box<dyn Scorer>,
    doc: DocId,
}

/// Scorers ordered by current document, smallest on top.
///
/// Each entry caches its scorer's document so sifting never calls back into
/// the scorer.
#[derive(Debug, Default)]
pub struct ScorerDocQueue {
    heap: Vec<HeapedScorer>,
}

impl ScorerDocQueue {
    /// An empty queue with room for `capacity` scorers.
    pub fn with_capacity(capacity: usize) -> Self {
        ScorerDocQueue {
            heap: Vec::with_capacity(capacity),
        }
    }

    /// Add a positioned scorer.
    pub fn push(&mut self, scorer: Box<dyn Scorer>) {
        let doc = scorer.doc_id();
        self.heap.push(HeapedScorer { scorer, doc });
        self.up_heap(self.heap.len() - 1);
    }

    /// Number of scorers still in the queue.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether every scorer has been exhausted.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Document of the top scorer; `NO_MORE_DOCS` when empty.
    pub fn top_doc(&self) -> DocId {
        self.heap.first().map_or(NO_MORE_DOCS, |top| top.doc)
    }

    /// Score of the top scorer at its current document.
    pub fn top_score(&mut self) -> Result<f32> {
        match self.heap.first_mut() {
            Some(top) => top.scorer.score(),
            None => Err(TesseraError::illegal_state("score of an empty scorer queue")),
        }
    }

    /// Move the top scorer to its next document and restore heap order,
    /// dropping it when exhausted. Returns whether it is still present.
    pub fn top_next_and_adjust_else_pop(&mut self) -> Result<bool> {
        let more = match self.heap.first_mut() {
            Some(top) => top.scorer.next()? != NO_MORE_DOCS,
            None => return Ok(false),
        };
        Ok(self.adjust_else_pop(more))
    }

    /// Like [`top_next_and_adjust_else_pop`](Self::top_next_and_adjust_else_pop)
    /// with `advance(target)`.
    pub fn top_advance_and_adjust_else_pop(&mut self, target: DocId) -> Result<bool> {
        let more = match self.heap.first_mut() {
            Some(top) => top.scorer.advance(target)? != NO_MORE_DOCS,
            None => return Ok(false),
        };
        Ok(self.adjust_else_pop(more))
    }

    /// Sum and maximum of the scores of every scorer positioned on the top
    /// document.
    pub fn top_matches_sum_and_max(&mut self) -> Result<(f32, f32)> {
        let doc = self.top_doc();
        let first = self.top_score()?;
        let mut acc = (first, first);
        self.accumulate(1, doc, &mut acc)?;
        self.accumulate(2, doc, &mut acc)?;
        Ok(acc)
    }

    fn accumulate(&mut self, root: usize, doc: DocId, acc: &mut (f32, f32)) -> Result<()> {
        if root < self.heap.len() && self.heap[root].doc == doc {
            let sub = self.heap[root].scorer.score()?;
            acc.0 += sub;
            acc.1 = acc.1.max(sub);
            self.accumulate(2 * root + 1, doc, acc)?;
            self.accumulate(2 * root + 2, doc, acc)?;
        }
        Ok(())
    }

    fn adjust_else_pop(&mut self, keep: bool) -> bool {
        if keep {
            self.heap[0].doc = self.heap[0].scorer.doc_id();
        } else {
            self.heap.swap_remove(0);
        }
        if !self.heap.is_empty() {
            self.down_heap(0);
        }
        keep
    }

    fn up_heap(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].doc >= self.heap[parent].doc {
                break;
            }
            self.heap.swap(i, parent);
            i = parent;
        }
    }

    fn down_heap(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.heap[right].doc < self.heap[left].doc {
                right
            } else {
                left
            };
            if self.heap[child].doc >= self.heap[i].doc {
                break;
            }
            self.heap.swap(i, child);
            i = child;
        }
    }
}

/// Union of sub-scorers whose score is the sum of the matching ones.
///
/// A document matches when at least `minimum_matchers` sub-scorers contain
/// it.
#[derive(Debug)]
pub struct DisjunctionSumScorer {
    queue: ScorerDocQueue,
    minimum_matchers: usize,
    current_doc: DocId,
    current_score: f32,
    matchers: usize,
}

impl DisjunctionSumScorer {
    /// Build over at least two unpositioned sub-scorers.
    pub fn new(scorers: Vec<Box<dyn Scorer>>, minimum_matchers: usize) -> Result<Self> {
        if minimum_matchers == 0 {
            return Err(TesseraError::invalid_argument(
                "minimum number of matchers must be positive",
            ));
        }
        if scorers.len() < 2 {
            return Err(TesseraError::invalid_argument(
                "a disjunction needs at least two sub-scorers",
            ));
        }

        let mut queue = ScorerDocQueue::with_capacity(scorers.len());
        for mut scorer in scorers {
            if scorer.next()? != NO_MORE_DOCS {
                queue.push(scorer);
            }
        }
        Ok(DisjunctionSumScorer {
            queue,
            minimum_matchers,
            current_doc: NOT_STARTED,
            current_score: f32::NAN,
            matchers: 0,
        })
    }

    /// Number of sub-scorers matching the current document.
    pub fn matchers(&self) -> usize {
        self.matchers
    }

    /// Gather every sub-scorer on the top document, repeating until enough
    /// of them agree. Returns false once that can no longer happen.
    fn advance_after_current(&mut self) -> Result<bool> {
        loop {
            self.current_doc = self.queue.top_doc();
            self.current_score = self.queue.top_score()?;
            self.matchers = 1;
            loop {
                if !self.queue.top_next_and_adjust_else_pop()? && self.queue.is_empty() {
                    break;
                }
                if self.queue.top_doc() != self.current_doc {
                    break;
                }
                self.current_score += self.queue.top_score()?;
                self.matchers += 1;
            }

            if self.matchers >= self.minimum_matchers {
                return Ok(true);
            }
            if self.queue.len() < self.minimum_matchers {
                return Ok(false);
            }
        }
    }
}

impl DocIdSetIterator for DisjunctionSumScorer {
    fn doc_id(&self) -> DocId {
        self.current_doc
    }

    fn next(&mut self) -> Result<DocId> {
        if self.queue.len() < self.minimum_matchers || !self.advance_after_current()? {
            self.current_doc = NO_MORE_DOCS;
        }
        Ok(self.current_doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.queue.len() < self.minimum_matchers {
            self.current_doc = NO_MORE_DOCS;
            return Ok(NO_MORE_DOCS);
        }
        if target <= self.current_doc {
            return Ok(self.current_doc);
        }
        loop {
            if self.queue.top_doc() >= target {
                if !self.advance_after_current()? {
                    self.current_doc = NO_MORE_DOCS;
                }
                return Ok(self.current_doc);
            }
            if !self.queue.top_advance_and_adjust_else_pop(target)?
                && self.queue.len() < self.minimum_matchers
            {
                self.current_doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }
        }
    }
}

impl Scorer for DisjunctionSumScorer {
    fn score(&mut self) -> Result<f32> {
        Ok(self.current_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::scorer::test_support::{VecScorer, drain};

    fn scorers(lists: &[&[DocId]]) -> Vec<Box<dyn Scorer>> {
        lists
            .iter()
            .map(|docs| Box::new(VecScorer::docs(docs)) as Box<dyn Scorer>)
            .collect()
    }

    #[test]
    fn test_union_sums_matching_scores() {
        let mut scorer =
            DisjunctionSumScorer::new(scorers(&[&[1, 3, 5], &[3, 4], &[5, 9]]), 1).unwrap();
        let hits = drain(&mut scorer);
        assert_eq!(hits, vec![(1, 1.0), (3, 2.0), (4, 1.0), (5, 2.0), (9, 1.0)]);
    }

    #[test]
    fn test_minimum_matchers() {
        let mut scorer =
            DisjunctionSumScorer::new(scorers(&[&[1, 3, 5], &[3, 4, 5], &[5, 9]]), 2).unwrap();
        assert_eq!(scorer.next().unwrap(), 3);
        assert_eq!(scorer.matchers(), 2);
        assert_eq!(scorer.next().unwrap(), 5);
        assert_eq!(scorer.matchers(), 3);
        assert_eq!(scorer.next().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_advance() {
        let mut scorer =
            DisjunctionSumScorer::new(scorers(&[&[1, 3, 8], &[2, 8, 12], &[7]]), 1).unwrap();
        assert_eq!(scorer.advance(4).unwrap(), 7);
        assert_eq!(scorer.advance(8).unwrap(), 8);
        assert_eq!(scorer.score().unwrap(), 2.0);
        assert_eq!(scorer.advance(13).unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_rejects_degenerate_construction() {
        assert!(DisjunctionSumScorer::new(scorers(&[&[1], &[2]]), 0).is_err());
        assert!(DisjunctionSumScorer::new(scorers(&[&[1]]), 1).is_err());
    }

    #[test]
    fn test_queue_sum_and_max_at_top() {
        let mut queue = ScorerDocQueue::default();
        for hits in [vec![(2, 1.0)], vec![(2, 3.0)], vec![(4, 9.0)], vec![(2, 0.5)]] {
            let mut scorer = VecScorer::boxed(hits);
            scorer.next().unwrap();
            queue.push(scorer);
        }
        assert_eq!(queue.top_doc(), 2);
        assert_eq!(queue.top_matches_sum_and_max().unwrap(), (4.5, 3.0));
    }
}
