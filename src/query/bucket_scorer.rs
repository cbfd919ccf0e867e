//! Window-at-a-time scorer for pure disjunctions.
//!
//! Sub-scorers are drained into a fixed table of buckets one window of
//! `BUCKET_TABLE_SIZE` documents at a time; matches within a window come
//! out in no particular order. Only usable as a top-level scorer whose
//! collector accepts out-of-order documents.

use std::sync::Arc;

use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader, NO_MORE_DOCS, NOT_STARTED};
use crate::search::collector::Collector;
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::scorer::Scorer;

const BUCKET_TABLE_SIZE: usize = 1 << 11;
const BUCKET_TABLE_MASK: DocId = (BUCKET_TABLE_SIZE - 1) as DocId;

/// Prohibited clauses beyond this cannot get their own mask bit.
pub const MAX_PROHIBITED_CLAUSES: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    doc: DocId,
    score: f32,
    bits: u32,
    coord: usize,
    next: Option<usize>,
}

impl Default for Bucket {
    fn default() -> Self {
        Bucket {
            doc: NOT_STARTED,
            score: 0.0,
            bits: 0,
            coord: 0,
            next: None,
        }
    }
}

/// Buckets plus the head of the list of buckets filled in this window.
#[derive(Debug)]
struct BucketTable {
    buckets: Vec<Bucket>,
    first: Option<usize>,
}

impl BucketTable {
    fn new() -> Self {
        BucketTable {
            buckets: vec![Bucket::default(); BUCKET_TABLE_SIZE],
            first: None,
        }
    }
}

/// Accumulates one sub-scorer's matches into the table.
#[derive(Debug)]
struct BucketCollector<'a> {
    table: &'a mut BucketTable,
    mask: u32,
}

impl Collector for BucketCollector<'_> {
    fn set_next_reader(&mut self, _reader: &Arc<dyn IndexReader>, _doc_base: DocId) -> Result<()> {
        Ok(())
    }

    fn collect(&mut self, doc: DocId, score: f32) -> Result<()> {
        let slot = (doc & BUCKET_TABLE_MASK) as usize;
        let first = self.table.first;
        let bucket = &mut self.table.buckets[slot];
        if bucket.doc != doc {
            *bucket = Bucket {
                doc,
                score,
                bits: self.mask,
                coord: 1,
                next: first,
            };
            self.table.first = Some(slot);
        } else {
            bucket.score += score;
            bucket.bits |= self.mask;
            bucket.coord += 1;
        }
        Ok(())
    }

    fn accepts_docs_out_of_order(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct SubScorer {
    scorer: Box<dyn Scorer>,
    /// Zero for optional clauses, one distinct bit per prohibited clause.
    mask: u32,
}

/// Out-of-order scorer for boolean queries without required clauses.
#[derive(Debug)]
pub struct BooleanScorer {
    subs: Vec<SubScorer>,
    table: BucketTable,
    prohibited_mask: u32,
    minimum_should_match: usize,
    coord_factors: Vec<f32>,
    end: DocId,
    current: Option<usize>,
    doc: DocId,
}

impl BooleanScorer {
    /// Build from unpositioned optional and prohibited scorers.
    ///
    /// `coord_factors[i]` is the coordination factor for `i` matching
    /// optional clauses.
    pub fn new(
        optional: Vec<Box<dyn Scorer>>,
        prohibited: Vec<Box<dyn Scorer>>,
        minimum_should_match: usize,
        coord_factors: Vec<f32>,
    ) -> Result<Self> {
        if prohibited.len() >= MAX_PROHIBITED_CLAUSES {
            return Err(TesseraError::invalid_argument(format!(
                "bucket scoring supports fewer than {MAX_PROHIBITED_CLAUSES} prohibited clauses"
            )));
        }

        let mut subs = Vec::with_capacity(optional.len() + prohibited.len());
        for mut scorer in optional {
            if scorer.next()? != NO_MORE_DOCS {
                subs.push(SubScorer { scorer, mask: 0 });
            }
        }
        let mut prohibited_mask = 0u32;
        for (i, mut scorer) in prohibited.into_iter().enumerate() {
            let mask = 1u32 << i;
            prohibited_mask |= mask;
            if scorer.next()? != NO_MORE_DOCS {
                subs.push(SubScorer { scorer, mask });
            }
        }

        Ok(BooleanScorer {
            subs,
            table: BucketTable::new(),
            prohibited_mask,
            minimum_should_match,
            coord_factors,
            end: 0,
            current: None,
            doc: NOT_STARTED,
        })
    }

    fn accepts(&self, bucket: &Bucket) -> bool {
        bucket.bits & self.prohibited_mask == 0 && bucket.coord >= self.minimum_should_match
    }

    fn coord_factor(&self, coord: usize) -> f32 {
        self.coord_factors.get(coord).copied().unwrap_or(1.0)
    }

    /// Drain the sub-scorers up to the next window boundary. Returns
    /// whether any of them has documents beyond it.
    fn refill(&mut self) -> Result<bool> {
        self.end = self.end.saturating_add(BUCKET_TABLE_SIZE as DocId);
        let mut more = false;
        for sub in self.subs.iter_mut() {
            let doc = sub.scorer.doc_id();
            if doc != NO_MORE_DOCS {
                let mut collector = BucketCollector {
                    table: &mut self.table,
                    mask: sub.mask,
                };
                more |= sub.scorer.score_window(&mut collector, self.end, doc)?;
            }
        }
        Ok(more)
    }
}

impl DocIdSetIterator for BooleanScorer {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        loop {
            while let Some(slot) = self.table.first {
                let bucket = self.table.buckets[slot];
                self.table.first = bucket.next;
                self.current = Some(slot);
                if self.accepts(&bucket) {
                    self.doc = bucket.doc;
                    return Ok(self.doc);
                }
            }
            let more = self.refill()?;
            if self.table.first.is_none() && !more {
                break;
            }
        }
        self.doc = NO_MORE_DOCS;
        Ok(self.doc)
    }

    fn advance(&mut self, _target: DocId) -> Result<DocId> {
        Err(TesseraError::unsupported(
            "the bucket scorer cannot advance; it only scores whole segments",
        ))
    }
}

impl Scorer for BooleanScorer {
    fn score(&mut self) -> Result<f32> {
        let Some(slot) = self.current else {
            return Err(TesseraError::illegal_state("score before the first document"));
        };
        let bucket = &self.table.buckets[slot];
        Ok(bucket.score * self.coord_factor(bucket.coord))
    }

    fn score_all(&mut self, collector: &mut dyn Collector) -> Result<()> {
        let first = self.next()?;
        self.score_window(collector, NO_MORE_DOCS, first)?;
        Ok(())
    }

    fn score_window(
        &mut self,
        collector: &mut dyn Collector,
        max: DocId,
        _first_doc: DocId,
    ) -> Result<bool> {
        loop {
            self.table.first = None;
            while let Some(slot) = self.current {
                let bucket = self.table.buckets[slot];
                if bucket.bits & self.prohibited_mask == 0 {
                    if bucket.doc >= max {
                        // Keep it for the next window.
                        self.current = bucket.next;
                        self.table.buckets[slot].next = self.table.first;
                        self.table.first = Some(slot);
                        continue;
                    }
                    if bucket.coord >= self.minimum_should_match {
                        self.doc = bucket.doc;
                        let score = bucket.score * self.coord_factor(bucket.coord);
                        collector.collect(bucket.doc, score)?;
                    }
                }
                self.current = bucket.next;
            }

            if let Some(first) = self.table.first {
                self.current = Some(first);
                self.table.first = self.table.buckets[first].next;
                return Ok(true);
            }

            let more = self.refill()?;
            self.current = self.table.first;
            if self.current.is_none() && !more {
                return Ok(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::collector::TopScoreDocCollector;
    use crate::search::scorer::test_support::VecScorer;

    fn scorer(
        optional: Vec<Vec<(DocId, f32)>>,
        prohibited: Vec<Vec<DocId>>,
        minimum_should_match: usize,
    ) -> BooleanScorer {
        let max_coord = optional.len();
        let coord = (0..=max_coord).map(|i| i as f32 / max_coord as f32).collect();
        BooleanScorer::new(
            optional.into_iter().map(VecScorer::boxed).collect(),
            prohibited
                .into_iter()
                .map(|docs| Box::new(VecScorer::docs(&docs)) as Box<dyn Scorer>)
                .collect(),
            minimum_should_match,
            coord,
        )
        .unwrap()
    }

    fn drain_sorted(scorer: &mut BooleanScorer) -> Vec<(DocId, f32)> {
        let mut hits = Vec::new();
        while scorer.next().unwrap() != NO_MORE_DOCS {
            hits.push((scorer.doc_id(), scorer.score().unwrap()));
        }
        hits.sort_by_key(|h| h.0);
        hits
    }

    #[test]
    fn test_union_with_coord() {
        let mut s = scorer(
            vec![vec![(1, 1.0), (3, 1.0)], vec![(3, 1.0), (5000, 2.0)]],
            vec![],
            0,
        );
        assert_eq!(drain_sorted(&mut s), vec![(1, 0.5), (3, 2.0), (5000, 1.0)]);
    }

    #[test]
    fn test_prohibited_and_minimum_match() {
        let mut s = scorer(
            vec![
                vec![(1, 1.0), (2, 1.0), (3, 1.0)],
                vec![(2, 1.0), (3, 1.0)],
                vec![(3, 1.0), (4, 1.0)],
            ],
            vec![vec![3]],
            2,
        );
        assert_eq!(drain_sorted(&mut s).iter().map(|h| h.0).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_score_all_spans_windows() {
        let docs: Vec<(DocId, f32)> = (0..10_000).step_by(7).map(|d| (d, 1.0)).collect();
        let expected = docs.len();
        let mut s = scorer(vec![docs, vec![(14, 1.0)]], vec![vec![21]], 0);
        let mut collector = TopScoreDocCollector::new(5, false);
        s.score_all(&mut collector).unwrap();
        assert_eq!(collector.total_hits(), expected - 1);
        let top = collector.top_docs();
        assert_eq!(top.score_docs[0].doc, 14);
    }

    #[test]
    fn test_advance_unsupported() {
        let mut s = scorer(vec![vec![(1, 1.0)]], vec![], 0);
        assert!(s.advance(1).is_err());
    }
}
