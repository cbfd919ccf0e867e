//! Collector implementations for gathering search results.

use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader};
use crate::search::top_docs::{HitEntry, ScoreDoc, TopDocs};

/// Sink for matching documents.
///
/// A searcher calls [`set_next_reader`](Collector::set_next_reader) before
/// each segment, then [`collect`](Collector::collect) once per match with the
/// segment-local id and its score (0.0 when
/// [`needs_scores`](Collector::needs_scores) is false).
pub trait Collector: Send + Debug {
    /// Switch to the next segment, whose ids start at `doc_base`.
    fn set_next_reader(&mut self, reader: &Arc<dyn IndexReader>, doc_base: DocId) -> Result<()>;

    /// Collect a segment-local document hit.
    fn collect(&mut self, doc: DocId, score: f32) -> Result<()>;

    /// Whether hits may arrive in any id order.
    fn accepts_docs_out_of_order(&self) -> bool;

    /// Whether scores must be computed for this collector.
    fn needs_scores(&self) -> bool {
        true
    }
}

/// A collector that keeps the top N documents by score.
#[derive(Debug)]
pub struct TopScoreDocCollector {
    /// Maximum number of documents to keep.
    num_hits: usize,
    /// Kept hits, worst on top.
    hits: BinaryHeap<HitEntry>,
    /// Number of collect calls.
    total_hits: usize,
    doc_base: DocId,
    docs_scored_in_order: bool,
}

impl TopScoreDocCollector {
    /// Create a collector keeping `num_hits` hits. When
    /// `docs_scored_in_order` is false the collector accepts out-of-order hits.
    pub fn new(num_hits: usize, docs_scored_in_order: bool) -> Self {
        TopScoreDocCollector {
            num_hits,
            hits: BinaryHeap::with_capacity(num_hits + 1),
            total_hits: 0,
            doc_base: 0,
            docs_scored_in_order,
        }
    }

    /// Number of collect calls so far.
    pub fn total_hits(&self) -> usize {
        self.total_hits
    }

    /// Offer a hit in the searcher's id space.
    pub(crate) fn offer(&mut self, doc: DocId, score: f32) -> bool {
        if self.num_hits == 0 {
            return false;
        }
        if self.hits.len() < self.num_hits {
            self.hits.push(HitEntry(ScoreDoc::new(doc, score)));
            return true;
        }
        match self.hits.peek() {
            Some(worst) if worst.is_beaten_by(doc, score) => {
                self.hits.pop();
                self.hits.push(HitEntry(ScoreDoc::new(doc, score)));
                true
            }
            _ => false,
        }
    }

    /// Add to the running hit count without offering a candidate.
    pub(crate) fn add_total_hits(&mut self, count: usize) {
        self.total_hits += count;
    }

    /// Consume the collector into its results, best first.
    pub fn top_docs(self) -> TopDocs {
        // Ascending entry order is best first.
        let score_docs: Vec<ScoreDoc> = self
            .hits
            .into_sorted_vec()
            .into_iter()
            .map(|entry| entry.0)
            .collect();
        let max_score = score_docs.first().map_or(f32::NAN, |sd| sd.score);
        TopDocs {
            total_hits: self.total_hits,
            score_docs,
            max_score,
        }
    }
}

impl Collector for TopScoreDocCollector {
    fn set_next_reader(&mut self, _reader: &Arc<dyn IndexReader>, doc_base: DocId) -> Result<()> {
        self.doc_base = doc_base;
        Ok(())
    }

    fn collect(&mut self, doc: DocId, score: f32) -> Result<()> {
        self.total_hits += 1;
        self.offer(doc + self.doc_base, score);
        Ok(())
    }

    fn accepts_docs_out_of_order(&self) -> bool {
        !self.docs_scored_in_order
    }
}

/// Counts hits without scoring them.
#[derive(Debug, Default)]
pub struct TotalHitCountCollector {
    total_hits: usize,
}

impl TotalHitCountCollector {
    /// Create a new counting collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hits counted.
    pub fn total_hits(&self) -> usize {
        self.total_hits
    }
}

impl Collector for TotalHitCountCollector {
    fn set_next_reader(&mut self, _reader: &Arc<dyn IndexReader>, _doc_base: DocId) -> Result<()> {
        Ok(())
    }

    fn collect(&mut self, _doc: DocId, _score: f32) -> Result<()> {
        self.total_hits += 1;
        Ok(())
    }

    fn accepts_docs_out_of_order(&self) -> bool {
        true
    }

    fn needs_scores(&self) -> bool {
        false
    }
}

/// Forwards only hits with a positive score.
#[derive(Debug)]
pub struct PositiveScoresOnlyCollector<C: Collector> {
    inner: C,
}

impl<C: Collector> PositiveScoresOnlyCollector<C> {
    /// Wrap a collector.
    pub fn new(inner: C) -> Self {
        PositiveScoresOnlyCollector { inner }
    }

    /// Unwrap the inner collector.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Collector> Collector for PositiveScoresOnlyCollector<C> {
    fn set_next_reader(&mut self, reader: &Arc<dyn IndexReader>, doc_base: DocId) -> Result<()> {
        self.inner.set_next_reader(reader, doc_base)
    }

    fn collect(&mut self, doc: DocId, score: f32) -> Result<()> {
        if score > 0.0 {
            self.inner.collect(doc, score)?;
        }
        Ok(())
    }

    fn accepts_docs_out_of_order(&self) -> bool {
        self.inner.accepts_docs_out_of_order()
    }
}

/// Aborts collection once a time budget is spent.
///
/// Whether the document in flight when the budget runs out is still handed
/// to the inner collector is fixed at construction (`greedy`).
#[derive(Debug)]
pub struct TimeLimitingCollector<C: Collector> {
    inner: C,
    allowed: Duration,
    started: Instant,
    greedy: bool,
    doc_base: DocId,
}

impl<C: Collector> TimeLimitingCollector<C> {
    /// Wrap `inner`, allowing `allowed` from now.
    pub fn new(inner: C, allowed: Duration, greedy: bool) -> Self {
        TimeLimitingCollector {
            inner,
            allowed,
            started: Instant::now(),
            greedy,
            doc_base: 0,
        }
    }

    /// Whether the in-flight document is collected on timeout.
    pub fn is_greedy(&self) -> bool {
        self.greedy
    }

    /// Unwrap the inner collector, keeping whatever it gathered.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Collector> Collector for TimeLimitingCollector<C> {
    fn set_next_reader(&mut self, reader: &Arc<dyn IndexReader>, doc_base: DocId) -> Result<()> {
        self.doc_base = doc_base;
        self.inner.set_next_reader(reader, doc_base)
    }

    fn collect(&mut self, doc: DocId, score: f32) -> Result<()> {
        let elapsed = self.started.elapsed();
        if elapsed > self.allowed {
            if self.greedy {
                self.inner.collect(doc, score)?;
            }
            let last_doc = self.doc_base + doc;
            warn!(
                "search exceeded its time budget after {:?} (allowed {:?}) at doc {}",
                elapsed, self.allowed, last_doc
            );
            return Err(TesseraError::TimeExceeded {
                last_doc,
                elapsed,
                allowed: self.allowed,
            });
        }
        self.inner.collect(doc, score)
    }

    fn accepts_docs_out_of_order(&self) -> bool {
        self.inner.accepts_docs_out_of_order()
    }

    fn needs_scores(&self) -> bool {
        self.inner.needs_scores()
    }
}

/// Shifts segment bases by a fixed offset; used when a composite searcher
/// forwards a caller's collector to one of its parts.
#[derive(Debug)]
pub(crate) struct OffsetCollector<'a> {
    inner: &'a mut dyn Collector,
    offset: DocId,
}

impl<'a> OffsetCollector<'a> {
    pub(crate) fn new(inner: &'a mut dyn Collector, offset: DocId) -> Self {
        OffsetCollector { inner, offset }
    }
}

impl Collector for OffsetCollector<'_> {
    fn set_next_reader(&mut self, reader: &Arc<dyn IndexReader>, doc_base: DocId) -> Result<()> {
        self.inner.set_next_reader(reader, doc_base + self.offset)
    }

    fn collect(&mut self, doc: DocId, score: f32) -> Result<()> {
        self.inner.collect(doc, score)
    }

    fn accepts_docs_out_of_order(&self) -> bool {
        self.inner.accepts_docs_out_of_order()
    }

    fn needs_scores(&self) -> bool {
        self.inner.needs_scores()
    }
}
