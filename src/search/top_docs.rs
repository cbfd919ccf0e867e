//! Search results.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::index::DocId;
use crate::search::sort::{SortField, SortValue};

/// A hit: document id and score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDoc {
    /// Document id in the searcher's id space.
    pub doc: DocId,
    /// Relevance score.
    pub score: f32,
}

impl ScoreDoc {
    /// Create a new hit.
    pub fn new(doc: DocId, score: f32) -> Self {
        ScoreDoc { doc, score }
    }
}

/// The best hits of a search, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopDocs {
    /// Number of matching documents, which may exceed `score_docs.len()`.
    pub total_hits: usize,
    /// Hits in descending score order; ties by ascending id.
    pub score_docs: Vec<ScoreDoc>,
    /// Best score, or NaN when nothing matched.
    pub max_score: f32,
}

impl TopDocs {
    /// A result with no hits.
    pub fn empty() -> Self {
        TopDocs {
            total_hits: 0,
            score_docs: Vec::new(),
            max_score: f32::NAN,
        }
    }

    /// Document ids of the hits, in rank order.
    pub fn doc_ids(&self) -> Vec<DocId> {
        self.score_docs.iter().map(|sd| sd.doc).collect()
    }
}

/// A hit carrying the values it was sorted by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDoc {
    /// Document id in the searcher's id space.
    pub doc: DocId,
    /// Relevance score (NaN when scores were not tracked).
    pub score: f32,
    /// One value per sort field.
    pub fields: Vec<SortValue>,
}

/// Result of a sorted search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFieldDocs {
    /// Number of matching documents.
    pub total_hits: usize,
    /// Hits in sort order.
    pub field_docs: Vec<FieldDoc>,
    /// The sort that ordered the hits.
    pub sort_fields: Vec<SortField>,
    /// Best score seen, or NaN.
    pub max_score: f32,
}

impl TopFieldDocs {
    /// Document ids of the hits, in rank order.
    pub fn doc_ids(&self) -> Vec<DocId> {
        self.field_docs.iter().map(|fd| fd.doc).collect()
    }
}

/// Heap entry ordered so that the *worst* hit is the greatest.
///
/// Worse means lower score; at equal score the higher document id is worse,
/// so lower ids win ties.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HitEntry(pub ScoreDoc);

impl HitEntry {
    /// Whether a candidate beats this entry.
    pub(crate) fn is_beaten_by(&self, doc: DocId, score: f32) -> bool {
        score > self.0.score || (score == self.0.score && doc < self.0.doc)
    }
}

impl PartialEq for HitEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HitEntry {}

impl PartialOrd for HitEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HitEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .score
            .total_cmp(&self.0.score)
            .then_with(|| self.0.doc.cmp(&other.0.doc))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    #[test]
    fn test_heap_top_is_worst_hit() {
        let mut heap = BinaryHeap::new();
        heap.push(HitEntry(ScoreDoc::new(1, 2.0)));
        heap.push(HitEntry(ScoreDoc::new(2, 1.0)));
        heap.push(HitEntry(ScoreDoc::new(3, 1.0)));
        heap.push(HitEntry(ScoreDoc::new(4, 3.0)));

        let worst = heap.peek().unwrap();
        assert_eq!(worst.0.doc, 3);
        assert!(worst.is_beaten_by(0, 1.0));
        assert!(!worst.is_beaten_by(5, 1.0));
        assert!(worst.is_beaten_by(9, 1.5));
    }

    #[test]
    fn test_empty_top_docs() {
        let docs = TopDocs::empty();
        assert_eq!(docs.total_hits, 0);
        assert!(docs.max_score.is_nan());
        assert!(docs.doc_ids().is_empty());
    }
}
