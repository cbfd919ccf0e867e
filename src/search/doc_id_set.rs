//! Document id cursors and the sets they walk.

use std::fmt::Debug;
use std::sync::Arc;

use bit_vec::BitVec;

use crate::error::Result;
use crate::index::{DocId, NO_MORE_DOCS, NOT_STARTED};

/// Monotonic cursor over document ids.
///
/// Before the first call to [`next`](Self::next) or [`advance`](Self::advance)
/// [`doc_id`](Self::doc_id) reports `NOT_STARTED`; once exhausted every call
/// keeps returning [`NO_MORE_DOCS`].
pub trait DocIdSetIterator: Send + Debug {
    /// Current document id.
    fn doc_id(&self) -> DocId;

    /// Move to the next document strictly after the current one.
    fn next(&mut self) -> Result<DocId>;

    /// Move to the first document >= `target` that lies after the current
    /// one. Callers only pass targets greater than the current id.
    fn advance(&mut self, target: DocId) -> Result<DocId>;
}

/// An iterator over no documents.
#[derive(Debug)]
pub struct EmptyDocIdSetIterator {
    doc: DocId,
}

impl Default for EmptyDocIdSetIterator {
    fn default() -> Self {
        Self::new()
    }
}

impl EmptyDocIdSetIterator {
    /// Create a new empty iterator.
    pub fn new() -> Self {
        EmptyDocIdSetIterator { doc: NOT_STARTED }
    }
}

impl DocIdSetIterator for EmptyDocIdSetIterator {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        self.doc = NO_MORE_DOCS;
        Ok(self.doc)
    }

    fn advance(&mut self, _target: DocId) -> Result<DocId> {
        self.doc = NO_MORE_DOCS;
        Ok(self.doc)
    }
}

/// Iterator over a sorted, deduplicated id list.
#[derive(Debug)]
pub struct SortedDocIdSetIterator {
    docs: Arc<Vec<DocId>>,
    /// Index of the current document; `None` before start.
    cursor: Option<usize>,
    doc: DocId,
}

impl SortedDocIdSetIterator {
    /// Create an iterator over `docs`, which must be strictly increasing.
    pub fn new(docs: Arc<Vec<DocId>>) -> Self {
        SortedDocIdSetIterator {
            docs,
            cursor: None,
            doc: NOT_STARTED,
        }
    }

    fn settle(&mut self, idx: usize) -> DocId {
        self.cursor = Some(idx);
        self.doc = self.docs.get(idx).copied().unwrap_or(NO_MORE_DOCS);
        self.doc
    }
}

impl DocIdSetIterator for SortedDocIdSetIterator {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let idx = self.cursor.map_or(0, |c| c + 1);
        Ok(self.settle(idx))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let start = self.cursor.map_or(0, |c| c + 1);
        let offset = self.docs[start.min(self.docs.len())..].partition_point(|&d| d < target);
        Ok(self.settle(start + offset))
    }
}

/// Iterator over the set bits of a bit vector.
#[derive(Debug)]
pub struct BitsDocIdSetIterator {
    bits: Arc<BitVec>,
    doc: DocId,
}

impl BitsDocIdSetIterator {
    /// Create an iterator over `bits`.
    pub fn new(bits: Arc<BitVec>) -> Self {
        BitsDocIdSetIterator {
            bits,
            doc: NOT_STARTED,
        }
    }

    fn scan_from(&mut self, start: usize) -> DocId {
        let found = (start..self.bits.len()).find(|&i| self.bits.get(i).unwrap_or(false));
        self.doc = found.map_or(NO_MORE_DOCS, |i| i as DocId);
        self.doc
    }
}

impl DocIdSetIterator for BitsDocIdSetIterator {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let start = (self.doc + 1) as usize;
        Ok(self.scan_from(start))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let start = target.max(self.doc + 1).max(0) as usize;
        Ok(self.scan_from(start))
    }
}

/// A set of document ids, as produced by filters.
#[derive(Debug, Clone)]
pub enum DocIdSet {
    /// No documents.
    Empty,
    /// Strictly increasing ids.
    Sorted(Arc<Vec<DocId>>),
    /// One bit per document of the reader.
    Bits(Arc<BitVec>),
}

impl DocIdSet {
    /// Build a set from a bit vector, collapsing to `Empty` when no bit is set.
    pub fn from_bits(bits: BitVec) -> Self {
        if bits.none() {
            DocIdSet::Empty
        } else {
            DocIdSet::Bits(Arc::new(bits))
        }
    }

    /// Build a set from arbitrary ids.
    pub fn from_docs(mut docs: Vec<DocId>) -> Self {
        docs.sort_unstable();
        docs.dedup();
        if docs.is_empty() {
            DocIdSet::Empty
        } else {
            DocIdSet::Sorted(Arc::new(docs))
        }
    }

    /// A fresh cursor over the set.
    pub fn iterator(&self) -> Box<dyn DocIdSetIterator> {
        match self {
            DocIdSet::Empty => Box::new(EmptyDocIdSetIterator::new()),
            DocIdSet::Sorted(docs) => Box::new(SortedDocIdSetIterator::new(Arc::clone(docs))),
            DocIdSet::Bits(bits) => Box::new(BitsDocIdSetIterator::new(Arc::clone(bits))),
        }
    }

    /// Whether `doc` belongs to the set.
    pub fn contains(&self, doc: DocId) -> bool {
        if doc < 0 {
            return false;
        }
        match self {
            DocIdSet::Empty => false,
            DocIdSet::Sorted(docs) => docs.binary_search(&doc).is_ok(),
            DocIdSet::Bits(bits) => bits.get(doc as usize).unwrap_or(false),
        }
    }

    /// Whether the set has no documents.
    pub fn is_empty(&self) -> bool {
        match self {
            DocIdSet::Empty => true,
            DocIdSet::Sorted(docs) => docs.is_empty(),
            DocIdSet::Bits(bits) => bits.none(),
        }
    }
}

/// Drain an iterator into a vector; handy for tests and materializing filters.
pub fn collect_docs(iter: &mut dyn DocIdSetIterator) -> Result<Vec<DocId>> {
    let mut docs = Vec::new();
    let mut doc = iter.next()?;
    while doc != NO_MORE_DOCS {
        docs.push(doc);
        doc = iter.next()?;
    }
    Ok(docs)
}
