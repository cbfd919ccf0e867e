//! The reader contract the query core consumes.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::index::{DocId, Term};
use crate::search::doc_id_set::DocIdSetIterator;

/// Cursor over one term's postings: documents in increasing id order, each
/// with a frequency and that many positions.
pub trait PostingIterator: DocIdSetIterator {
    /// Number of occurrences of the term in the current document.
    fn freq(&self) -> u32;

    /// Next position within the current document.
    ///
    /// Must be called at most [`freq`](PostingIterator::freq) times per
    /// document; positions come back in increasing order.
    fn next_position(&mut self) -> Result<i32>;
}

/// A term together with the number of documents containing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermStats {
    /// The term.
    pub term: Term,
    /// Number of documents containing the term, deleted ones included.
    pub doc_freq: u32,
}

/// Read-only view of an index (or one segment of it).
pub trait IndexReader: Send + Sync + Debug {
    /// Identity used to key per-reader caches.
    fn reader_id(&self) -> u64;

    /// One greater than the largest document id.
    fn max_doc(&self) -> DocId;

    /// Number of live (non-deleted) documents.
    fn num_docs(&self) -> DocId;

    /// Whether the document has been deleted.
    fn is_deleted(&self, doc: DocId) -> bool;

    /// Whether any document has been deleted.
    fn has_deletions(&self) -> bool {
        self.num_docs() < self.max_doc()
    }

    /// Number of documents containing the term.
    fn doc_freq(&self, term: &Term) -> Result<u32>;

    /// Postings for the term, skipping deleted documents, or None if the
    /// term does not occur.
    fn term_docs(&self, term: &Term) -> Result<Option<Box<dyn PostingIterator>>>;

    /// Terms of `field` in order, starting at the first term >= `from`.
    fn terms<'a>(
        &'a self,
        field: &str,
        from: &str,
    ) -> Result<Box<dyn Iterator<Item = TermStats> + 'a>>;

    /// Encoded norm bytes of a field, one per document, if recorded.
    fn norms(&self, field: &str) -> Option<Arc<Vec<u8>>>;

    /// The segments making up this reader; empty for a leaf segment.
    fn sub_readers(&self) -> Vec<Arc<dyn IndexReader>> {
        Vec::new()
    }
}

static NEXT_READER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique reader identity.
pub fn next_reader_id() -> u64 {
    NEXT_READER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Leaf readers of `reader`, each with the id base its documents start at.
pub fn leaves(reader: &Arc<dyn IndexReader>) -> Vec<(Arc<dyn IndexReader>, DocId)> {
    let subs = reader.sub_readers();
    if subs.is_empty() {
        return vec![(Arc::clone(reader), 0)];
    }

    let mut result = Vec::with_capacity(subs.len());
    let mut base = 0;
    for sub in subs {
        for (leaf, leaf_base) in leaves(&sub) {
            result.push((leaf, base + leaf_base));
        }
        base += sub.max_doc();
    }
    result
}

/// Index of the leaf whose id range contains `doc`, given ascending starts.
pub fn sub_index(doc: DocId, starts: &[DocId]) -> usize {
    match starts.binary_search(&doc) {
        Ok(mut idx) => {
            // Empty segments share a start with their successor.
            while idx + 1 < starts.len() && starts[idx + 1] == doc {
                idx += 1;
            }
            idx
        }
        Err(idx) => idx.saturating_sub(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_index() {
        let starts = [0, 10, 10, 25];
        assert_eq!(sub_index(0, &starts), 0);
        assert_eq!(sub_index(9, &starts), 0);
        assert_eq!(sub_index(10, &starts), 2);
        assert_eq!(sub_index(24, &starts), 2);
        assert_eq!(sub_index(30, &starts), 3);
    }
}
