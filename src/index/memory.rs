//! An in-memory, single-segment index.
//!
//! [`MemoryIndexBuilder`] inverts [`Document`]s into per-term posting lists
//! with positions and computes one norm byte per (field, document). The
//! finished [`MemoryIndex`] is immutable and cheap to share behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ahash::AHashMap;
use bit_vec::BitVec;
use log::debug;

use crate::error::{Result, TesseraError};
use crate::index::document::Document;
use crate::index::reader::{IndexReader, PostingIterator, TermStats, next_reader_id};
use crate::index::{DocId, NO_MORE_DOCS, NOT_STARTED, Term};
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::similarity::{DefaultSimilarity, FieldInvertState, Similarity, encode_norm};

/// One document's occurrences of a term.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Document ID.
    pub doc_id: DocId,
    /// Positions of the term in the document, ascending.
    pub positions: Vec<i32>,
}

impl Posting {
    /// Create a posting with its first position.
    pub fn new(doc_id: DocId, position: i32) -> Self {
        Posting {
            doc_id,
            positions: vec![position],
        }
    }

    /// Get the term frequency.
    pub fn frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Builds a [`MemoryIndex`] one document at a time.
#[derive(Debug)]
pub struct MemoryIndexBuilder {
    similarity: Arc<dyn Similarity>,
    postings: BTreeMap<Term, Vec<Posting>>,
    /// Per field: (doc, norm value before encoding).
    norm_values: AHashMap<String, Vec<(DocId, f32)>>,
    omit_norms: BTreeSet<String>,
    deleted: Vec<DocId>,
    next_doc: DocId,
}

impl Default for MemoryIndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexBuilder {
    /// Create a builder computing norms with [`DefaultSimilarity`].
    pub fn new() -> Self {
        Self::with_similarity(Arc::new(DefaultSimilarity))
    }

    /// Create a builder computing norms with the given similarity.
    pub fn with_similarity(similarity: Arc<dyn Similarity>) -> Self {
        MemoryIndexBuilder {
            similarity,
            postings: BTreeMap::new(),
            norm_values: AHashMap::new(),
            omit_norms: BTreeSet::new(),
            deleted: Vec::new(),
            next_doc: 0,
        }
    }

    /// Invert a document and return the id it was assigned.
    pub fn add_document(&mut self, document: Document) -> DocId {
        let doc_id = self.next_doc;
        self.next_doc += 1;

        // Same-named fields share one position stream and one norm.
        let mut states: BTreeMap<&str, FieldInvertState> = BTreeMap::new();
        for field in document.fields() {
            if field.omits_norms() {
                self.omit_norms.insert(field.name().to_string());
            }
            let state = states
                .entry(field.name())
                .or_insert_with(|| FieldInvertState::new(document.boost()));
            state.boost *= field.boost();

            for token in field.tokens() {
                let position = state.length as i32;
                state.length += 1;

                let list = self.postings.entry(Term::new(field.name(), token)).or_default();
                match list.last_mut() {
                    Some(last) if last.doc_id == doc_id => last.positions.push(position),
                    _ => list.push(Posting::new(doc_id, position)),
                }
            }
        }

        for (name, state) in states {
            let norm = self.similarity.compute_norm(name, &state);
            self.norm_values
                .entry(name.to_string())
                .or_default()
                .push((doc_id, norm));
        }

        doc_id
    }

    /// Add several documents.
    pub fn add_documents<I>(&mut self, documents: I) -> Vec<DocId>
    where
        I: IntoIterator<Item = Document>,
    {
        documents
            .into_iter()
            .map(|doc| self.add_document(doc))
            .collect()
    }

    /// Mark a document as deleted.
    pub fn delete_document(&mut self, doc_id: DocId) -> Result<()> {
        if doc_id < 0 || doc_id >= self.next_doc {
            return Err(TesseraError::invalid_argument(format!(
                "doc {doc_id} is out of range [0, {})",
                self.next_doc
            )));
        }
        self.deleted.push(doc_id);
        Ok(())
    }

    /// Freeze the builder into a searchable segment.
    pub fn build(self) -> MemoryIndex {
        let max_doc = self.next_doc;
        let default_norm = encode_norm(1.0);

        let mut norms = AHashMap::new();
        for (field, values) in self.norm_values {
            if self.omit_norms.contains(&field) {
                continue;
            }
            let mut bytes = vec![default_norm; max_doc as usize];
            for (doc, value) in values {
                bytes[doc as usize] = self.similarity.encode_norm(value);
            }
            norms.insert(field, Arc::new(bytes));
        }

        let deleted = if self.deleted.is_empty() {
            None
        } else {
            let mut bits = BitVec::from_elem(max_doc as usize, false);
            for doc in &self.deleted {
                bits.set(*doc as usize, true);
            }
            Some(Arc::new(bits))
        };
        let num_deleted = deleted
            .as_ref()
            .map_or(0, |bits| bits.iter().filter(|b| *b).count() as DocId);

        let postings = self
            .postings
            .into_iter()
            .map(|(term, list)| (term, Arc::new(list)))
            .collect::<BTreeMap<_, _>>();

        debug!(
            "built memory index: {} docs, {} deleted, {} terms",
            max_doc,
            num_deleted,
            postings.len()
        );

        MemoryIndex {
            id: next_reader_id(),
            max_doc,
            num_deleted,
            postings,
            norms,
            deleted,
        }
    }
}

/// An immutable in-memory segment.
#[derive(Debug)]
pub struct MemoryIndex {
    id: u64,
    max_doc: DocId,
    num_deleted: DocId,
    postings: BTreeMap<Term, Arc<Vec<Posting>>>,
    norms: AHashMap<String, Arc<Vec<u8>>>,
    deleted: Option<Arc<BitVec>>,
}

impl MemoryIndex {
    /// Build a segment from documents in one call.
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        let mut builder = MemoryIndexBuilder::new();
        builder.add_documents(documents);
        builder.build()
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }
}

impl IndexReader for MemoryIndex {
    fn reader_id(&self) -> u64 {
        self.id
    }

    fn max_doc(&self) -> DocId {
        self.max_doc
    }

    fn num_docs(&self) -> DocId {
        self.max_doc - self.num_deleted
    }

    fn is_deleted(&self, doc: DocId) -> bool {
        match &self.deleted {
            Some(bits) => doc >= 0 && bits.get(doc as usize).unwrap_or(false),
            None => false,
        }
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        Ok(self.postings.get(term).map_or(0, |list| list.len() as u32))
    }

    fn term_docs(&self, term: &Term) -> Result<Option<Box<dyn PostingIterator>>> {
        Ok(self.postings.get(term).map(|list| {
            Box::new(MemoryPostings::new(Arc::clone(list), self.deleted.clone()))
                as Box<dyn PostingIterator>
        }))
    }

    fn terms<'a>(
        &'a self,
        field: &str,
        from: &str,
    ) -> Result<Box<dyn Iterator<Item = TermStats> + 'a>> {
        let field = field.to_string();
        let start = Term::new(field.clone(), from);
        Ok(Box::new(
            self.postings
                .range(start..)
                .take_while(move |(term, _)| term.field() == field)
                .map(|(term, list)| TermStats {
                    term: term.clone(),
                    doc_freq: list.len() as u32,
                }),
        ))
    }

    fn norms(&self, field: &str) -> Option<Arc<Vec<u8>>> {
        self.norms.get(field).cloned()
    }
}

/// Cursor over a [`MemoryIndex`] posting list.
#[derive(Debug)]
pub struct MemoryPostings {
    postings: Arc<Vec<Posting>>,
    deleted: Option<Arc<BitVec>>,
    /// Index of the current posting; `None` before start.
    cursor: Option<usize>,
    doc: DocId,
    next_position: usize,
}

impl MemoryPostings {
    /// Create a cursor over `postings`, hiding documents set in `deleted`.
    pub fn new(postings: Arc<Vec<Posting>>, deleted: Option<Arc<BitVec>>) -> Self {
        MemoryPostings {
            postings,
            deleted,
            cursor: None,
            doc: NOT_STARTED,
            next_position: 0,
        }
    }

    fn is_deleted(&self, doc: DocId) -> bool {
        self.deleted
            .as_ref()
            .is_some_and(|bits| bits.get(doc as usize).unwrap_or(false))
    }

    /// Settle on the first live posting at or after `idx`.
    fn settle(&mut self, mut idx: usize) -> DocId {
        while idx < self.postings.len() && self.is_deleted(self.postings[idx].doc_id) {
            idx += 1;
        }
        self.cursor = Some(idx);
        self.next_position = 0;
        self.doc = self
            .postings
            .get(idx)
            .map_or(NO_MORE_DOCS, |posting| posting.doc_id);
        self.doc
    }

    fn current(&self) -> Option<&Posting> {
        self.cursor.and_then(|idx| self.postings.get(idx))
    }
}

impl DocIdSetIterator for MemoryPostings {
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
        let start = self.cursor.map_or(0, |c| c + 1).min(self.postings.len());
        let offset = self.postings[start..].partition_point(|p| p.doc_id < target);
        Ok(self.settle(start + offset))
    }
}

impl PostingIterator for MemoryPostings {
    fn freq(&self) -> u32 {
        self.current().map_or(0, Posting::frequency)
    }

    fn next_position(&mut self) -> Result<i32> {
        let idx = self.next_position;
        let position = self
            .current()
            .and_then(|posting| posting.positions.get(idx).copied())
            .ok_or_else(|| {
                TesseraError::illegal_state(format!(
                    "position {idx} requested past the frequency of doc {}",
                    self.doc
                ))
            })?;
        self.next_position += 1;
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::similarity::decode_norm;

    fn sample_index() -> MemoryIndex {
        MemoryIndex::from_documents(vec![
            Document::new().add_text("body", "the quick brown fox"),
            Document::new().add_text("body", "the lazy dog"),
            Document::new().add_text("body", "quick quick fox"),
        ])
    }

    #[test]
    fn test_doc_freq_and_postings() {
        let index = sample_index();
        assert_eq!(index.max_doc(), 3);
        assert_eq!(index.doc_freq(&Term::new("body", "quick")).unwrap(), 2);
        assert_eq!(index.doc_freq(&Term::new("body", "missing")).unwrap(), 0);

        let mut postings = index
            .term_docs(&Term::new("body", "quick"))
            .unwrap()
            .unwrap();
        assert_eq!(postings.next().unwrap(), 0);
        assert_eq!(postings.freq(), 1);
        assert_eq!(postings.next_position().unwrap(), 1);
        assert_eq!(postings.next().unwrap(), 2);
        assert_eq!(postings.freq(), 2);
        assert_eq!(postings.next_position().unwrap(), 0);
        assert_eq!(postings.next_position().unwrap(), 1);
        assert!(postings.next_position().is_err());
        assert_eq!(postings.next().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_advance_skips() {
        let index = sample_index();
        let mut postings = index.term_docs(&Term::new("body", "the")).unwrap().unwrap();
        assert_eq!(postings.advance(1).unwrap(), 1);
        assert_eq!(postings.advance(2).unwrap(), NO_MORE_DOCS);
        assert_eq!(postings.next().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_terms_enumeration() {
        let index = sample_index();
        let terms: Vec<String> = index
            .terms("body", "l")
            .unwrap()
            .map(|stats| stats.term.text().to_string())
            .collect();
        assert_eq!(terms, vec!["lazy", "quick", "the"]);
        assert_eq!(index.terms("title", "").unwrap().count(), 0);
    }

    #[test]
    fn test_norms() {
        let index = sample_index();
        let norms = index.norms("body").unwrap();
        // Four tokens: 1/sqrt(4) = 0.5, which the byte encoding keeps exactly.
        assert_eq!(decode_norm(norms[0]), 0.5);
        assert!(index.norms("title").is_none());
    }

    #[test]
    fn test_deletions_hidden_from_postings() {
        let mut builder = MemoryIndexBuilder::new();
        builder.add_documents(vec![
            Document::new().add_text("body", "apple"),
            Document::new().add_text("body", "apple"),
        ]);
        builder.delete_document(0).unwrap();
        assert!(builder.delete_document(7).is_err());
        let index = builder.build();

        assert_eq!(index.num_docs(), 1);
        assert!(index.is_deleted(0));
        assert!(index.has_deletions());
        // Document frequency still counts deleted documents.
        assert_eq!(index.doc_freq(&Term::new("body", "apple")).unwrap(), 2);

        let mut postings = index.term_docs(&Term::new("body", "apple")).unwrap().unwrap();
        assert_eq!(postings.next().unwrap(), 1);
        assert_eq!(postings.next().unwrap(), NO_MORE_DOCS);
    }
}
