//! A reader that stitches several segments into one id space.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::index::reader::{IndexReader, PostingIterator, TermStats, next_reader_id, sub_index};
use crate::index::{DocId, NO_MORE_DOCS, NOT_STARTED, Term};
use crate::search::doc_id_set::DocIdSetIterator;

/// Composite of segment readers; segment `i` owns ids
/// `starts[i]..starts[i] + max_doc(i)`.
#[derive(Debug)]
pub struct MultiReader {
    id: u64,
    readers: Vec<Arc<dyn IndexReader>>,
    starts: Vec<DocId>,
    max_doc: DocId,
}

impl MultiReader {
    /// Combine segments in the given order.
    pub fn new(readers: Vec<Arc<dyn IndexReader>>) -> Self {
        let mut starts = Vec::with_capacity(readers.len());
        let mut max_doc = 0;
        for reader in &readers {
            starts.push(max_doc);
            max_doc += reader.max_doc();
        }
        MultiReader {
            id: next_reader_id(),
            readers,
            starts,
            max_doc,
        }
    }

    /// First id of each segment.
    pub fn starts(&self) -> &[DocId] {
        &self.starts
    }

    fn locate(&self, doc: DocId) -> Option<(usize, DocId)> {
        if doc < 0 || doc >= self.max_doc || self.readers.is_empty() {
            return None;
        }
        let idx = sub_index(doc, &self.starts);
        Some((idx, doc - self.starts[idx]))
    }
}

impl IndexReader for MultiReader {
    fn reader_id(&self) -> u64 {
        self.id
    }

    fn max_doc(&self) -> DocId {
        self.max_doc
    }

    fn num_docs(&self) -> DocId {
        self.readers.iter().map(|r| r.num_docs()).sum()
    }

    fn is_deleted(&self, doc: DocId) -> bool {
        self.locate(doc)
            .is_some_and(|(idx, local)| self.readers[idx].is_deleted(local))
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        let mut total = 0;
        for reader in &self.readers {
            total += reader.doc_freq(term)?;
        }
        Ok(total)
    }

    fn term_docs(&self, term: &Term) -> Result<Option<Box<dyn PostingIterator>>> {
        let mut parts = Vec::new();
        for (reader, start) in self.readers.iter().zip(&self.starts) {
            if let Some(postings) = reader.term_docs(term)? {
                parts.push((postings, *start));
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(MultiPostings::new(parts))))
    }

    fn terms<'a>(
        &'a self,
        field: &str,
        from: &str,
    ) -> Result<Box<dyn Iterator<Item = TermStats> + 'a>> {
        let mut merged: BTreeMap<Term, u32> = BTreeMap::new();
        for reader in &self.readers {
            for stats in reader.terms(field, from)? {
                *merged.entry(stats.term).or_insert(0) += stats.doc_freq;
            }
        }
        Ok(Box::new(
            merged
                .into_iter()
                .map(|(term, doc_freq)| TermStats { term, doc_freq }),
        ))
    }

    fn norms(&self, field: &str) -> Option<Arc<Vec<u8>>> {
        let parts: Vec<_> = self.readers.iter().map(|r| r.norms(field)).collect();
        if parts.iter().all(Option::is_none) {
            return None;
        }
        let default_norm = crate::search::similarity::encode_norm(1.0);
        let mut bytes = Vec::with_capacity(self.max_doc as usize);
        for (reader, part) in self.readers.iter().zip(parts) {
            match part {
                Some(norms) => bytes.extend_from_slice(&norms),
                None => bytes.extend(std::iter::repeat_n(default_norm, reader.max_doc() as usize)),
            }
        }
        Some(Arc::new(bytes))
    }

    fn sub_readers(&self) -> Vec<Arc<dyn IndexReader>> {
        self.readers.clone()
    }
}

/// Postings of one term across segments, rebased into the composite id space.
#[derive(Debug)]
pub struct MultiPostings {
    parts: Vec<(Box<dyn PostingIterator>, DocId)>,
    current: usize,
    doc: DocId,
}

impl MultiPostings {
    fn new(parts: Vec<(Box<dyn PostingIterator>, DocId)>) -> Self {
        MultiPostings {
            parts,
            current: 0,
            doc: NOT_STARTED,
        }
    }

    /// Walk forward through segments until one yields a document.
    fn settle(&mut self, mut local: DocId) -> Result<DocId> {
        loop {
            if local != NO_MORE_DOCS {
                self.doc = self.parts[self.current].1 + local;
                return Ok(self.doc);
            }
            self.current += 1;
            if self.current >= self.parts.len() {
                self.doc = NO_MORE_DOCS;
                return Ok(self.doc);
            }
            local = self.parts[self.current].0.next()?;
        }
    }
}

impl DocIdSetIterator for MultiPostings {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let local = self.parts[self.current].0.next()?;
        self.settle(local)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        // Skip whole segments that end before the target.
        while self.current + 1 < self.parts.len() && self.parts[self.current + 1].1 <= target {
            self.current += 1;
        }
        let (postings, base) = &mut self.parts[self.current];
        let local_target = (target - *base).max(postings.doc_id() + 1).max(0);
        let local = postings.advance(local_target)?;
        self.settle(local)
    }
}

impl PostingIterator for MultiPostings {
    fn freq(&self) -> u32 {
        self.parts.get(self.current).map_or(0, |(p, _)| p.freq())
    }

    fn next_position(&mut self) -> Result<i32> {
        match self.parts.get_mut(self.current) {
            Some((postings, _)) => postings.next_position(),
            None => Err(crate::error::TesseraError::illegal_state(
                "positions requested from exhausted postings",
            )),
        }
    }
}
