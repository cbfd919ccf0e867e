//! Phrase matching over position-aware postings.
//!
//! Each phrase slot is tracked by a [`PhrasePositions`] cursor whose
//! position is the term position minus the slot's offset in the phrase, so
//! an exact match is a document where every cursor reaches the same
//! position. Sloppy matching tolerates a bounded amount of movement and
//! weights each match window by its length.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;

use crate::error::{Result, TesseraError};
use crate::index::{DocId, NO_MORE_DOCS, NOT_STARTED, PostingIterator};
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::scorer::Scorer;
use crate::search::similarity::Similarity;

/// Cursor over one phrase slot.
#[derive(Debug)]
struct PhrasePositions {
    postings: Box<dyn PostingIterator>,
    doc: DocId,
    position: i32,
    count: u32,
    offset: i32,
    repeats: bool,
}

impl PhrasePositions {
    fn new(postings: Box<dyn PostingIterator>, offset: i32) -> Self {
        PhrasePositions {
            postings,
            doc: NOT_STARTED,
            position: 0,
            count: 0,
            offset,
            repeats: false,
        }
    }

    fn next(&mut self) -> Result<bool> {
        self.doc = self.postings.next()?;
        self.position = 0;
        Ok(self.doc != NO_MORE_DOCS)
    }

    fn skip_to(&mut self, target: DocId) -> Result<bool> {
        self.doc = self.postings.advance(target)?;
        self.position = 0;
        Ok(self.doc != NO_MORE_DOCS)
    }

    fn first_position(&mut self) -> Result<()> {
        self.count = self.postings.freq();
        self.next_position()?;
        Ok(())
    }

    fn next_position(&mut self) -> Result<bool> {
        if self.count == 0 {
            return Ok(false);
        }
        self.count -= 1;
        self.position = self.postings.next_position()? - self.offset;
        Ok(true)
    }

    /// Position in the document, before the slot offset is subtracted.
    fn term_position(&self) -> i32 {
        self.position + self.offset
    }
}

/// Heap key: current position, then slot offset, then slot index.
type PositionKey = Reverse<(i32, i32, usize)>;

/// Scores documents containing a phrase, exactly or within a slop.
#[derive(Debug)]
pub struct PhraseScorer {
    pps: Vec<PhrasePositions>,
    /// Slots ordered from the one that lags furthest behind.
    order: VecDeque<usize>,
    slop: Option<u32>,
    checked_repeats: bool,
    repeats: Vec<usize>,
    similarity: Arc<dyn Similarity>,
    value: f32,
    norms: Option<Arc<Vec<u8>>>,
    freq: f32,
    first_time: bool,
    more: bool,
    doc: DocId,
}

impl PhraseScorer {
    /// Exact matching of `(postings, offset)` slots.
    pub fn exact(
        slots: Vec<(Box<dyn PostingIterator>, i32)>,
        value: f32,
        similarity: Arc<dyn Similarity>,
        norms: Option<Arc<Vec<u8>>>,
    ) -> Self {
        Self::build(slots, None, value, similarity, norms)
    }

    /// Matching with up to `slop` moves.
    pub fn sloppy(
        slots: Vec<(Box<dyn PostingIterator>, i32)>,
        slop: u32,
        value: f32,
        similarity: Arc<dyn Similarity>,
        norms: Option<Arc<Vec<u8>>>,
    ) -> Self {
        Self::build(slots, Some(slop), value, similarity, norms)
    }

    fn build(
        slots: Vec<(Box<dyn PostingIterator>, i32)>,
        slop: Option<u32>,
        value: f32,
        similarity: Arc<dyn Similarity>,
        norms: Option<Arc<Vec<u8>>>,
    ) -> Self {
        let pps: Vec<PhrasePositions> = slots
            .into_iter()
            .map(|(postings, offset)| PhrasePositions::new(postings, offset))
            .collect();
        let order = (0..pps.len()).collect();
        let more = !pps.is_empty();
        PhraseScorer {
            pps,
            order,
            slop,
            checked_repeats: false,
            repeats: Vec::new(),
            similarity,
            value,
            norms,
            freq: 0.0,
            first_time: true,
            more,
            doc: NOT_STARTED,
        }
    }

    /// Phrase frequency of the current document.
    pub fn freq(&self) -> f32 {
        self.freq
    }

    fn first(&self) -> usize {
        self.order[0]
    }

    fn last(&self) -> usize {
        self.order[self.order.len() - 1]
    }

    fn first_to_last(&mut self) {
        self.order.rotate_left(1);
    }

    fn key(&self, slot: usize) -> PositionKey {
        let pp = &self.pps[slot];
        Reverse((pp.position, pp.offset, slot))
    }

    fn sort(&mut self) {
        let pps = &self.pps;
        self.order
            .make_contiguous()
            .sort_by_key(|&i| (pps[i].doc, pps[i].position, pps[i].offset));
    }

    fn init(&mut self) -> Result<()> {
        for i in self.order.iter().copied() {
            if !self.more {
                break;
            }
            self.more = self.pps[i].next()?;
        }
        if self.more {
            self.sort();
        }
        Ok(())
    }

    /// Find the next document at or after the current cursors containing the
    /// phrase, without moving past a match.
    fn do_next(&mut self) -> Result<bool> {
        while self.more {
            while self.more && self.pps[self.first()].doc < self.pps[self.last()].doc {
                let target = self.pps[self.last()].doc;
                let first = self.first();
                self.more = self.pps[first].skip_to(target)?;
                self.first_to_last();
            }
            if self.more {
                self.freq = self.phrase_freq()?;
                if self.freq == 0.0 {
                    let last = self.last();
                    self.more = self.pps[last].next()?;
                } else {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn phrase_freq(&mut self) -> Result<f32> {
        match self.slop {
            None => self.exact_freq(),
            Some(slop) => self.sloppy_freq(slop),
        }
    }

    /// Count positions where every slot lines up.
    fn exact_freq(&mut self) -> Result<f32> {
        for i in self.order.iter().copied() {
            self.pps[i].first_position()?;
        }
        self.sort();

        let mut freq = 0u32;
        loop {
            while self.pps[self.first()].position < self.pps[self.last()].position {
                loop {
                    let first = self.first();
                    if !self.pps[first].next_position()? {
                        return Ok(freq as f32);
                    }
                    if self.pps[first].position >= self.pps[self.last()].position {
                        break;
                    }
                }
                self.first_to_last();
            }
            freq += 1;
            let last = self.last();
            if !self.pps[last].next_position()? {
                break;
            }
        }
        Ok(freq as f32)
    }

    /// Sum of `sloppy_freq(length)` over match windows no longer than the
    /// slop. Repeated terms may not share a document position.
    fn sloppy_freq(&mut self, slop: u32) -> Result<f32> {
        let Some(mut end) = self.init_phrase_positions()? else {
            return Ok(0.0);
        };
        let mut heap: BinaryHeap<PositionKey> =
            self.order.iter().map(|&i| self.key(i)).collect();

        let mut freq = 0.0;
        let mut done = false;
        while !done {
            let Some(Reverse((_, _, mut pp))) = heap.pop() else {
                break;
            };
            let mut start = self.pps[pp].position;
            let next = heap.peek().map_or(start, |Reverse(k)| k.0);
            let mut tps_differ = true;
            let mut pos = start;
            while pos <= next || !tps_differ {
                if pos <= next && tps_differ {
                    start = pos;
                }
                if !self.pps[pp].next_position()? {
                    done = true;
                    break;
                }
                let mut clash = None;
                tps_differ = !self.pps[pp].repeats || {
                    clash = self.term_positions_differ(pp);
                    clash.is_none()
                };
                if let Some(other) = clash {
                    if other != pp {
                        pp = self.flip(&mut heap, pp, other);
                    }
                }
                pos = self.pps[pp].position;
            }

            let match_length = end - start;
            if match_length <= slop as i32 {
                freq += self.similarity.sloppy_freq(match_length);
            }
            end = end.max(self.pps[pp].position);
            heap.push(self.key(pp));
        }
        Ok(freq)
    }

    /// Put every slot on its first position and, for repeated terms, move
    /// the later slots until no two share a position. None when a slot runs
    /// out while doing so.
    fn init_phrase_positions(&mut self) -> Result<Option<i32>> {
        for i in self.order.iter().copied() {
            self.pps[i].first_position()?;
        }

        if !self.checked_repeats {
            self.checked_repeats = true;
            let slots: Vec<usize> = self.order.iter().copied().collect();
            for (n, &a) in slots.iter().enumerate() {
                for &b in &slots[n + 1..] {
                    if self.pps[a].term_position() == self.pps[b].term_position() {
                        self.pps[a].repeats = true;
                        self.pps[b].repeats = true;
                        for slot in [a, b] {
                            if !self.repeats.contains(&slot) {
                                self.repeats.push(slot);
                            }
                        }
                    }
                }
            }
        }

        for n in 0..self.repeats.len() {
            let slot = self.repeats[n];
            while let Some(other) = self.term_positions_differ(slot) {
                if !self.pps[other].next_position()? {
                    return Ok(None);
                }
            }
        }

        let end = self
            .order
            .iter()
            .map(|&i| self.pps[i].position)
            .fold(0, i32::max);
        Ok(Some(end))
    }

    /// The higher-offset slot of the first repeat sharing `slot`'s document
    /// position, if any.
    fn term_positions_differ(&self, slot: usize) -> Option<usize> {
        let tp = self.pps[slot].term_position();
        self.repeats
            .iter()
            .copied()
            .filter(|&other| other != slot)
            .find(|&other| self.pps[other].term_position() == tp)
            .map(|other| {
                if self.pps[slot].offset > self.pps[other].offset {
                    slot
                } else {
                    other
                }
            })
    }

    /// Swap `pp` (outside the heap) with `other` (inside it).
    fn flip(&self, heap: &mut BinaryHeap<PositionKey>, pp: usize, other: usize) -> usize {
        let mut held = Vec::new();
        while let Some(Reverse(key)) = heap.pop() {
            if key.2 == other {
                break;
            }
            held.push(Reverse(key));
        }
        heap.extend(held);
        heap.push(self.key(pp));
        other
    }
}

impl DocIdSetIterator for PhraseScorer {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        if self.first_time {
            self.init()?;
            self.first_time = false;
        } else if self.more {
            let last = self.last();
            self.more = self.pps[last].next()?;
        }
        self.doc = if self.do_next()? {
            self.pps[self.first()].doc
        } else {
            NO_MORE_DOCS
        };
        Ok(self.doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.first_time = false;
        for i in self.order.iter().copied() {
            if !self.more {
                break;
            }
            self.more = self.pps[i].skip_to(target)?;
        }
        if self.more {
            self.sort();
        }
        self.doc = if self.do_next()? {
            self.pps[self.first()].doc
        } else {
            NO_MORE_DOCS
        };
        Ok(self.doc)
    }
}

impl Scorer for PhraseScorer {
    fn score(&mut self) -> Result<f32> {
        let raw = self.similarity.tf(self.freq) * self.value;
        Ok(
            match self.norms.as_ref().and_then(|n| n.get(self.doc as usize)) {
                Some(&b) => raw * self.similarity.decode_norm(b),
                None => raw,
            },
        )
    }
}

/// Postings of several terms merged into one stream: a document appears if
/// any term occurs in it, with the union of their positions.
#[derive(Debug)]
pub struct UnionPostings {
    subs: Vec<Box<dyn PostingIterator>>,
    heap: BinaryHeap<Reverse<(DocId, usize)>>,
    positions: Vec<i32>,
    cursor: usize,
    doc: DocId,
}

impl UnionPostings {
    /// Merge the given postings; None when none of them has a document.
    pub fn new(subs: Vec<Box<dyn PostingIterator>>) -> Result<Option<Self>> {
        let mut union = UnionPostings {
            heap: BinaryHeap::with_capacity(subs.len()),
            subs,
            positions: Vec::new(),
            cursor: 0,
            doc: NOT_STARTED,
        };
        for i in 0..union.subs.len() {
            let doc = union.subs[i].next()?;
            if doc != NO_MORE_DOCS {
                union.heap.push(Reverse((doc, i)));
            }
        }
        Ok((!union.heap.is_empty()).then_some(union))
    }
}

impl DocIdSetIterator for UnionPostings {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        let Some(&Reverse((doc, _))) = self.heap.peek() else {
            self.doc = NO_MORE_DOCS;
            return Ok(self.doc);
        };
        self.doc = doc;
        self.positions.clear();
        self.cursor = 0;
        while let Some(&Reverse((sub_doc, i))) = self.heap.peek() {
            if sub_doc != doc {
                break;
            }
            self.heap.pop();
            let sub = &mut self.subs[i];
            for _ in 0..sub.freq() {
                self.positions.push(sub.next_position()?);
            }
            let next = sub.next()?;
            if next != NO_MORE_DOCS {
                self.heap.push(Reverse((next, i)));
            }
        }
        self.positions.sort_unstable();
        Ok(self.doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        while let Some(&Reverse((sub_doc, i))) = self.heap.peek() {
            if sub_doc >= target {
                break;
            }
            self.heap.pop();
            let next = self.subs[i].advance(target)?;
            if next != NO_MORE_DOCS {
                self.heap.push(Reverse((next, i)));
            }
        }
        self.next()
    }
}

impl PostingIterator for UnionPostings {
    fn freq(&self) -> u32 {
        self.positions.len() as u32
    }

    fn next_position(&mut self) -> Result<i32> {
        let position = self
            .positions
            .get(self.cursor)
            .copied()
            .ok_or_else(|| TesseraError::illegal_state("read past the last position"))?;
        self.cursor += 1;
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, IndexReader, MemoryIndex, Term};
    use crate::search::similarity::DefaultSimilarity;

    fn index(texts: &[&str]) -> MemoryIndex {
        MemoryIndex::from_documents(texts.iter().map(|t| Document::new().add_text("f", *t)))
    }

    fn slots(reader: &MemoryIndex, terms: &[(&str, i32)]) -> Vec<(Box<dyn PostingIterator>, i32)> {
        terms
            .iter()
            .map(|(text, offset)| {
                let postings = reader.term_docs(&Term::new("f", *text)).unwrap().unwrap();
                (postings, *offset)
            })
            .collect()
    }

    fn matches(mut scorer: PhraseScorer) -> Vec<(DocId, f32)> {
        let mut out = Vec::new();
        while scorer.next().unwrap() != NO_MORE_DOCS {
            out.push((scorer.doc_id(), scorer.freq()));
        }
        out
    }

    #[test]
    fn test_exact_phrase_frequency() {
        let reader = index(&[
            "quick brown fox",
            "brown quick fox",
            "quick brown quick brown",
            "quick fox",
        ]);
        let scorer = PhraseScorer::exact(
            slots(&reader, &[("quick", 0), ("brown", 1)]),
            1.0,
            Arc::new(DefaultSimilarity),
            None,
        );
        assert_eq!(matches(scorer), vec![(0, 1.0), (2, 2.0)]);
    }

    #[test]
    fn test_sloppy_phrase_tolerates_moves() {
        let reader = index(&["quick brown fox", "quick red fox", "fox quick", "quick a b c fox"]);
        let sim = DefaultSimilarity;
        let scorer = PhraseScorer::sloppy(
            slots(&reader, &[("quick", 0), ("fox", 1)]),
            2,
            1.0,
            Arc::new(sim),
            None,
        );
        let found = matches(scorer);
        let docs: Vec<DocId> = found.iter().map(|h| h.0).collect();
        // "fox quick" needs two moves; "quick a b c fox" needs three.
        assert_eq!(docs, vec![0, 1, 2]);
        assert_eq!(found[0].1, sim.sloppy_freq(1));
        assert_eq!(found[2].1, sim.sloppy_freq(2));
    }

    #[test]
    fn test_sloppy_repeated_terms_need_distinct_positions() {
        let reader = index(&["a b", "a b a"]);
        let scorer = PhraseScorer::sloppy(
            slots(&reader, &[("a", 0), ("b", 1), ("a", 2)]),
            4,
            1.0,
            Arc::new(DefaultSimilarity),
            None,
        );
        let docs: Vec<DocId> = matches(scorer).into_iter().map(|h| h.0).collect();
        assert_eq!(docs, vec![1]);
    }

    #[test]
    fn test_advance_lands_on_next_match() {
        let reader = index(&["a b", "b a", "x", "a b", "a b"]);
        let mut scorer = PhraseScorer::exact(
            slots(&reader, &[("a", 0), ("b", 1)]),
            1.0,
            Arc::new(DefaultSimilarity),
            None,
        );
        assert_eq!(scorer.advance(1).unwrap(), 3);
        assert_eq!(scorer.next().unwrap(), 4);
        assert_eq!(scorer.next().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_union_postings_merge_positions() {
        let reader = index(&["cat dog", "dog", "bird cat", "fish"]);
        let subs = vec![
            reader.term_docs(&Term::new("f", "cat")).unwrap().unwrap(),
            reader.term_docs(&Term::new("f", "dog")).unwrap().unwrap(),
        ];
        let mut union = UnionPostings::new(subs).unwrap().unwrap();
        assert_eq!(union.next().unwrap(), 0);
        assert_eq!(union.freq(), 2);
        assert_eq!(union.next_position().unwrap(), 0);
        assert_eq!(union.next_position().unwrap(), 1);
        assert!(union.next_position().is_err());
        assert_eq!(union.advance(2).unwrap(), 2);
        assert_eq!(union.next().unwrap(), NO_MORE_DOCS);
    }
}
