//! Phrase query implementation for exact and sloppy phrase matching.

use std::fmt;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader, PostingIterator, Term};
use crate::query::boolean::{BooleanQuery, BooleanWeight, Occur};
use crate::query::phrase_scorer::{PhraseScorer, UnionPostings};
use crate::query::term::{TermQuery, TermWeight, WeightedParts, field_norm, weighted_explanation};
use crate::query::{Query, boost_suffix};
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::explanation::Explanation;
use crate::search::scorer::Scorer;
use crate::search::searcher::Searcher;
use crate::search::similarity::{IdfExplanation, Similarity};
use crate::search::weight::{PhaseGuard, Weight};

/// A query that matches documents containing a sequence of terms.
///
/// Terms sit at relative positions within the phrase; by default each added
/// term follows the previous one. With a slop of zero the terms must appear
/// exactly at those positions, otherwise they may be moved by up to `slop`
/// positions in total, with closer matches scoring higher.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseQuery {
    field: Option<String>,
    terms: Vec<Term>,
    positions: Vec<i32>,
    max_position: i32,
    slop: u32,
    boost: f32,
}

impl Default for PhraseQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl PhraseQuery {
    /// Create an empty phrase query.
    pub fn new() -> Self {
        PhraseQuery {
            field: None,
            terms: Vec::new(),
            positions: Vec::new(),
            max_position: 0,
            slop: 0,
            boost: 1.0,
        }
    }

    /// Create a phrase query from whitespace separated words.
    pub fn from_phrase(field: &str, phrase: &str) -> Self {
        let mut query = Self::new();
        for word in phrase.split_whitespace() {
            query.terms.push(Term::new(field, word));
            query.positions.push(query.terms.len() as i32 - 1);
        }
        query.max_position = (query.terms.len() as i32 - 1).max(0);
        if !query.terms.is_empty() {
            query.field = Some(field.to_string());
        }
        query
    }

    /// Append a term one position after the last one.
    pub fn add(&mut self, term: Term) -> Result<()> {
        let position = self.positions.last().map_or(0, |p| p + 1);
        self.add_at(term, position)
    }

    /// Add a term at an explicit relative position.
    pub fn add_at(&mut self, term: Term, position: i32) -> Result<()> {
        if position < 0 {
            return Err(TesseraError::invalid_argument(format!(
                "phrase positions must be non-negative, got {position}"
            )));
        }
        match &self.field {
            Some(field) if field != term.field() => {
                return Err(TesseraError::invalid_argument(format!(
                    "all phrase terms must be in the same field ({field}): {term}"
                )));
            }
            Some(_) => {}
            None => self.field = Some(term.field().to_string()),
        }
        self.terms.push(term);
        self.positions.push(position);
        self.max_position = self.max_position.max(position);
        Ok(())
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_term(mut self, term: Term) -> Result<Self> {
        self.add(term)?;
        Ok(self)
    }

    /// The terms, in insertion order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Relative position of each term.
    pub fn positions(&self) -> &[i32] {
        &self.positions
    }

    /// The field shared by all terms, once one has been added.
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Number of position moves tolerated.
    pub fn slop(&self) -> u32 {
        self.slop
    }

    /// Set the slop.
    pub fn set_slop(&mut self, slop: u32) {
        self.slop = slop;
    }

    /// Set the slop for this query.
    pub fn with_slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    /// Get the boost.
    pub fn boost(&self) -> f32 {
        self.boost
    }

    /// Set the boost.
    pub fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    /// Set the boost for this query.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// A one-term phrase is a term query.
    pub fn rewrite(&self) -> Option<Query> {
        match self.terms.as_slice() {
            [term] => Some(TermQuery::new(term.clone()).with_boost(self.boost).into()),
            _ => None,
        }
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searcher) -> Result<Box<dyn Weight>> {
        match self.terms.as_slice() {
            [] => Ok(Box::new(BooleanWeight::new(&BooleanQuery::new(), searcher)?)),
            [term] => {
                let query = TermQuery::new(term.clone()).with_boost(self.boost);
                Ok(Box::new(TermWeight::new(&query, searcher)?))
            }
            terms => {
                let similarity = Arc::clone(&searcher.context().similarity);
                let idf = similarity.idf_explain_terms(terms, searcher)?;
                let field = self.field.clone().unwrap_or_default();
                let idf = IdfExplanation {
                    idf: idf.idf,
                    description: format!("idf({field}:{})", idf.description),
                };
                let slots = terms
                    .iter()
                    .zip(&self.positions)
                    .map(|(term, &position)| (vec![term.clone()], position))
                    .collect();
                Ok(Box::new(PhraseWeight::new(
                    self.to_string(),
                    field,
                    slots,
                    self.slop,
                    self.boost,
                    similarity,
                    idf,
                )))
            }
        }
    }
}

impl fmt::Display for PhraseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{field}:")?;
        }
        let mut pieces: Vec<Option<String>> = vec![None; self.max_position as usize + 1];
        for (term, &position) in self.terms.iter().zip(&self.positions) {
            let piece = &mut pieces[position as usize];
            match piece {
                Some(text) => {
                    text.push('|');
                    text.push_str(term.text());
                }
                None => *piece = Some(term.text().to_string()),
            }
        }
        f.write_str("\"")?;
        if !self.terms.is_empty() {
            for (i, piece) in pieces.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                f.write_str(piece.as_deref().unwrap_or("?"))?;
            }
        }
        f.write_str("\"")?;
        if self.slop != 0 {
            write!(f, "~{}", self.slop)?;
        }
        f.write_str(&boost_suffix(self.boost))
    }
}

/// A phrase where a position may be filled by any of several terms, e.g.
/// `"quick (fox foxes)"`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPhraseQuery {
    field: Option<String>,
    term_arrays: Vec<Vec<Term>>,
    positions: Vec<i32>,
    slop: u32,
    boost: f32,
}

impl Default for MultiPhraseQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiPhraseQuery {
    /// Create an empty multi-phrase query.
    pub fn new() -> Self {
        MultiPhraseQuery {
            field: None,
            term_arrays: Vec::new(),
            positions: Vec::new(),
            slop: 0,
            boost: 1.0,
        }
    }

    /// Append alternatives one position after the last ones.
    pub fn add(&mut self, terms: Vec<Term>) -> Result<()> {
        let position = self.positions.last().map_or(0, |p| p + 1);
        self.add_at(terms, position)
    }

    /// Add alternatives at an explicit relative position.
    pub fn add_at(&mut self, terms: Vec<Term>, position: i32) -> Result<()> {
        if terms.is_empty() {
            return Err(TesseraError::invalid_argument(
                "a phrase position needs at least one term",
            ));
        }
        if position < 0 {
            return Err(TesseraError::invalid_argument(format!(
                "phrase positions must be non-negative, got {position}"
            )));
        }
        let field = self
            .field
            .get_or_insert_with(|| terms[0].field().to_string())
            .clone();
        if let Some(stray) = terms.iter().find(|t| t.field() != field) {
            return Err(TesseraError::invalid_argument(format!(
                "all phrase terms must be in the same field ({field}): {stray}"
            )));
        }
        self.term_arrays.push(terms);
        self.positions.push(position);
        Ok(())
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_terms(mut self, terms: Vec<Term>) -> Result<Self> {
        self.add(terms)?;
        Ok(self)
    }

    /// The alternatives at each position, in insertion order.
    pub fn term_arrays(&self) -> &[Vec<Term>] {
        &self.term_arrays
    }

    /// Relative position of each alternative set.
    pub fn positions(&self) -> &[i32] {
        &self.positions
    }

    /// Number of position moves tolerated.
    pub fn slop(&self) -> u32 {
        self.slop
    }

    /// Set the slop.
    pub fn set_slop(&mut self, slop: u32) {
        self.slop = slop;
    }

    /// Set the slop for this query.
    pub fn with_slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    /// Get the boost.
    pub fn boost(&self) -> f32 {
        self.boost
    }

    /// Set the boost.
    pub fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    /// Set the boost for this query.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// A single position becomes a coordination-free disjunction of its
    /// terms.
    pub fn rewrite(&self, config: &SearchConfig) -> Result<Option<Query>> {
        let [terms] = self.term_arrays.as_slice() else {
            return Ok(None);
        };
        let mut query =
            BooleanQuery::with_coord_disabled().with_max_clause_count(config.max_clause_count);
        for term in terms {
            query.add(TermQuery::new(term.clone()).into(), Occur::Should)?;
        }
        Ok(Some(query.with_boost(self.boost).into()))
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searcher) -> Result<Box<dyn Weight>> {
        let similarity = Arc::clone(&searcher.context().similarity);
        let max_doc = searcher.max_doc();
        let mut idf = 0.0;
        for term in self.term_arrays.iter().flatten() {
            idf += similarity.idf(searcher.doc_freq(term)?, max_doc);
        }
        let label = self.to_string();
        let idf = IdfExplanation {
            idf,
            description: format!("idf({label})"),
        };
        let slots = self
            .term_arrays
            .iter()
            .cloned()
            .zip(self.positions.iter().copied())
            .collect();
        Ok(Box::new(PhraseWeight::new(
            label,
            self.field.clone().unwrap_or_default(),
            slots,
            self.slop,
            self.boost,
            similarity,
            idf,
        )))
    }
}

impl fmt::Display for MultiPhraseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{field}:")?;
        }
        f.write_str("\"")?;
        for (i, terms) in self.term_arrays.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if let [term] = terms.as_slice() {
                f.write_str(term.text())?;
            } else {
                f.write_str("(")?;
                for (j, term) in terms.iter().enumerate() {
                    if j > 0 {
                        f.write_str(" ")?;
                    }
                    f.write_str(term.text())?;
                }
                f.write_str(")")?;
            }
        }
        f.write_str("\"")?;
        if self.slop != 0 {
            write!(f, "~{}", self.slop)?;
        }
        f.write_str(&boost_suffix(self.boost))
    }
}

/// Weight shared by both phrase queries. Each slot lists the terms that may
/// fill one phrase position, with that position's offset.
#[derive(Debug)]
struct PhraseWeight {
    label: String,
    field: String,
    slots: Vec<(Vec<Term>, i32)>,
    slop: u32,
    boost: f32,
    similarity: Arc<dyn Similarity>,
    idf: IdfExplanation,
    query_norm: f32,
    query_weight: f32,
    value: f32,
    guard: PhaseGuard,
}

impl PhraseWeight {
    fn new(
        label: String,
        field: String,
        slots: Vec<(Vec<Term>, i32)>,
        slop: u32,
        boost: f32,
        similarity: Arc<dyn Similarity>,
        idf: IdfExplanation,
    ) -> Self {
        PhraseWeight {
            label,
            field,
            slots,
            slop,
            boost,
            similarity,
            idf,
            query_norm: 0.0,
            query_weight: 0.0,
            value: 0.0,
            guard: PhaseGuard::new(),
        }
    }

    /// None when some position has no postings at all.
    fn phrase_scorer(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<PhraseScorer>> {
        self.guard.ensure_normalized()?;
        if self.slots.is_empty() {
            return Ok(None);
        }

        let mut postings: Vec<(Box<dyn PostingIterator>, i32)> = Vec::with_capacity(self.slots.len());
        for (terms, offset) in &self.slots {
            let slot: Box<dyn PostingIterator> = if let [term] = terms.as_slice() {
                match reader.term_docs(term)? {
                    Some(p) => p,
                    None => return Ok(None),
                }
            } else {
                let mut subs = Vec::with_capacity(terms.len());
                for term in terms {
                    if let Some(p) = reader.term_docs(term)? {
                        subs.push(p);
                    }
                }
                match UnionPostings::new(subs)? {
                    Some(union) => Box::new(union),
                    None => return Ok(None),
                }
            };
            postings.push((slot, *offset));
        }

        let norms = reader.norms(&self.field);
        let similarity = Arc::clone(&self.similarity);
        Ok(Some(if self.slop == 0 {
            PhraseScorer::exact(postings, self.value, similarity, norms)
        } else {
            PhraseScorer::sloppy(postings, self.slop, self.value, similarity, norms)
        }))
    }
}

impl Weight for PhraseWeight {
    fn value(&self) -> f32 {
        self.value
    }

    fn sum_of_squared_weights(&mut self) -> Result<f32> {
        self.guard.summed()?;
        self.query_weight = self.idf.idf * self.boost;
        Ok(self.query_weight * self.query_weight)
    }

    fn normalize(&mut self, norm: f32) -> Result<()> {
        self.guard.normalized()?;
        self.query_norm = norm;
        self.query_weight *= norm;
        self.value = self.query_weight * self.idf.idf;
        Ok(())
    }

    fn scorer(
        &self,
        reader: &Arc<dyn IndexReader>,
        _score_docs_in_order: bool,
        _top_scorer: bool,
    ) -> Result<Option<Box<dyn Scorer>>> {
        Ok(self
            .phrase_scorer(reader)?
            .map(|scorer| Box::new(scorer) as Box<dyn Scorer>))
    }

    fn explain(&self, reader: &Arc<dyn IndexReader>, doc: DocId) -> Result<Explanation> {
        let Some(mut scorer) = self.phrase_scorer(reader)? else {
            return Ok(Explanation::new(0.0, "no matching docs"));
        };
        let freq = if scorer.advance(doc)? == doc {
            scorer.freq()
        } else {
            0.0
        };
        let tf = Explanation::new(self.similarity.tf(freq), format!("tf(phraseFreq={freq:?})"));
        Ok(weighted_explanation(WeightedParts {
            query: self.label.clone(),
            field_query: self.label.clone(),
            field: &self.field,
            doc,
            boost: self.boost,
            idf: Explanation::new(self.idf.idf, self.idf.description.clone()),
            query_norm: self.query_norm,
            tf,
            field_norm: field_norm(reader.as_ref(), self.similarity.as_ref(), &self.field, doc),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};
    use crate::search::searcher::{IndexSearcher, Searchable};

    fn t(text: &str) -> Term {
        Term::new("body", text)
    }

    fn searcher() -> IndexSearcher {
        let reader: Arc<dyn IndexReader> = Arc::new(MemoryIndex::from_documents(vec![
            Document::new().add_text("body", "the quick brown fox jumps"),
            Document::new().add_text("body", "the brown quick fox"),
            Document::new().add_text("body", "quick foxes and a quick brown dog"),
            Document::new().add_text("body", "slow green turtle"),
        ]));
        IndexSearcher::new(reader)
    }

    #[test]
    fn test_add_rejects_other_field() {
        let mut query = PhraseQuery::new();
        query.add(t("quick")).unwrap();
        assert!(query.add(Term::new("title", "fox")).is_err());
        assert!(query.add_at(t("fox"), -1).is_err());
    }

    #[test]
    fn test_display() {
        let mut query = PhraseQuery::new().with_slop(2).with_boost(2.0);
        query.add(t("quick")).unwrap();
        query.add_at(t("fox"), 2).unwrap();
        query.add_at(t("hound"), 2).unwrap();
        assert_eq!(query.to_string(), "body:\"quick ? fox|hound\"~2^2.0");

        let mut multi = MultiPhraseQuery::new();
        multi.add(vec![t("quick")]).unwrap();
        multi.add(vec![t("fox"), t("foxes")]).unwrap();
        assert_eq!(multi.to_string(), "body:\"quick (fox foxes)\"");
    }

    #[test]
    fn test_single_term_rewrites_to_term_query() {
        let query = PhraseQuery::from_phrase("body", "fox").with_boost(3.0);
        assert_eq!(
            query.rewrite(),
            Some(TermQuery::new(t("fox")).with_boost(3.0).into())
        );
        assert_eq!(PhraseQuery::from_phrase("body", "quick fox").rewrite(), None);
    }

    #[test]
    fn test_exact_phrase_search() {
        let searcher = searcher();
        let query: Query = PhraseQuery::from_phrase("body", "quick brown").into();
        let top = searcher.search(&query, None, 10).unwrap();
        let mut docs = top.doc_ids();
        docs.sort_unstable();
        assert_eq!(docs, vec![0, 2]);
    }

    #[test]
    fn test_sloppy_phrase_prefers_closer_matches() {
        let searcher = searcher();
        let query: Query = PhraseQuery::from_phrase("body", "quick fox").with_slop(2).into();
        let top = searcher.search(&query, None, 10).unwrap();
        assert_eq!(top.total_hits, 2);
        // Doc 1 holds the exact phrase, doc 0 needs one move.
        assert_eq!(top.score_docs[0].doc, 1);
        assert_eq!(top.score_docs[1].doc, 0);
    }

    #[test]
    fn test_multi_phrase_search() {
        let searcher = searcher();
        let mut query = MultiPhraseQuery::new();
        query.add(vec![t("quick")]).unwrap();
        query.add(vec![t("fox"), t("foxes")]).unwrap();
        let top = searcher.search(&query.into(), None, 10).unwrap();
        assert_eq!(top.doc_ids(), vec![2]);
    }

    #[test]
    fn test_single_position_multi_phrase_rewrites_to_disjunction() {
        let mut query = MultiPhraseQuery::new().with_boost(2.0);
        query.add(vec![t("fox"), t("foxes")]).unwrap();
        let rewritten = query.rewrite(&SearchConfig::default()).unwrap().unwrap();
        let Query::Boolean(bq) = rewritten else {
            panic!("expected a boolean query");
        };
        assert!(bq.is_coord_disabled());
        assert_eq!(bq.clauses().len(), 2);
        assert_eq!(bq.boost(), 2.0);
    }

    #[test]
    fn test_explain_matches_score() {
        let searcher = searcher();
        let query: Query = PhraseQuery::from_phrase("body", "quick brown").into();
        let top = searcher.search(&query, None, 10).unwrap();
        for hit in &top.score_docs {
            let explanation = searcher.explain(&query, hit.doc).unwrap();
            assert!(explanation.is_match());
            assert!((explanation.value() - hit.score).abs() < 1e-5);
            assert!(explanation.to_string().contains("tf(phraseFreq=1.0)"));
        }
        let miss = searcher.explain(&query, 3).unwrap();
        assert!(!miss.is_match());
    }

    #[test]
    fn test_missing_term_matches_nothing() {
        let searcher = searcher();
        let query: Query = PhraseQuery::from_phrase("body", "quick zebra").into();
        assert_eq!(searcher.search(&query, None, 10).unwrap().total_hits, 0);
        let explanation = searcher.explain(&query, 0).unwrap();
        assert_eq!(explanation.description(), "no matching docs");
    }
}
