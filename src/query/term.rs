//! Term query implementation.
//!
//! The simplest scoring query: documents containing one term, scored by
//! `tf(freq) * idf² * boost * queryNorm * fieldNorm`.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{DocId, IndexReader, PostingIterator, Term};
use crate::query::boost_suffix;
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::explanation::Explanation;
use crate::search::scorer::Scorer;
use crate::search::searcher::Searcher;
use crate::search::similarity::{IdfExplanation, Similarity};
use crate::search::weight::{PhaseGuard, Weight};

/// Frequencies below this have their scores precomputed.
const SCORE_CACHE_SIZE: usize = 32;

/// A query that matches documents containing a specific term.
#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    term: Term,
    boost: f32,
}

impl TermQuery {
    /// Create a new term query.
    pub fn new(term: Term) -> Self {
        TermQuery { term, boost: 1.0 }
    }

    /// Get the term.
    pub fn term(&self) -> &Term {
        &self.term
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
}

impl fmt::Display for TermQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.term, boost_suffix(self.boost))
    }
}

/// Normalized weight of a [`TermQuery`].
#[derive(Debug)]
pub struct TermWeight {
    query: TermQuery,
    similarity: Arc<dyn Similarity>,
    idf: IdfExplanation,
    query_norm: f32,
    query_weight: f32,
    value: f32,
    guard: PhaseGuard,
}

impl TermWeight {
    /// Look up the term's idf against the searcher's statistics.
    pub fn new(query: &TermQuery, searcher: &dyn Searcher) -> Result<Self> {
        let similarity = Arc::clone(&searcher.context().similarity);
        let idf = similarity.idf_explain(&query.term, searcher)?;
        Ok(TermWeight {
            query: query.clone(),
            similarity,
            idf,
            query_norm: 0.0,
            query_weight: 0.0,
            value: 0.0,
            guard: PhaseGuard::new(),
        })
    }

    fn term_scorer(&self, reader: &Arc<dyn IndexReader>) -> Result<Option<TermScorer>> {
        self.guard.ensure_normalized()?;
        let Some(postings) = reader.term_docs(&self.query.term)? else {
            return Ok(None);
        };
        Ok(Some(TermScorer::new(
            self.query.term.clone(),
            postings,
            self.value,
            Arc::clone(&self.similarity),
            reader.norms(self.query.term.field()),
        )))
    }
}

impl Weight for TermWeight {
    fn value(&self) -> f32 {
        self.value
    }

    fn sum_of_squared_weights(&mut self) -> Result<f32> {
        self.guard.summed()?;
        self.query_weight = self.idf.idf * self.query.boost;
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
            .term_scorer(reader)?
            .map(|scorer| Box::new(scorer) as Box<dyn Scorer>))
    }

    fn explain(&self, reader: &Arc<dyn IndexReader>, doc: DocId) -> Result<Explanation> {
        let term = &self.query.term;
        let tf = match self.term_scorer(reader)? {
            Some(mut scorer) => scorer.explain(doc)?,
            None => Explanation::new(
                self.similarity.tf(0.0),
                format!("tf(termFreq({term})=0)"),
            ),
        };
        let idf = Explanation::new(self.idf.idf, self.idf.description.clone());
        Ok(weighted_explanation(WeightedParts {
            query: self.query.to_string(),
            field_query: term.to_string(),
            field: term.field(),
            doc,
            boost: self.query.boost,
            idf,
            query_norm: self.query_norm,
            tf,
            field_norm: field_norm(reader.as_ref(), self.similarity.as_ref(), term.field(), doc),
        }))
    }
}

/// Decoded norm of `doc` in `field`, or 1.0 if the field has no norms.
pub(crate) fn field_norm(
    reader: &dyn IndexReader,
    similarity: &dyn Similarity,
    field: &str,
    doc: DocId,
) -> f32 {
    reader
        .norms(field)
        .and_then(|norms| norms.get(doc as usize).copied())
        .map_or(1.0, |b| similarity.decode_norm(b))
}

/// Ingredients of a `queryWeight * fieldWeight` explanation.
pub(crate) struct WeightedParts<'a> {
    pub query: String,
    pub field_query: String,
    pub field: &'a str,
    pub doc: DocId,
    pub boost: f32,
    pub idf: Explanation,
    pub query_norm: f32,
    pub tf: Explanation,
    pub field_norm: f32,
}

/// The explanation shape shared by term and phrase weights. The query half
/// is dropped when it equals 1.
pub(crate) fn weighted_explanation(parts: WeightedParts<'_>) -> Explanation {
    let WeightedParts {
        query,
        field_query,
        field,
        doc,
        boost,
        idf,
        query_norm,
        tf,
        field_norm,
    } = parts;

    let mut query_expl = Explanation::new(
        boost * idf.value() * query_norm,
        format!("queryWeight({query}), product of:"),
    );
    if boost != 1.0 {
        query_expl.add_detail(Explanation::new(boost, "boost"));
    }
    query_expl.add_detail(idf.clone());
    query_expl.add_detail(Explanation::new(query_norm, "queryNorm"));

    let matched = tf.is_match();
    let mut field_expl = Explanation::with_match(
        matched,
        tf.value() * idf.value() * field_norm,
        format!("fieldWeight({field_query} in {doc}), product of:"),
    );
    field_expl.add_detail(tf);
    field_expl.add_detail(idf);
    field_expl.add_detail(Explanation::new(
        field_norm,
        format!("fieldNorm(field={field}, doc={doc})"),
    ));

    if query_expl.value() == 1.0 {
        return field_expl;
    }
    Explanation::with_match(
        matched,
        query_expl.value() * field_expl.value(),
        format!("weight({query} in {doc}), product of:"),
    )
    .with_detail(query_expl)
    .with_detail(field_expl)
}

/// Scores the documents of one posting list.
#[derive(Debug)]
pub struct TermScorer {
    term: Term,
    postings: Box<dyn PostingIterator>,
    weight_value: f32,
    similarity: Arc<dyn Similarity>,
    norms: Option<Arc<Vec<u8>>>,
    score_cache: [f32; SCORE_CACHE_SIZE],
}

impl TermScorer {
    /// Create a scorer over the postings of `term` with the weight's final
    /// value.
    pub fn new(
        term: Term,
        postings: Box<dyn PostingIterator>,
        weight_value: f32,
        similarity: Arc<dyn Similarity>,
        norms: Option<Arc<Vec<u8>>>,
    ) -> Self {
        let mut score_cache = [0.0; SCORE_CACHE_SIZE];
        for (freq, slot) in score_cache.iter_mut().enumerate() {
            *slot = similarity.tf(freq as f32) * weight_value;
        }
        TermScorer {
            term,
            postings,
            weight_value,
            similarity,
            norms,
            score_cache,
        }
    }
}

impl DocIdSetIterator for TermScorer {
    fn doc_id(&self) -> DocId {
        self.postings.doc_id()
    }

    fn next(&mut self) -> Result<DocId> {
        self.postings.next()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.postings.advance(target)
    }
}

impl Scorer for TermScorer {
    fn score(&mut self) -> Result<f32> {
        let freq = self.postings.freq() as usize;
        let raw = match self.score_cache.get(freq) {
            Some(cached) => *cached,
            None => self.similarity.tf(freq as f32) * self.weight_value,
        };
        let doc = self.postings.doc_id();
        Ok(match self.norms.as_ref().and_then(|n| n.get(doc as usize)) {
            Some(&b) => raw * self.similarity.decode_norm(b),
            None => raw,
        })
    }

    /// Consumes the scorer's position: the frequency of `doc`, if reachable.
    fn explain(&mut self, doc: DocId) -> Result<Explanation> {
        let mut current = self.postings.doc_id();
        if current < doc {
            current = self.postings.advance(doc)?;
        }
        let freq = if current == doc { self.postings.freq() } else { 0 };
        Ok(Explanation::new(
            self.similarity.tf(freq as f32),
            format!("tf(termFreq({})={freq})", self.term),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, MemoryIndex};
    use crate::query::Query;
    use crate::search::scorer::test_support::drain;
    use crate::search::searcher::IndexSearcher;
    use crate::search::similarity::DefaultSimilarity;

    fn searcher() -> (IndexSearcher, Arc<dyn IndexReader>) {
        let reader: Arc<dyn IndexReader> = Arc::new(MemoryIndex::from_documents(vec![
            Document::new().add_text("body", "red red apple"),
            Document::new().add_text("body", "green pear"),
            Document::new().add_text("body", "red cherry tomato sauce"),
        ]));
        (IndexSearcher::new(Arc::clone(&reader)), reader)
    }

    #[test]
    fn test_term_query_display() {
        let query = TermQuery::new(Term::new("body", "red"));
        assert_eq!(query.to_string(), "body:red");
        assert_eq!(query.with_boost(0.5).to_string(), "body:red^0.5");
    }

    #[test]
    fn test_scores_follow_tf_and_norms() {
        let (searcher, reader) = searcher();
        let query: Query = TermQuery::new(Term::new("body", "red")).into();
        let weight = query.weight(&searcher).unwrap();
        let mut scorer = weight.scorer(&reader, true, false).unwrap().unwrap();
        let hits = drain(scorer.as_mut());
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![0, 2]);

        let sim = DefaultSimilarity;
        let norm0 = sim.decode_norm(sim.encode_norm(sim.length_norm("body", 3)));
        let expected0 = sim.tf(2.0) * weight.value() * norm0;
        assert!((hits[0].1 - expected0).abs() < 1e-6);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_missing_term_has_no_scorer() {
        let (searcher, reader) = searcher();
        let query: Query = TermQuery::new(Term::new("body", "plum")).into();
        let weight = query.weight(&searcher).unwrap();
        assert!(weight.scorer(&reader, true, false).unwrap().is_none());
        let explanation = weight.explain(&reader, 0).unwrap();
        assert!(!explanation.is_match());
        assert_eq!(explanation.value(), 0.0);
    }

    #[test]
    fn test_scorer_requires_normalized_weight() {
        let (searcher, reader) = searcher();
        let query = TermQuery::new(Term::new("body", "red"));
        let weight = TermWeight::new(&query, &searcher).unwrap();
        assert!(weight.scorer(&reader, true, false).is_err());
    }

    #[test]
    fn test_explain_matches_score() {
        let (searcher, reader) = searcher();
        let query: Query = TermQuery::new(Term::new("body", "red")).with_boost(2.0).into();
        let weight = query.weight(&searcher).unwrap();
        let mut scorer = weight.scorer(&reader, true, false).unwrap().unwrap();
        scorer.next().unwrap();
        let score = scorer.score().unwrap();

        let explanation = weight.explain(&reader, 0).unwrap();
        assert!(explanation.is_match());
        assert!((explanation.value() - score).abs() < 1e-6);
        let text = explanation.to_string();
        assert!(text.contains("fieldNorm(field=body, doc=0)"));
        assert!(text.contains("idf(docFreq=2, maxDocs=3)"));

        let miss = weight.explain(&reader, 1).unwrap();
        assert!(!miss.is_match());
        assert_eq!(miss.value(), 0.0);
    }
}
