//! In-order scorer for boolean queries.
//!
//! The clause scorers are assembled into a tree of conjunction,
//! disjunction, exclusion and required/optional combinators. Leaves of that
//! tree report how many clauses matched the current document to a shared
//! [`Coordinator`], which turns the count into a coordination factor.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::index::{DocId, NOT_STARTED};
use crate::query::conjunction::ConjunctionScorer;
use crate::query::disjunction::DisjunctionSumScorer;
use crate::query::req_excl::ReqExclScorer;
use crate::query::req_opt::ReqOptSumScorer;
use crate::search::doc_id_set::DocIdSetIterator;
use crate::search::scorer::Scorer;

/// Counts matching clauses while one document is scored.
#[derive(Debug)]
pub struct Coordinator {
    matchers: AtomicUsize,
    coord_factors: Vec<f32>,
}

impl Coordinator {
    fn new(coord_factors: Vec<f32>) -> Self {
        Coordinator {
            matchers: AtomicUsize::new(0),
            coord_factors,
        }
    }

    fn reset(&self) {
        self.matchers.store(0, Ordering::Relaxed);
    }

    fn add(&self, count: usize) {
        self.matchers.fetch_add(count, Ordering::Relaxed);
    }

    fn factor(&self) -> f32 {
        let matchers = self.matchers.load(Ordering::Relaxed);
        self.coord_factors.get(matchers).copied().unwrap_or(1.0)
    }
}

/// The scorer kinds whose matches are counted.
#[derive(Debug)]
enum Counted {
    /// One clause.
    Single(Box<dyn Scorer>),
    /// Every clause of the conjunction matches.
    Conjunction(ConjunctionScorer, usize),
    /// The disjunction knows how many of its clauses matched.
    Disjunction(DisjunctionSumScorer),
}

impl Counted {
    fn as_iter(&self) -> &dyn DocIdSetIterator {
        match self {
            Counted::Single(s) => s.as_ref(),
            Counted::Conjunction(s, _) => s,
            Counted::Disjunction(s) => s,
        }
    }

    fn as_scorer_mut(&mut self) -> &mut dyn Scorer {
        match self {
            Counted::Single(s) => s.as_mut(),
            Counted::Conjunction(s, _) => s,
            Counted::Disjunction(s) => s,
        }
    }

    fn matchers(&self) -> usize {
        match self {
            Counted::Single(_) => 1,
            Counted::Conjunction(_, n) => *n,
            Counted::Disjunction(s) => s.matchers(),
        }
    }
}

/// Reports its matches to the coordinator, once per document no matter how
/// often the score is asked for.
#[derive(Debug)]
struct CountingScorer {
    inner: Counted,
    coordinator: Arc<Coordinator>,
    last_scored_doc: DocId,
    last_doc_score: f32,
}

impl CountingScorer {
    fn boxed(inner: Counted, coordinator: &Arc<Coordinator>) -> Box<dyn Scorer> {
        Box::new(CountingScorer {
            inner,
            coordinator: Arc::clone(coordinator),
            last_scored_doc: NOT_STARTED,
            last_doc_score: f32::NAN,
        })
    }
}

impl DocIdSetIterator for CountingScorer {
    fn doc_id(&self) -> DocId {
        self.inner.as_iter().doc_id()
    }

    fn next(&mut self) -> Result<DocId> {
        self.inner.as_scorer_mut().next()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.inner.as_scorer_mut().advance(target)
    }
}

impl Scorer for CountingScorer {
    fn score(&mut self) -> Result<f32> {
        let doc = self.doc_id();
        if doc >= self.last_scored_doc {
            if doc > self.last_scored_doc {
                self.last_doc_score = self.inner.as_scorer_mut().score()?;
                self.last_scored_doc = doc;
            }
            self.coordinator.add(self.inner.matchers());
        }
        Ok(self.last_doc_score)
    }
}

/// Boolean scorer producing documents in increasing order.
#[derive(Debug)]
pub struct BooleanScorer2 {
    counting_sum: Box<dyn Scorer>,
    coordinator: Arc<Coordinator>,
    doc: DocId,
}

impl BooleanScorer2 {
    /// Assemble the scorer tree from unpositioned clause scorers.
    ///
    /// `coord(overlap, max_overlap)` supplies coordination factors; the
    /// maximum overlap is the number of required plus optional scorers.
    pub fn new(
        required: Vec<Box<dyn Scorer>>,
        prohibited: Vec<Box<dyn Scorer>>,
        optional: Vec<Box<dyn Scorer>>,
        minimum_should_match: usize,
        coord: &dyn Fn(usize, usize) -> f32,
    ) -> Result<Self> {
        let max_coord = required.len() + optional.len();
        let coord_factors = (0..=max_coord).map(|i| coord(i, max_coord)).collect();
        let coordinator = Arc::new(Coordinator::new(coord_factors));

        let builder = TreeBuilder {
            coordinator: &coordinator,
            minimum_should_match,
        };
        let counting_sum = if required.is_empty() {
            builder.no_required(optional, prohibited)?
        } else {
            builder.some_required(required, optional, prohibited)?
        };

        Ok(BooleanScorer2 {
            counting_sum,
            coordinator,
            doc: NOT_STARTED,
        })
    }
}

struct TreeBuilder<'a> {
    coordinator: &'a Arc<Coordinator>,
    minimum_should_match: usize,
}

impl TreeBuilder<'_> {
    fn single(&self, scorer: Box<dyn Scorer>) -> Box<dyn Scorer> {
        CountingScorer::boxed(Counted::Single(scorer), self.coordinator)
    }

    fn conjunction(&self, scorers: Vec<Box<dyn Scorer>>) -> Result<Box<dyn Scorer>> {
        let count = scorers.len();
        let conjunction = ConjunctionScorer::new(scorers)?;
        Ok(CountingScorer::boxed(
            Counted::Conjunction(conjunction, count),
            self.coordinator,
        ))
    }

    fn disjunction(&self, scorers: Vec<Box<dyn Scorer>>, minimum: usize) -> Result<Box<dyn Scorer>> {
        let disjunction = DisjunctionSumScorer::new(scorers, minimum)?;
        Ok(CountingScorer::boxed(
            Counted::Disjunction(disjunction),
            self.coordinator,
        ))
    }

    fn no_required(
        &self,
        mut optional: Vec<Box<dyn Scorer>>,
        prohibited: Vec<Box<dyn Scorer>>,
    ) -> Result<Box<dyn Scorer>> {
        let required_optionals = self.minimum_should_match.max(1);
        let counting = if optional.len() > required_optionals {
            self.disjunction(optional, required_optionals)?
        } else if optional.len() == 1 {
            let only = optional.remove(0);
            self.single(only)
        } else {
            self.conjunction(optional)?
        };
        add_prohibited(counting, prohibited)
    }

    fn some_required(
        &self,
        mut required: Vec<Box<dyn Scorer>>,
        mut optional: Vec<Box<dyn Scorer>>,
        prohibited: Vec<Box<dyn Scorer>>,
    ) -> Result<Box<dyn Scorer>> {
        if optional.len() == self.minimum_should_match {
            required.append(&mut optional);
            let all = self.conjunction(required)?;
            return add_prohibited(all, prohibited);
        }

        let counting_required = if required.len() == 1 {
            let only = required.remove(0);
            self.single(only)
        } else {
            self.conjunction(required)?
        };

        if self.minimum_should_match > 0 {
            let should = self.disjunction(optional, self.minimum_should_match)?;
            let both: Box<dyn Scorer> =
                Box::new(ConjunctionScorer::new(vec![counting_required, should])?);
            return add_prohibited(both, prohibited);
        }

        let optional_scorer = if optional.len() == 1 {
            let only = optional.remove(0);
            self.single(only)
        } else {
            self.disjunction(optional, 1)?
        };
        Ok(Box::new(ReqOptSumScorer::new(
            add_prohibited(counting_required, prohibited)?,
            optional_scorer,
        )))
    }
}

fn add_prohibited(
    counting: Box<dyn Scorer>,
    mut prohibited: Vec<Box<dyn Scorer>>,
) -> Result<Box<dyn Scorer>> {
    let excluded: Box<dyn Scorer> = match prohibited.len() {
        0 => return Ok(counting),
        1 => prohibited.remove(0),
        _ => Box::new(DisjunctionSumScorer::new(prohibited, 1)?),
    };
    Ok(Box::new(ReqExclScorer::new(counting, excluded)))
}

impl DocIdSetIterator for BooleanScorer2 {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next(&mut self) -> Result<DocId> {
        self.doc = self.counting_sum.next()?;
        Ok(self.doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.doc = self.counting_sum.advance(target)?;
        Ok(self.doc)
    }
}

impl Scorer for BooleanScorer2 {
    fn score(&mut self) -> Result<f32> {
        self.coordinator.reset();
        let sum = self.counting_sum.score()?;
        Ok(sum * self.coordinator.factor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::NO_MORE_DOCS;
    use crate::search::scorer::test_support::{VecScorer, drain};

    fn boxed(lists: &[&[DocId]]) -> Vec<Box<dyn Scorer>> {
        lists
            .iter()
            .map(|docs| Box::new(VecScorer::docs(docs)) as Box<dyn Scorer>)
            .collect()
    }

    fn overlap(overlap: usize, max: usize) -> f32 {
        overlap as f32 / max as f32
    }

    #[test]
    fn test_optional_only_applies_coord() {
        let mut scorer =
            BooleanScorer2::new(vec![], vec![], boxed(&[&[1, 2], &[2, 3]]), 0, &overlap).unwrap();
        assert_eq!(drain(&mut scorer), vec![(1, 0.5), (2, 2.0), (3, 0.5)]);
    }

    #[test]
    fn test_required_with_optional_and_prohibited() {
        let mut scorer = BooleanScorer2::new(
            boxed(&[&[1, 2, 3, 4]]),
            boxed(&[&[3]]),
            boxed(&[&[2, 4, 9]]),
            0,
            &overlap,
        )
        .unwrap();
        assert_eq!(drain(&mut scorer), vec![(1, 0.5), (2, 2.0), (4, 2.0)]);
    }

    #[test]
    fn test_minimum_should_match_with_required() {
        let mut scorer = BooleanScorer2::new(
            boxed(&[&[1, 2, 3, 4, 5]]),
            vec![],
            boxed(&[&[1, 2], &[2, 3], &[3, 4]]),
            2,
            &overlap,
        )
        .unwrap();
        let docs: Vec<DocId> = drain(&mut scorer).into_iter().map(|h| h.0).collect();
        assert_eq!(docs, vec![2, 3]);
    }

    #[test]
    fn test_all_optional_required_by_minimum() {
        let mut scorer =
            BooleanScorer2::new(vec![], vec![], boxed(&[&[1, 2, 5], &[2, 5, 7]]), 2, &overlap)
                .unwrap();
        assert_eq!(drain(&mut scorer), vec![(2, 2.0), (5, 2.0)]);
    }

    #[test]
    fn test_multiple_prohibited_and_advance() {
        let mut scorer = BooleanScorer2::new(
            boxed(&[&[1, 3, 5, 7, 9], &[1, 3, 5, 7, 9, 11]]),
            boxed(&[&[3], &[7]]),
            vec![],
            0,
            &overlap,
        )
        .unwrap();
        assert_eq!(scorer.advance(2).unwrap(), 5);
        assert_eq!(scorer.score().unwrap(), 2.0);
        assert_eq!(scorer.next().unwrap(), 9);
        assert_eq!(scorer.next().unwrap(), NO_MORE_DOCS);
    }
}
