//! Boolean query implementation.
//!
//! Clauses are MUST, SHOULD or MUST_NOT sub-queries. A document matches when
//! it satisfies every MUST clause, no MUST_NOT clause and at least
//! `minimum_should_match` SHOULD clauses (at least one SHOULD clause when
//! there is nothing else to match on). Its score is the sum of the matching
//! clause scores scaled by the coordination factor.

use std::fmt;
use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::error::{Result, TesseraError};
use crate::index::{DocId, IndexReader};
use crate::query::boolean_scorer::BooleanScorer2;
use crate::query::bucket_scorer::{BooleanScorer, MAX_PROHIBITED_CLAUSES};
use crate::query::{Query, boost_suffix};
use crate::search::explanation::Explanation;
use crate::search::scorer::Scorer;
use crate::search::searcher::Searcher;
use crate::search::similarity::Similarity;
use crate::search::weight::{PhaseGuard, Weight};

/// How a clause takes part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occur {
    /// The clause must match.
    Must,
    /// The clause may match and adds to the score when it does.
    Should,
    /// The clause must not match.
    MustNot,
}

impl Occur {
    fn prefix(self) -> &'static str {
        match self {
            Occur::Must => "+",
            Occur::Should => "",
            Occur::MustNot => "-",
        }
    }
}

/// A sub-query with its occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanClause {
    query: Query,
    occur: Occur,
}

impl BooleanClause {
    /// Create a clause.
    pub fn new(query: Query, occur: Occur) -> Self {
        BooleanClause { query, occur }
    }

    /// The sub-query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Take the sub-query.
    pub fn into_query(self) -> Query {
        self.query
    }

    /// The occurrence.
    pub fn occur(&self) -> Occur {
        self.occur
    }

    /// Whether the clause is MUST.
    pub fn is_required(&self) -> bool {
        self.occur == Occur::Must
    }

    /// Whether the clause is MUST_NOT.
    pub fn is_prohibited(&self) -> bool {
        self.occur == Occur::MustNot
    }
}

/// A query combining sub-queries with MUST, SHOULD and MUST_NOT.
#[derive(Debug, Clone)]
pub struct BooleanQuery {
    clauses: Vec<BooleanClause>,
    disable_coord: bool,
    minimum_should_match: usize,
    max_clause_count: usize,
    boost: f32,
}

impl Default for BooleanQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for BooleanQuery {
    fn eq(&self, other: &Self) -> bool {
        self.boost == other.boost
            && self.clauses == other.clauses
            && self.minimum_should_match == other.minimum_should_match
            && self.disable_coord == other.disable_coord
    }
}

impl BooleanQuery {
    /// An empty query with coordination enabled.
    pub fn new() -> Self {
        BooleanQuery {
            clauses: Vec::new(),
            disable_coord: false,
            minimum_should_match: 0,
            max_clause_count: SearchConfig::default().max_clause_count,
            boost: 1.0,
        }
    }

    /// An empty query whose score ignores how many clauses matched.
    pub fn with_coord_disabled() -> Self {
        BooleanQuery {
            disable_coord: true,
            ..Self::new()
        }
    }

    /// Limit the number of clauses [`add`](Self::add) accepts.
    pub fn with_max_clause_count(mut self, max_clause_count: usize) -> Self {
        self.max_clause_count = max_clause_count;
        self
    }

    /// Add a clause; fails once the clause limit is reached.
    pub fn add(&mut self, query: Query, occur: Occur) -> Result<()> {
        self.add_clause(BooleanClause::new(query, occur))
    }

    /// Add a prepared clause; fails once the clause limit is reached.
    pub fn add_clause(&mut self, clause: BooleanClause) -> Result<()> {
        if self.clauses.len() >= self.max_clause_count {
            return Err(TesseraError::too_many_clauses(self.max_clause_count));
        }
        self.clauses.push(clause);
        Ok(())
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_clause(mut self, query: Query, occur: Occur) -> Result<Self> {
        self.add(query, occur)?;
        Ok(self)
    }

    /// The clauses in insertion order.
    pub fn clauses(&self) -> &[BooleanClause] {
        &self.clauses
    }

    /// Take the clauses.
    pub fn into_clauses(self) -> Vec<BooleanClause> {
        self.clauses
    }

    /// Whether coordination is disabled.
    pub fn is_coord_disabled(&self) -> bool {
        self.disable_coord
    }

    /// Minimum number of SHOULD clauses a match needs.
    pub fn minimum_should_match(&self) -> usize {
        self.minimum_should_match
    }

    /// Set the minimum number of SHOULD clauses a match needs.
    pub fn set_minimum_should_match(&mut self, minimum: usize) {
        self.minimum_should_match = minimum;
    }

    /// Builder form of [`set_minimum_should_match`](Self::set_minimum_should_match).
    pub fn with_minimum_should_match(mut self, minimum: usize) -> Self {
        self.minimum_should_match = minimum;
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

    /// A lone non-prohibited clause replaces the query, carrying the boost.
    /// Otherwise clauses are rewritten in place.
    pub fn rewrite(&self, reader: &dyn IndexReader, config: &SearchConfig) -> Result<Option<Query>> {
        if self.minimum_should_match == 0 {
            if let [clause] = self.clauses.as_slice() {
                if !clause.is_prohibited() {
                    let mut query = clause
                        .query
                        .rewrite(reader, config)?
                        .unwrap_or_else(|| clause.query.clone());
                    if self.boost != 1.0 {
                        query.set_boost(self.boost * query.boost());
                    }
                    return Ok(Some(query));
                }
            }
        }

        let mut rewritten: Option<BooleanQuery> = None;
        for (i, clause) in self.clauses.iter().enumerate() {
            if let Some(query) = clause.query.rewrite(reader, config)? {
                rewritten.get_or_insert_with(|| self.clone()).clauses[i].query = query;
            }
        }
        Ok(rewritten.map(Query::Boolean))
    }
}

impl fmt::Display for BooleanQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let need_parens = self.boost != 1.0 || self.minimum_should_match > 0;
        if need_parens {
            f.write_str("(")?;
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(clause.occur.prefix())?;
            match &clause.query {
                Query::Boolean(sub) => write!(f, "({sub})")?,
                other => write!(f, "{other}")?,
            }
        }
        if need_parens {
            f.write_str(")")?;
        }
        if self.minimum_should_match > 0 {
            write!(f, "~{}", self.minimum_should_match)?;
        }
        f.write_str(&boost_suffix(self.boost))
    }
}

/// Normalized weight of a [`BooleanQuery`].
#[derive(Debug)]
pub struct BooleanWeight {
    clauses: Vec<(BooleanClause, Box<dyn Weight>)>,
    similarity: Arc<dyn Similarity>,
    disable_coord: bool,
    minimum_should_match: usize,
    allow_docs_out_of_order: bool,
    boost: f32,
    guard: PhaseGuard,
}

impl BooleanWeight {
    /// Build the clause weights.
    pub fn new(query: &BooleanQuery, searcher: &dyn Searcher) -> Result<Self> {
        let clauses = query
            .clauses
            .iter()
            .map(|clause| Ok((clause.clone(), clause.query.create_weight(searcher)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(BooleanWeight {
            clauses,
            similarity: Arc::clone(&searcher.context().similarity),
            disable_coord: query.disable_coord,
            minimum_should_match: query.minimum_should_match,
            allow_docs_out_of_order: searcher.config().allow_docs_out_of_order,
            boost: query.boost,
            guard: PhaseGuard::new(),
        })
    }

    fn coord(&self, overlap: usize, max_overlap: usize) -> f32 {
        if self.disable_coord {
            1.0
        } else {
            self.similarity.coord(overlap, max_overlap)
        }
    }
}

impl Weight for BooleanWeight {
    fn value(&self) -> f32 {
        self.boost
    }

    fn sum_of_squared_weights(&mut self) -> Result<f32> {
        self.guard.summed()?;
        let mut sum = 0.0;
        for (clause, weight) in self.clauses.iter_mut() {
            // Prohibited weights still go through the protocol.
            let sub = weight.sum_of_squared_weights()?;
            if !clause.is_prohibited() {
                sum += sub;
            }
        }
        Ok(sum * self.boost * self.boost)
    }

    fn normalize(&mut self, norm: f32) -> Result<()> {
        self.guard.normalized()?;
        let norm = norm * self.boost;
        for (_, weight) in self.clauses.iter_mut() {
            weight.normalize(norm)?;
        }
        Ok(())
    }

    fn scorer(
        &self,
        reader: &Arc<dyn IndexReader>,
        score_docs_in_order: bool,
        top_scorer: bool,
    ) -> Result<Option<Box<dyn Scorer>>> {
        self.guard.ensure_normalized()?;
        let mut required = Vec::new();
        let mut prohibited = Vec::new();
        let mut optional = Vec::new();
        for (clause, weight) in &self.clauses {
            match (weight.scorer(reader, true, false)?, clause.occur) {
                (None, Occur::Must) => return Ok(None),
                (None, _) => {}
                (Some(scorer), Occur::Must) => required.push(scorer),
                (Some(scorer), Occur::MustNot) => prohibited.push(scorer),
                (Some(scorer), Occur::Should) => optional.push(scorer),
            }
        }

        let in_order = score_docs_in_order || !self.allow_docs_out_of_order;
        if !in_order
            && top_scorer
            && required.is_empty()
            && prohibited.len() < MAX_PROHIBITED_CLAUSES
        {
            trace!(
                "bucket scoring {} optional and {} prohibited clauses",
                optional.len(),
                prohibited.len()
            );
            let max_coord = optional.len();
            let coord_factors = (0..=max_coord).map(|i| self.coord(i, max_coord)).collect();
            let scorer = BooleanScorer::new(
                optional,
                prohibited,
                self.minimum_should_match,
                coord_factors,
            )?;
            return Ok(Some(Box::new(scorer)));
        }

        if required.is_empty() && optional.is_empty() {
            return Ok(None);
        }
        if optional.len() < self.minimum_should_match {
            return Ok(None);
        }
        let coord = |overlap, max| self.coord(overlap, max);
        let scorer = BooleanScorer2::new(
            required,
            prohibited,
            optional,
            self.minimum_should_match,
            &coord,
        )?;
        Ok(Some(Box::new(scorer)))
    }

    fn explain(&self, reader: &Arc<dyn IndexReader>, doc: DocId) -> Result<Explanation> {
        let mut sum_expl = Explanation::new(0.0, "sum of:");
        let mut coord = 0;
        let mut max_coord = 0;
        let mut sum = 0.0;
        let mut fail = false;
        let mut should_match_count = 0;

        for (clause, weight) in &self.clauses {
            if weight.scorer(reader, true, true)?.is_none() {
                if clause.is_required() {
                    sum_expl.add_detail(Explanation::new(
                        0.0,
                        format!("no match on required clause ({})", clause.query),
                    ));
                    fail = true;
                }
                continue;
            }
            let sub = weight.explain(reader, doc)?;
            if !clause.is_prohibited() {
                max_coord += 1;
            }
            if sub.is_match() {
                if clause.is_prohibited() {
                    sum_expl.add_detail(
                        Explanation::new(
                            0.0,
                            format!("match on prohibited clause ({})", clause.query),
                        )
                        .with_detail(sub),
                    );
                    fail = true;
                } else {
                    sum += sub.value();
                    coord += 1;
                    sum_expl.add_detail(sub);
                }
                if clause.occur == Occur::Should {
                    should_match_count += 1;
                }
            } else if clause.is_required() {
                sum_expl.add_detail(
                    Explanation::new(
                        0.0,
                        format!("no match on required clause ({})", clause.query),
                    )
                    .with_detail(sub),
                );
                fail = true;
            }
        }

        if fail {
            sum_expl.set_match(Some(false));
            sum_expl.set_value(0.0);
            sum_expl.set_description("Failure to meet condition(s) of required/prohibited clause(s)");
            return Ok(sum_expl);
        }
        if should_match_count < self.minimum_should_match {
            sum_expl.set_match(Some(false));
            sum_expl.set_value(0.0);
            sum_expl.set_description(format!(
                "Failure to match minimum number of optional clauses: {}",
                self.minimum_should_match
            ));
            return Ok(sum_expl);
        }

        let matched = coord > 0;
        sum_expl.set_match(Some(matched));
        sum_expl.set_value(sum);
        let coord_factor = self.coord(coord, max_coord);
        if coord_factor == 1.0 {
            return Ok(sum_expl);
        }
        Ok(
            Explanation::with_match(matched, sum * coord_factor, "product of:")
                .with_detail(sum_expl)
                .with_detail(Explanation::new(
                    coord_factor,
                    format!("coord({coord}/{max_coord})"),
                )),
        )
    }

    fn scores_docs_out_of_order(&self) -> bool {
        if !self.allow_docs_out_of_order {
            return false;
        }
        let mut prohibited = 0;
        for (clause, _) in &self.clauses {
            match clause.occur {
                Occur::Must => return false,
                Occur::MustNot => prohibited += 1,
                Occur::Should => {}
            }
        }
        prohibited <= MAX_PROHIBITED_CLAUSES
    }
}
