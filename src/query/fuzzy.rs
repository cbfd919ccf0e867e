//! Fuzzy query implementation for approximate string matching.
//!
//! Terms are compared with the query term by Levenshtein distance,
//! normalized by the shorter of the two lengths. Terms whose similarity
//! exceeds the minimum are kept, best first, up to the clause limit.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use log::debug;

use crate::config::SearchConfig;
use crate::error::{Result, TesseraError};
use crate::index::{IndexReader, Term};
use crate::query::boolean::{BooleanQuery, Occur};
use crate::query::multi_term::{EnumeratedTerm, MultiTermSource, RewriteMethod};
use crate::query::term::TermQuery;
use crate::query::{Query, boost_suffix};

/// Minimum similarity used when none is given.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;

/// Number of leading characters that must match exactly by default.
pub const DEFAULT_PREFIX_LENGTH: usize = 0;

/// A fuzzy query for approximate string matching.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyQuery {
    term: Term,
    min_similarity: f32,
    prefix_length: usize,
    boost: f32,
}

impl FuzzyQuery {
    /// Create a new fuzzy query.
    ///
    /// `min_similarity` must lie in `[0, 1)`.
    pub fn new(term: Term, min_similarity: f32, prefix_length: usize) -> Result<Self> {
        if !(0.0..1.0).contains(&min_similarity) {
            return Err(TesseraError::invalid_argument(format!(
                "minimum similarity must be in [0, 1), got {min_similarity}"
            )));
        }
        Ok(FuzzyQuery {
            term,
            min_similarity,
            prefix_length,
            boost: 1.0,
        })
    }

    /// Fuzzy query with the default similarity and prefix length.
    pub fn with_defaults(term: Term) -> Self {
        FuzzyQuery {
            term,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            prefix_length: DEFAULT_PREFIX_LENGTH,
            boost: 1.0,
        }
    }

    /// Get the term.
    pub fn term(&self) -> &Term {
        &self.term
    }

    /// Get the minimum similarity.
    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    /// Get the exact-match prefix length.
    pub fn prefix_length(&self) -> usize {
        self.prefix_length
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

    /// Terms no longer than `1 / (1 - min_similarity)` can only match
    /// themselves.
    fn term_long_enough(&self) -> bool {
        self.term.text().chars().count() as f32 > 1.0 / (1.0 - self.min_similarity)
    }

    /// Rewrite into a coordination-free boolean over the best matching
    /// terms, each boosted by how close it is.
    pub fn rewrite(&self, reader: &dyn IndexReader, config: &SearchConfig) -> Result<Query> {
        if !self.term_long_enough() {
            return Ok(TermQuery::new(self.term.clone())
                .with_boost(self.boost)
                .into());
        }

        let limit = config.max_clause_count;
        let mut best: BinaryHeap<Reverse<ScoredTerm>> = BinaryHeap::with_capacity(limit + 1);
        for entry in self.term_enum(reader)? {
            best.push(Reverse(ScoredTerm {
                score: entry.difference,
                term: entry.term,
            }));
            if best.len() > limit {
                best.pop();
            }
        }

        let mut query = BooleanQuery::with_coord_disabled().with_max_clause_count(limit);
        for Reverse(scored) in best.into_sorted_vec() {
            let clause = TermQuery::new(scored.term).with_boost(self.boost * scored.score);
            query.add(clause.into(), Occur::Should)?;
        }
        debug!(
            "rewrote {} into {} fuzzy terms",
            self,
            query.clauses().len()
        );
        Ok(query.into())
    }
}

/// Ordered so that the better term is greater: higher score, then the
/// smaller term.
#[derive(Debug)]
struct ScoredTerm {
    score: f32,
    term: Term,
}

impl PartialEq for ScoredTerm {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredTerm {}

impl PartialOrd for ScoredTerm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredTerm {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.term.cmp(&self.term))
    }
}

/// Edit-distance scorer for one query term, split into its exact prefix and
/// the fuzzy remainder.
struct FuzzyMatcher {
    prefix_len: usize,
    text: Vec<char>,
    min_similarity: f32,
    scale: f32,
}

impl FuzzyMatcher {
    /// Similarity of a candidate's remainder (after the shared prefix) with
    /// the query's remainder; 0 as soon as the distance is out of reach.
    fn similarity(&self, target: &[char]) -> f32 {
        let m = target.len();
        let n = self.text.len();
        let prefix = self.prefix_len as f32;
        if n == 0 || m == 0 {
            let other = if n == 0 { m } else { n };
            return if self.prefix_len == 0 {
                0.0
            } else {
                1.0 - other as f32 / prefix
            };
        }

        let max_distance =
            ((1.0 - self.min_similarity) * (n.min(m) + self.prefix_len) as f32) as usize;
        if max_distance < m.abs_diff(n) {
            return 0.0;
        }

        let mut prev: Vec<usize> = (0..=n).collect();
        let mut cur = vec![0usize; n + 1];
        for j in 1..=m {
            let tj = target[j - 1];
            cur[0] = j;
            let mut best_possible = m;
            for i in 1..=n {
                cur[i] = if self.text[i - 1] != tj {
                    cur[i - 1].min(prev[i]).min(prev[i - 1]) + 1
                } else {
                    (cur[i - 1] + 1).min(prev[i] + 1).min(prev[i - 1])
                };
                best_possible = best_possible.min(cur[i]);
            }
            if j > max_distance && best_possible > max_distance {
                return 0.0;
            }
            std::mem::swap(&mut prev, &mut cur);
        }
        1.0 - prev[n] as f32 / (self.prefix_len + n.min(m)) as f32
    }
}

impl MultiTermSource for FuzzyQuery {
    fn field(&self) -> &str {
        self.term.field()
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn rewrite_method(&self) -> RewriteMethod {
        RewriteMethod::ScoringBoolean
    }

    fn term_enum<'a>(
        &'a self,
        reader: &'a dyn IndexReader,
    ) -> Result<Box<dyn Iterator<Item = EnumeratedTerm> + 'a>> {
        let chars: Vec<char> = self.term.text().chars().collect();
        let prefix_len = self.prefix_length.min(chars.len());
        let prefix: String = chars[..prefix_len].iter().collect();
        let matcher = FuzzyMatcher {
            prefix_len,
            text: chars[prefix_len..].to_vec(),
            min_similarity: self.min_similarity,
            scale: 1.0 / (1.0 - self.min_similarity),
        };

        let terms = reader
            .terms(self.term.field(), &prefix)?
            .take_while({
                let prefix = prefix.clone();
                move |stats| stats.term.text().starts_with(&prefix)
            })
            .filter_map(move |stats| {
                let target: Vec<char> = stats.term.text().chars().skip(prefix_len).collect();
                let similarity = matcher.similarity(&target);
                (similarity > matcher.min_similarity).then(|| EnumeratedTerm {
                    difference: (similarity - matcher.min_similarity) * matcher.scale,
                    doc_freq: stats.doc_freq,
                    term: stats.term,
                })
            });
        Ok(Box::new(terms))
    }
}

impl fmt::Display for FuzzyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}~{:?}{}",
            self.term,
            self.min_similarity,
            boost_suffix(self.boost)
        )
    }
}
