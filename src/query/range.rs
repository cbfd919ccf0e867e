//! Range query implementation for querying terms within lexicographic
//! bounds.

use std::fmt;

use crate::error::{Result, TesseraError};
use crate::index::IndexReader;
use crate::query::boost_suffix;
use crate::query::multi_term::{EnumeratedTerm, MultiTermSource, RewriteMethod};

/// A query that matches documents containing a term of `field` between two
/// bounds, compared as strings. A missing bound leaves that side open.
#[derive(Debug, Clone, PartialEq)]
pub struct TermRangeQuery {
    field: String,
    lower: Option<String>,
    upper: Option<String>,
    include_lower: bool,
    include_upper: bool,
    rewrite_method: RewriteMethod,
    boost: f32,
}

impl TermRangeQuery {
    /// Create a new range query.
    ///
    /// Fails when the range is empty by construction: the lower bound sorts
    /// after the upper one, or both are equal and either is exclusive.
    pub fn new<F: Into<String>>(
        field: F,
        lower: Option<&str>,
        upper: Option<&str>,
        include_lower: bool,
        include_upper: bool,
    ) -> Result<Self> {
        let field = field.into();
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi || (lo == hi && !(include_lower && include_upper)) {
                let range = Self::render_bounds(lower, upper, include_lower, include_upper);
                return Err(TesseraError::invalid_argument(format!(
                    "empty term range {field}:{range}"
                )));
            }
        }
        Ok(TermRangeQuery {
            field,
            lower: lower.map(str::to_string),
            upper: upper.map(str::to_string),
            // An open side includes everything on that side.
            include_lower: include_lower || lower.is_none(),
            include_upper: include_upper || upper.is_none(),
            rewrite_method: RewriteMethod::default(),
            boost: 1.0,
        })
    }

    /// The lower bound, if any.
    pub fn lower(&self) -> Option<&str> {
        self.lower.as_deref()
    }

    /// The upper bound, if any.
    pub fn upper(&self) -> Option<&str> {
        self.upper.as_deref()
    }

    /// Whether the lower bound itself matches.
    pub fn includes_lower(&self) -> bool {
        self.include_lower
    }

    /// Whether the upper bound itself matches.
    pub fn includes_upper(&self) -> bool {
        self.include_upper
    }

    /// Set the rewrite method.
    pub fn with_rewrite_method(mut self, method: RewriteMethod) -> Self {
        self.rewrite_method = method;
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

    fn render_bounds(
        lower: Option<&str>,
        upper: Option<&str>,
        include_lower: bool,
        include_upper: bool,
    ) -> String {
        format!(
            "{}{} TO {}{}",
            if include_lower { '[' } else { '{' },
            lower.unwrap_or("*"),
            upper.unwrap_or("*"),
            if include_upper { ']' } else { '}' },
        )
    }
}

impl MultiTermSource for TermRangeQuery {
    fn field(&self) -> &str {
        &self.field
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn rewrite_method(&self) -> RewriteMethod {
        self.rewrite_method
    }

    fn term_enum<'a>(
        &'a self,
        reader: &'a dyn IndexReader,
    ) -> Result<Box<dyn Iterator<Item = EnumeratedTerm> + 'a>> {
        let start = self.lower.as_deref().unwrap_or("");
        let terms = reader
            .terms(&self.field, start)?
            .skip_while(move |stats| !self.include_lower && stats.term.text() == start)
            .take_while(move |stats| match self.upper.as_deref() {
                Some(upper) => {
                    let text = stats.term.text();
                    text < upper || (self.include_upper && text == upper)
                }
                None => true,
            })
            .map(|stats| EnumeratedTerm::exact(stats.term, stats.doc_freq));
        Ok(Box::new(terms))
    }
}

impl fmt::Display for TermRangeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{}",
            self.field,
            Self::render_bounds(
                self.lower.as_deref(),
                self.upper.as_deref(),
                self.include_lower,
                self.include_upper
            ),
            boost_suffix(self.boost)
        )
    }
}
