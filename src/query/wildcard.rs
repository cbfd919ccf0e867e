//! Prefix and wildcard queries for pattern matching over a field's terms.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::config::SearchConfig;
use crate::error::{Result, TesseraError};
use crate::index::{IndexReader, Term};
use crate::query::multi_term::{self, EnumeratedTerm, MultiTermSource, RewriteMethod};
use crate::query::term::TermQuery;
use crate::query::{Query, boost_suffix};

/// A query that matches documents containing a term starting with a prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixQuery {
    prefix: Term,
    rewrite_method: RewriteMethod,
    boost: f32,
}

impl PrefixQuery {
    /// Create a new prefix query; the term's text is the prefix.
    pub fn new(prefix: Term) -> Self {
        PrefixQuery {
            prefix,
            rewrite_method: RewriteMethod::default(),
            boost: 1.0,
        }
    }

    /// Get the prefix term.
    pub fn prefix(&self) -> &Term {
        &self.prefix
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
}

impl MultiTermSource for PrefixQuery {
    fn field(&self) -> &str {
        self.prefix.field()
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
        let prefix = self.prefix.text();
        let terms = reader
            .terms(self.prefix.field(), prefix)?
            .take_while(move |stats| stats.term.text().starts_with(prefix))
            .map(|stats| EnumeratedTerm::exact(stats.term, stats.doc_freq));
        Ok(Box::new(terms))
    }
}

impl fmt::Display for PrefixQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.prefix, boost_suffix(self.boost))
    }
}

/// A query that matches documents containing terms that match a wildcard
/// pattern.
///
/// `*` matches any character sequence, including the empty one, and `?`
/// matches exactly one character.
#[derive(Debug, Clone)]
pub struct WildcardQuery {
    term: Term,
    /// Literal text before the first wildcard.
    literal_prefix: String,
    regex: Arc<Regex>,
    rewrite_method: RewriteMethod,
    boost: f32,
}

impl PartialEq for WildcardQuery {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term
            && self.rewrite_method == other.rewrite_method
            && self.boost == other.boost
    }
}

impl WildcardQuery {
    /// Create a new wildcard query; the term's text is the pattern.
    pub fn new(term: Term) -> Result<Self> {
        let regex = Self::compile_pattern(term.text())?;
        let literal_prefix = term
            .text()
            .split(['*', '?'])
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(WildcardQuery {
            term,
            literal_prefix,
            regex: Arc::new(regex),
            rewrite_method: RewriteMethod::default(),
            boost: 1.0,
        })
    }

    /// Get the pattern term.
    pub fn term(&self) -> &Term {
        &self.term
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

    /// Check if a term's text matches the pattern.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Compile a wildcard pattern into an anchored regex.
    fn compile_pattern(pattern: &str) -> Result<Regex> {
        let mut regex_pattern = String::with_capacity(pattern.len() + 8);
        regex_pattern.push_str("^(?s:");
        let mut literal = String::new();
        for c in pattern.chars() {
            match c {
                '*' | '?' => {
                    regex_pattern.push_str(&regex::escape(&literal));
                    literal.clear();
                    regex_pattern.push_str(if c == '*' { ".*" } else { "." });
                }
                c => literal.push(c),
            }
        }
        regex_pattern.push_str(&regex::escape(&literal));
        regex_pattern.push_str(")$");

        Regex::new(&regex_pattern).map_err(|e| {
            TesseraError::invalid_argument(format!("invalid wildcard pattern {pattern:?}: {e}"))
        })
    }

    /// A pattern without wildcards is a term query and one whose only
    /// wildcard is a trailing `*` is a prefix query; anything else expands
    /// through the rewrite method.
    pub fn rewrite(&self, reader: &dyn IndexReader, config: &SearchConfig) -> Result<Query> {
        let text = self.term.text();
        let star = text.find('*');
        let has_question = text.contains('?');
        match star {
            None if !has_question => {
                return Ok(TermQuery::new(self.term.clone())
                    .with_boost(self.boost)
                    .into());
            }
            Some(i) if !has_question && i == text.len() - 1 => {
                return Ok(PrefixQuery::new(self.term.with_text(&text[..i]))
                    .with_rewrite_method(self.rewrite_method)
                    .with_boost(self.boost)
                    .into());
            }
            _ => {}
        }
        multi_term::rewrite(self, reader, config)
    }
}

impl MultiTermSource for WildcardQuery {
    fn field(&self) -> &str {
        self.term.field()
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
        let prefix = self.literal_prefix.as_str();
        let terms = reader
            .terms(self.term.field(), prefix)?
            .take_while(move |stats| stats.term.text().starts_with(prefix))
            .filter(move |stats| self.matches(stats.term.text()))
            .map(|stats| EnumeratedTerm::exact(stats.term, stats.doc_freq));
        Ok(Box::new(terms))
    }
}

impl fmt::Display for WildcardQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.term, boost_suffix(self.boost))
    }
}
