//! Index-side collaborators of the query core.
//!
//! The scoring core only needs a narrow view of an index: posting-list
//! cursors, document frequencies, ordered term enumeration and per-field norm
//! bytes. [`reader::IndexReader`] is that contract; [`memory::MemoryIndex`] is
//! an in-memory segment implementing it and [`multi::MultiReader`] composes
//! several segments into one id space.

pub mod document;
pub mod memory;
pub mod multi;
pub mod reader;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use document::{Document, Field};
pub use memory::{MemoryIndex, MemoryIndexBuilder};
pub use multi::MultiReader;
pub use reader::{IndexReader, PostingIterator, TermStats};

/// Dense document identifier within one reader's numbering space.
pub type DocId = i32;

/// Sentinel returned by exhausted iterators; greater than every real id.
pub const NO_MORE_DOCS: DocId = i32::MAX;

/// Position of an iterator that has not been advanced yet.
pub const NOT_STARTED: DocId = -1;

/// A (field, text) pair naming one indexed token.
///
/// Ordering is lexicographic by field, then text, which is also the order of
/// term enumeration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    field: String,
    text: String,
}

impl Term {
    /// Create a new term.
    pub fn new<F, T>(field: F, text: T) -> Self
    where
        F: Into<String>,
        T: Into<String>,
    {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Get the field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Get the term text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// A term in the same field with different text.
    pub fn with_text<T: Into<String>>(&self, text: T) -> Self {
        Term {
            field: self.field.clone(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_ordering() {
        let a = Term::new("body", "fox");
        let b = Term::new("body", "quick");
        let c = Term::new("title", "apple");
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.with_text("quick"), b);
        assert_eq!(c.to_string(), "title:apple");
    }

    #[test]
    fn test_sentinels() {
        assert!(NO_MORE_DOCS > 1_000_000);
        assert!(NOT_STARTED < 0);
    }
}
