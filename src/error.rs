//! Error types for the Tessera library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`TesseraError`] enum. Query-construction problems surface eagerly as
//! [`TesseraError::InvalidQuery`] or [`TesseraError::InvalidArgument`];
//! problems found while searching carry enough context to tell a timeout or a
//! failed sub-search apart from a legitimately empty result.
//!
//! # Examples
//!
//! ```
//! use tessera::error::{Result, TesseraError};
//!
//! fn check_slop(slop: i64) -> Result<u32> {
//!     u32::try_from(slop).map_err(|_| TesseraError::invalid_argument("slop must be >= 0"))
//! }
//!
//! assert!(check_slop(-1).is_err());
//! ```

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::index::DocId;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// I/O errors raised by an index reader implementation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors (missing field data, unparsable cached values).
    #[error("Index error: {0}")]
    Index(String),

    /// A query tree that can never be evaluated.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An argument outside its accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A boolean composition exceeded the configured clause limit.
    #[error("Too many boolean clauses: maximum is {max}")]
    TooManyClauses {
        /// The limit that was exceeded.
        max: usize,
    },

    /// The operation is not supported by this component.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A component was used out of its required protocol order.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The time-limited collector ran out of time.
    #[error("Elapsed time {elapsed:?} exceeded allowed search time {allowed:?}; last doc collected: {last_doc}")]
    TimeExceeded {
        /// The last document id (in the searcher's id space) that was collected.
        last_doc: DocId,
        /// Time spent before the limit was noticed.
        elapsed: Duration,
        /// The configured limit.
        allowed: Duration,
    },

    /// A worker failed during a fan-out search.
    #[error("Sub-search {index} failed: {source}")]
    SubSearch {
        /// Position of the failing sub-searcher.
        index: usize,
        /// The underlying failure.
        #[source]
        source: Box<TesseraError>,
    },

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with TesseraError.
pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        TesseraError::Index(msg.into())
    }

    /// Create a new invalid query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidQuery(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(msg.into())
    }

    /// Create a new unsupported operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        TesseraError::Unsupported(msg.into())
    }

    /// Create a new illegal state error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        TesseraError::IllegalState(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(format!("Internal error: {}", msg.into()))
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(msg.into())
    }

    /// Create a too-many-clauses error for the given limit.
    pub fn too_many_clauses(max: usize) -> Self {
        TesseraError::TooManyClauses { max }
    }

    /// Whether this error reports an exceeded time budget.
    pub fn is_timeout(&self) -> bool {
        match self {
            TesseraError::TimeExceeded { .. } => true,
            TesseraError::SubSearch { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TesseraError::index("missing norms");
        assert_eq!(error.to_string(), "Index error: missing norms");

        let error = TesseraError::query("phrase terms span two fields");
        assert_eq!(error.to_string(), "Invalid query: phrase terms span two fields");

        let error = TesseraError::too_many_clauses(1024);
        assert_eq!(error.to_string(), "Too many boolean clauses: maximum is 1024");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "segment gone");
        let error = TesseraError::from(io_error);

        match error {
            TesseraError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }
    }

    #[test]
    fn test_timeout_is_distinguishable() {
        let timeout = TesseraError::TimeExceeded {
            last_doc: 42,
            elapsed: Duration::from_millis(12),
            allowed: Duration::from_millis(10),
        };
        assert!(timeout.is_timeout());
        assert!(timeout.to_string().contains("last doc collected: 42"));

        let wrapped = TesseraError::SubSearch {
            index: 1,
            source: Box::new(timeout),
        };
        assert!(wrapped.is_timeout());
        assert!(!TesseraError::other("boom").is_timeout());
    }
}
