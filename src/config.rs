//! Search configuration.
//!
//! Everything that used to be process-wide mutable state in classic
//! inverted-index engines (clause limits, out-of-order scoring, rewrite
//! cutoffs) lives here and is handed to a searcher at construction time.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};

/// Configuration shared by a searcher and everything it builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of clauses a boolean query may hold, including those
    /// produced by expanding multi-term queries.
    pub max_clause_count: usize,

    /// Whether boolean weights may hand out the bucket scorer when the
    /// collector accepts out-of-order documents.
    pub allow_docs_out_of_order: bool,

    /// Auto rewrite switches to a filter once this many terms are visited.
    pub auto_rewrite_term_count_cutoff: usize,

    /// Auto rewrite switches to a filter once the visited terms cover this
    /// percentage of the index's documents.
    pub auto_rewrite_doc_count_percent: f64,

    /// Upper bound on rewrite passes before a query is considered divergent.
    pub max_rewrite_iterations: usize,

    /// Thread pool size for parallel multi-searchers.
    /// If None, uses the number of CPU cores.
    pub thread_pool_size: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_clause_count: 1024,
            allow_docs_out_of_order: true,
            auto_rewrite_term_count_cutoff: 350,
            auto_rewrite_doc_count_percent: 0.1,
            max_rewrite_iterations: 64,
            thread_pool_size: None,
        }
    }
}

impl SearchConfig {
    /// Parse a configuration from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SearchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the maximum clause count.
    pub fn with_max_clause_count(mut self, max_clause_count: usize) -> Self {
        self.max_clause_count = max_clause_count;
        self
    }

    /// Allow or forbid out-of-order boolean scoring.
    pub fn with_docs_out_of_order(mut self, allow: bool) -> Self {
        self.allow_docs_out_of_order = allow;
        self
    }

    /// Set the thread pool size used by parallel searchers.
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = Some(size);
        self
    }

    /// Check every setting is inside its accepted domain.
    pub fn validate(&self) -> Result<()> {
        if self.max_clause_count == 0 {
            return Err(TesseraError::invalid_argument(
                "max_clause_count must be at least 1",
            ));
        }
        if !(0.0..=100.0).contains(&self.auto_rewrite_doc_count_percent) {
            return Err(TesseraError::invalid_argument(format!(
                "auto_rewrite_doc_count_percent must be within [0, 100], got {}",
                self.auto_rewrite_doc_count_percent
            )));
        }
        if self.max_rewrite_iterations == 0 {
            return Err(TesseraError::invalid_argument(
                "max_rewrite_iterations must be at least 1",
            ));
        }
        if self.thread_pool_size == Some(0) {
            return Err(TesseraError::invalid_argument(
                "thread_pool_size must be at least 1",
            ));
        }
        Ok(())
    }

    /// Number of worker threads a parallel searcher should start.
    pub fn effective_thread_pool_size(&self) -> usize {
        self.thread_pool_size.unwrap_or_else(num_cpus::get)
    }
}
