//! # Tessera
//!
//! A document-at-a-time query evaluation core for inverted-index full-text
//! search.
//!
//! ## Features
//!
//! - Term, boolean, phrase (exact and sloppy), prefix, wildcard, fuzzy,
//!   range, match-all, disjunction-max and constant-score queries
//! - Tf-idf scoring with coordination and length norms
//! - In-order and bucketed out-of-order boolean scoring
//! - Top-K collection by score or by field values, time limits, filters
//! - Explanations of every score
//! - Sequential and parallel searching over several sub-searchers
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tessera::prelude::*;
//!
//! let reader = MemoryIndex::from_documents(vec![
//!     Document::new().add_text("body", "the quick brown fox"),
//!     Document::new().add_text("body", "the lazy dog"),
//! ]);
//! let searcher = IndexSearcher::new(Arc::new(reader));
//!
//! let mut query = BooleanQuery::new();
//! query.add(TermQuery::new(Term::new("body", "fox")).into(), Occur::Should).unwrap();
//! query.add(TermQuery::new(Term::new("body", "dog")).into(), Occur::Should).unwrap();
//!
//! let top = searcher.search(&query.into(), None, 10).unwrap();
//! assert_eq!(top.total_hits, 2);
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod search;

pub mod prelude {
    pub use crate::config::SearchConfig;
    pub use crate::error::{Result, TesseraError};
    pub use crate::index::{
        DocId, Document, IndexReader, MemoryIndex, MemoryIndexBuilder, MultiReader,
        NO_MORE_DOCS, Term,
    };
    pub use crate::query::{
        BooleanQuery, ConstantScoreQuery, DisjunctionMaxQuery, FuzzyQuery, MatchAllDocsQuery,
        MultiPhraseQuery, Occur, PhraseQuery, PrefixQuery, Query, RewriteMethod, TermQuery,
        TermRangeQuery, WildcardQuery,
    };
    pub use crate::search::{
        Collector, DefaultSimilarity, Explanation, Filter, IndexSearcher, MultiSearcher,
        ParallelMultiSearcher, ScoreDoc, Searchable, Searcher, Similarity, Sort, SortField,
        TopDocs, TopScoreDocCollector,
    };
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
