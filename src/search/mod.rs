//! Scoring core and search orchestration.

pub mod collector;
pub mod doc_id_set;
pub mod explanation;
pub mod field_cache;
pub mod filter;
pub mod multi_searcher;
pub mod scorer;
pub mod searcher;
pub mod similarity;
pub mod sort;
pub mod top_docs;
pub mod weight;

pub use self::collector::{
    Collector, PositiveScoresOnlyCollector, TimeLimitingCollector, TopScoreDocCollector,
    TotalHitCountCollector,
};
pub use self::doc_id_set::{DocIdSet, DocIdSetIterator};
pub use self::explanation::Explanation;
pub use self::field_cache::{CacheValue, FieldCache};
pub use self::filter::{
    FieldCacheRangeFilter, Filter, MultiTermQueryWrapperFilter, QueryWrapperFilter,
};
pub use self::multi_searcher::{CachedDfSource, MultiSearcher, ParallelMultiSearcher};
pub use self::scorer::{ConstantScorer, Scorer};
pub use self::searcher::{IndexSearcher, SearchContext, Searchable, Searcher};
pub use self::similarity::{DefaultSimilarity, Similarity};
pub use self::sort::{Sort, SortField, SortKind, SortValue, TopFieldCollector};
pub use self::top_docs::{FieldDoc, ScoreDoc, TopDocs, TopFieldDocs};
pub use self::weight::Weight;
