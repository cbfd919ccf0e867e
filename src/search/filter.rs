//! Filters restrict a search to a precomputed set of documents.

use std::fmt::{self, Debug};
use std::sync::Arc;

use bit_vec::BitVec;
use log::trace;

use crate::error::{Result, TesseraError};
use crate::index::{IndexReader, NO_MORE_DOCS};
use crate::query::Query;
use crate::search::doc_id_set::DocIdSet;
use crate::search::field_cache::CacheValue;
use crate::search::searcher::{IndexSearcher, SearchContext, Searchable};

/// Produces, per segment, the set of documents a search may return.
pub trait Filter: Send + Sync + Debug {
    /// Documents of a leaf reader that pass the filter.
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>, ctx: &SearchContext) -> Result<DocIdSet>;

    /// Text used when the filter is printed inside a query.
    fn description(&self) -> String;
}

/// Passes the documents a query matches, ignoring scores.
#[derive(Debug, Clone)]
pub struct QueryWrapperFilter {
    query: Query,
}

impl QueryWrapperFilter {
    /// Wrap a query.
    pub fn new(query: Query) -> Self {
        QueryWrapperFilter { query }
    }

    /// The wrapped query.
    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl Filter for QueryWrapperFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>, ctx: &SearchContext) -> Result<DocIdSet> {
        let searcher = IndexSearcher::with_context(Arc::clone(reader), ctx.clone());
        let weight = searcher.create_weight(&self.query)?;
        let Some(mut scorer) = weight.scorer(reader, true, false)? else {
            return Ok(DocIdSet::Empty);
        };

        let mut bits = BitVec::from_elem(reader.max_doc().max(0) as usize, false);
        let mut doc = scorer.next()?;
        while doc != NO_MORE_DOCS {
            bits.set(doc as usize, true);
            doc = scorer.next()?;
        }
        Ok(DocIdSet::from_bits(bits))
    }

    fn description(&self) -> String {
        format!("QueryWrapperFilter({})", self.query)
    }
}

/// Passes every document containing one of the terms a multi-term query
/// enumerates.
#[derive(Debug, Clone)]
pub struct MultiTermQueryWrapperFilter {
    query: Query,
}

impl MultiTermQueryWrapperFilter {
    /// Wrap a prefix, wildcard, fuzzy or term range query.
    pub fn new(query: Query) -> Result<Self> {
        if query.as_multi_term().is_none() {
            return Err(TesseraError::invalid_argument(format!(
                "not a multi-term query: {query}"
            )));
        }
        Ok(MultiTermQueryWrapperFilter { query })
    }

    /// The wrapped query.
    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl Filter for MultiTermQueryWrapperFilter {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>, _ctx: &SearchContext) -> Result<DocIdSet> {
        let source = self
            .query
            .as_multi_term()
            .ok_or_else(|| TesseraError::internal("multi-term filter lost its query"))?;

        let mut bits = BitVec::from_elem(reader.max_doc().max(0) as usize, false);
        let mut term_count = 0usize;
        for entry in source.term_enum(reader.as_ref())? {
            term_count += 1;
            let Some(mut docs) = reader.term_docs(&entry.term)? else {
                continue;
            };
            let mut doc = docs.next()?;
            while doc != NO_MORE_DOCS {
                bits.set(doc as usize, true);
                doc = docs.next()?;
            }
        }
        trace!(
            "multi-term filter {} visited {} terms",
            self.query, term_count
        );
        Ok(DocIdSet::from_bits(bits))
    }

    fn description(&self) -> String {
        self.query.to_string()
    }
}

/// Range filter over values parsed into the field cache, generic over the
/// cached value type.
///
/// Numeric fields treat documents without a value as 0; string fields never
/// match such documents. Deleted documents never pass.
pub struct FieldCacheRangeFilter<T: CacheValue> {
    field: String,
    lower: Option<T>,
    upper: Option<T>,
    include_lower: bool,
    include_upper: bool,
}

impl<T: CacheValue> FieldCacheRangeFilter<T> {
    /// Create a range filter; an open bound is `None`.
    pub fn new<F: Into<String>>(
        field: F,
        lower: Option<T>,
        upper: Option<T>,
        include_lower: bool,
        include_upper: bool,
    ) -> Self {
        FieldCacheRangeFilter {
            field: field.into(),
            lower,
            upper,
            include_lower,
            include_upper,
        }
    }

    /// The filtered field.
    pub fn field(&self) -> &str {
        &self.field
    }

    fn accepts(&self, value: &T) -> bool {
        let above = match &self.lower {
            Some(lower) if self.include_lower => value >= lower,
            Some(lower) => value > lower,
            None => true,
        };
        let below = match &self.upper {
            Some(upper) if self.include_upper => value <= upper,
            Some(upper) => value < upper,
            None => true,
        };
        above && below
    }
}

impl<T: CacheValue> Debug for FieldCacheRangeFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl<T: CacheValue> Filter for FieldCacheRangeFilter<T> {
    fn doc_id_set(&self, reader: &Arc<dyn IndexReader>, ctx: &SearchContext) -> Result<DocIdSet> {
        let values = ctx.field_cache.get::<T>(reader.as_ref(), &self.field)?;
        let mut bits = BitVec::from_elem(values.len(), false);
        for (doc, value) in values.iter().enumerate() {
            if let Some(value) = value {
                if self.accepts(value) && !reader.is_deleted(doc as i32) {
                    bits.set(doc, true);
                }
            }
        }
        Ok(DocIdSet::from_bits(bits))
    }

    fn description(&self) -> String {
        let bound = |value: &Option<T>| value.as_ref().map_or("*".to_string(), |v| format!("{v:?}"));
        format!(
            "{}:{}{} TO {}{}",
            self.field,
            if self.include_lower { '[' } else { '{' },
            bound(&self.lower),
            bound(&self.upper),
            if self.include_upper { ']' } else { '}' }
        )
    }
}
