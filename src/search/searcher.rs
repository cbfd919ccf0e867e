//! Searchers: rewrite, weight, per-segment scoring and collection.

use std::fmt::Debug;
use std::sync::Arc;

use log::{debug, trace};

use crate::config::SearchConfig;
use crate::error::{Result, TesseraError};
use crate::index::reader::{leaves, sub_index};
use crate::index::{DocId, IndexReader, NO_MORE_DOCS, Term};
use crate::query::Query;
use crate::search::collector::{Collector, TopScoreDocCollector};
use crate::search::explanation::Explanation;
use crate::search::field_cache::FieldCache;
use crate::search::filter::Filter;
use crate::search::similarity::{DefaultSimilarity, Similarity};
use crate::search::sort::{Sort, TopFieldCollector};
use crate::search::top_docs::{TopDocs, TopFieldDocs};
use crate::search::weight::Weight;

/// Everything a search needs besides the index: configuration, the scoring
/// functions and the field value cache.
#[derive(Debug, Clone)]
pub struct SearchContext {
    /// Limits and rewrite tuning.
    pub config: SearchConfig,
    /// Scoring functions.
    pub similarity: Arc<dyn Similarity>,
    /// Parsed field values for sorting and range filters.
    pub field_cache: Arc<FieldCache>,
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

impl SearchContext {
    /// A context with the default similarity and an empty field cache.
    pub fn new(config: SearchConfig) -> Self {
        SearchContext {
            config,
            similarity: Arc::new(DefaultSimilarity),
            field_cache: Arc::new(FieldCache::new()),
        }
    }

    /// Replace the scoring functions.
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }
}

/// Collection statistics a weight is computed against.
pub trait Searcher: Send + Sync + Debug {
    /// Number of documents containing `term`.
    fn doc_freq(&self, term: &Term) -> Result<u32>;

    /// One greater than the largest document id.
    fn max_doc(&self) -> DocId;

    /// Configuration and scoring functions.
    fn context(&self) -> &SearchContext;

    /// Shortcut for the context's similarity.
    fn similarity(&self) -> &dyn Similarity {
        self.context().similarity.as_ref()
    }

    /// Shortcut for the context's configuration.
    fn config(&self) -> &SearchConfig {
        &self.context().config
    }
}

/// A searcher that can run queries.
///
/// The low-level methods take an already normalized [`Weight`]; the
/// query-level ones rewrite, build the weight and delegate.
pub trait Searchable: Searcher {
    /// Rewrite a query into primitive queries, to a fixed point.
    fn rewrite(&self, query: &Query) -> Result<Query>;

    /// Feed every match to `collector`.
    fn search_weight(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        collector: &mut dyn Collector,
    ) -> Result<()>;

    /// The best `n` hits by score.
    fn search_top_docs(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        n: usize,
    ) -> Result<TopDocs>;

    /// The best `n` hits under `sort`.
    fn search_top_field_docs(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        n: usize,
        sort: &Sort,
    ) -> Result<TopFieldDocs>;

    /// Explain how `doc` scores against a weight.
    fn explain_weight(&self, weight: &dyn Weight, doc: DocId) -> Result<Explanation>;

    /// Rewrite `query` and build its normalized weight.
    fn create_weight(&self, query: &Query) -> Result<Box<dyn Weight>>
    where
        Self: Sized,
    {
        let rewritten = self.rewrite(query)?;
        rewritten.weight(self)
    }

    /// Top `n` hits of `query`.
    fn search(&self, query: &Query, filter: Option<&dyn Filter>, n: usize) -> Result<TopDocs>
    where
        Self: Sized,
    {
        let weight = self.create_weight(query)?;
        self.search_top_docs(weight.as_ref(), filter, n)
    }

    /// Top `n` hits of `query` under `sort`.
    fn search_sorted(
        &self,
        query: &Query,
        filter: Option<&dyn Filter>,
        n: usize,
        sort: &Sort,
    ) -> Result<TopFieldDocs>
    where
        Self: Sized,
    {
        let weight = self.create_weight(query)?;
        self.search_top_field_docs(weight.as_ref(), filter, n, sort)
    }

    /// Feed every match of `query` to `collector`.
    fn search_with_collector(
        &self,
        query: &Query,
        filter: Option<&dyn Filter>,
        collector: &mut dyn Collector,
    ) -> Result<()>
    where
        Self: Sized,
    {
        let weight = self.create_weight(query)?;
        self.search_weight(weight.as_ref(), filter, collector)
    }

    /// Explain how `doc` scores against `query`.
    fn explain(&self, query: &Query, doc: DocId) -> Result<Explanation>
    where
        Self: Sized,
    {
        let weight = self.create_weight(query)?;
        self.explain_weight(weight.as_ref(), doc)
    }
}

/// Searches a single reader, segment by segment.
#[derive(Debug, Clone)]
pub struct IndexSearcher {
    reader: Arc<dyn IndexReader>,
    leaves: Vec<(Arc<dyn IndexReader>, DocId)>,
    starts: Vec<DocId>,
    context: SearchContext,
}

impl IndexSearcher {
    /// Search `reader` with the default configuration.
    pub fn new(reader: Arc<dyn IndexReader>) -> Self {
        Self::with_context(reader, SearchContext::default())
    }

    /// Search `reader` with the given configuration.
    pub fn with_config(reader: Arc<dyn IndexReader>, config: SearchConfig) -> Self {
        Self::with_context(reader, SearchContext::new(config))
    }

    /// Search `reader` sharing an existing context.
    pub fn with_context(reader: Arc<dyn IndexReader>, context: SearchContext) -> Self {
        let leaves = leaves(&reader);
        let starts = leaves.iter().map(|(_, base)| *base).collect();
        IndexSearcher {
            reader,
            leaves,
            starts,
            context,
        }
    }

    /// Replace the scoring functions.
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.context.similarity = similarity;
        self
    }

    /// The searched reader.
    pub fn reader(&self) -> &Arc<dyn IndexReader> {
        &self.reader
    }

    fn check_n(&self, n: usize) -> Result<usize> {
        if n == 0 {
            return Err(TesseraError::invalid_argument("number of hits must be > 0"));
        }
        Ok(n.min(self.reader.max_doc().max(0) as usize))
    }
}

impl Searcher for IndexSearcher {
    fn doc_freq(&self, term: &Term) -> Result<u32> {
        self.reader.doc_freq(term)
    }

    fn max_doc(&self) -> DocId {
        self.reader.max_doc()
    }

    fn context(&self) -> &SearchContext {
        &self.context
    }
}

impl Searchable for IndexSearcher {
    fn rewrite(&self, query: &Query) -> Result<Query> {
        let max_iterations = self.context.config.max_rewrite_iterations;
        let mut current = query.clone();
        for _ in 0..max_iterations {
            match current.rewrite(self.reader.as_ref(), &self.context.config)? {
                Some(rewritten) => {
                    trace!("rewrote {current} to {rewritten}");
                    current = rewritten;
                }
                None => return Ok(current),
            }
        }
        Err(TesseraError::query(format!(
            "query did not reach a fixed point after {max_iterations} rewrites: {query}"
        )))
    }

    fn search_weight(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        collector: &mut dyn Collector,
    ) -> Result<()> {
        for (leaf, base) in &self.leaves {
            collector.set_next_reader(leaf, *base)?;
            match filter {
                None => {
                    let in_order = !collector.accepts_docs_out_of_order();
                    if let Some(mut scorer) = weight.scorer(leaf, in_order, true)? {
                        scorer.score_all(collector)?;
                    }
                }
                Some(filter) => {
                    search_with_filter(leaf, weight, filter, &self.context, collector)?;
                }
            }
        }
        Ok(())
    }

    fn search_top_docs(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        n: usize,
    ) -> Result<TopDocs> {
        let n = self.check_n(n)?;
        if n == 0 {
            return Ok(TopDocs::empty());
        }
        let mut collector = TopScoreDocCollector::new(n, !weight.scores_docs_out_of_order());
        self.search_weight(weight, filter, &mut collector)?;
        let top = collector.top_docs();
        debug!(
            "search matched {} docs, returning {}",
            top.total_hits,
            top.score_docs.len()
        );
        Ok(top)
    }

    fn search_top_field_docs(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        n: usize,
        sort: &Sort,
    ) -> Result<TopFieldDocs> {
        let n = self.check_n(n)?;
        let mut collector = TopFieldCollector::new(
            sort.clone(),
            n,
            Arc::clone(&self.context.field_cache),
            true,
            !weight.scores_docs_out_of_order(),
        );
        self.search_weight(weight, filter, &mut collector)?;
        Ok(collector.top_docs())
    }

    fn explain_weight(&self, weight: &dyn Weight, doc: DocId) -> Result<Explanation> {
        if doc < 0 || doc >= self.reader.max_doc() {
            return Err(TesseraError::invalid_argument(format!(
                "doc {doc} out of range [0, {})",
                self.reader.max_doc()
            )));
        }
        let idx = sub_index(doc, &self.starts);
        let (leaf, base) = &self.leaves[idx];
        weight.explain(leaf, doc - base)
    }
}

/// Merge-join a segment's scorer with the filter's documents.
fn search_with_filter(
    reader: &Arc<dyn IndexReader>,
    weight: &dyn Weight,
    filter: &dyn Filter,
    ctx: &SearchContext,
    collector: &mut dyn Collector,
) -> Result<()> {
    let Some(mut scorer) = weight.scorer(reader, true, false)? else {
        return Ok(());
    };
    let set = filter.doc_id_set(reader, ctx)?;
    if set.is_empty() {
        return Ok(());
    }
    let mut filter_iter = set.iterator();
    let needs_scores = collector.needs_scores();

    let mut filter_doc = filter_iter.next()?;
    let mut scorer_doc = scorer.advance(filter_doc)?;
    loop {
        if scorer_doc == filter_doc {
            if scorer_doc == NO_MORE_DOCS {
                break;
            }
            let score = if needs_scores { scorer.score()? } else { 0.0 };
            collector.collect(scorer_doc, score)?;
            filter_doc = filter_iter.next()?;
            scorer_doc = scorer.advance(filter_doc)?;
        } else if scorer_doc > filter_doc {
            filter_doc = filter_iter.advance(scorer_doc)?;
        } else {
            scorer_doc = scorer.advance(filter_doc)?;
        }
    }
    Ok(())
}
