//! Searching several searchables as one id space.
//!
//! [`MultiSearcher`] visits its parts one after another; [`ParallelMultiSearcher`]
//! runs each part on a worker thread and merges hits into one shared heap.
//! Both weight queries against document frequencies aggregated over every
//! part, so scores match a search over a single combined index.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, warn};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::SearchConfig;
use crate::error::{Result, TesseraError};
use crate::index::reader::sub_index;
use crate::index::{DocId, Term};
use crate::query::Query;
use crate::search::collector::{Collector, OffsetCollector, TopScoreDocCollector};
use crate::search::explanation::Explanation;
use crate::search::filter::Filter;
use crate::search::searcher::{SearchContext, Searchable, Searcher};
use crate::search::sort::{Sort, SortValue, merge_field_docs};
use crate::search::top_docs::{FieldDoc, TopDocs, TopFieldDocs};
use crate::search::weight::Weight;

/// Document frequencies gathered up front, standing in for the combined
/// collection while a weight is built.
#[derive(Debug)]
pub struct CachedDfSource {
    dfs: AHashMap<Term, u32>,
    max_doc: DocId,
    context: SearchContext,
}

impl CachedDfSource {
    /// Wrap precomputed frequencies.
    pub fn new(dfs: AHashMap<Term, u32>, max_doc: DocId, context: SearchContext) -> Self {
        CachedDfSource {
            dfs,
            max_doc,
            context,
        }
    }
}

impl Searcher for CachedDfSource {
    fn doc_freq(&self, term: &Term) -> Result<u32> {
        self.dfs.get(term).copied().ok_or_else(|| {
            TesseraError::invalid_argument(format!("document frequency for {term} not cached"))
        })
    }

    fn max_doc(&self) -> DocId {
        self.max_doc
    }

    fn context(&self) -> &SearchContext {
        &self.context
    }
}

/// Searches its parts sequentially.
pub struct MultiSearcher {
    searchables: Vec<Arc<dyn Searchable>>,
    starts: Vec<DocId>,
    max_doc: DocId,
    context: SearchContext,
}

impl fmt::Debug for MultiSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiSearcher")
            .field("parts", &self.searchables.len())
            .field("starts", &self.starts)
            .field("max_doc", &self.max_doc)
            .finish()
    }
}

impl MultiSearcher {
    /// Combine searchables with the default configuration.
    pub fn new(searchables: Vec<Arc<dyn Searchable>>) -> Self {
        Self::with_context(searchables, SearchContext::default())
    }

    /// Combine searchables sharing `context` for weighting.
    pub fn with_context(searchables: Vec<Arc<dyn Searchable>>, context: SearchContext) -> Self {
        let mut starts = Vec::with_capacity(searchables.len());
        let mut max_doc = 0;
        for searchable in &searchables {
            starts.push(max_doc);
            max_doc += searchable.max_doc();
        }
        MultiSearcher {
            searchables,
            starts,
            max_doc,
            context,
        }
    }

    /// The parts.
    pub fn searchables(&self) -> &[Arc<dyn Searchable>] {
        &self.searchables
    }

    /// First id of each part.
    pub fn starts(&self) -> &[DocId] {
        &self.starts
    }

    /// Index of the part holding `doc`.
    pub fn sub_searcher(&self, doc: DocId) -> usize {
        sub_index(doc, &self.starts)
    }

    /// Id of `doc` within its part.
    pub fn sub_doc(&self, doc: DocId) -> DocId {
        doc - self.starts[self.sub_searcher(doc)]
    }

    fn aggregated_dfs(&self, query: &Query) -> Result<AHashMap<Term, u32>> {
        let mut terms = BTreeSet::new();
        query.extract_terms(&mut terms)?;
        let mut dfs = AHashMap::with_capacity(terms.len());
        for term in terms {
            let df = self.doc_freq(&term)?;
            dfs.insert(term, df);
        }
        Ok(dfs)
    }
}

impl Searcher for MultiSearcher {
    fn doc_freq(&self, term: &Term) -> Result<u32> {
        let mut total = 0;
        for searchable in &self.searchables {
            total += searchable.doc_freq(term)?;
        }
        Ok(total)
    }

    fn max_doc(&self) -> DocId {
        self.max_doc
    }

    fn context(&self) -> &SearchContext {
        &self.context
    }
}

impl Searchable for MultiSearcher {
    fn rewrite(&self, query: &Query) -> Result<Query> {
        let rewritten = self
            .searchables
            .iter()
            .map(|searchable| searchable.rewrite(query))
            .collect::<Result<Vec<_>>>()?;
        Query::combine(rewritten, &self.context.config)
    }

    fn search_weight(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        collector: &mut dyn Collector,
    ) -> Result<()> {
        for (searchable, start) in self.searchables.iter().zip(&self.starts) {
            let mut offset = OffsetCollector::new(collector, *start);
            searchable.search_weight(weight, filter, &mut offset)?;
        }
        Ok(())
    }

    fn search_top_docs(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        n: usize,
    ) -> Result<TopDocs> {
        if n == 0 {
            return Err(TesseraError::invalid_argument("number of hits must be > 0"));
        }
        let mut merged = TopScoreDocCollector::new(n, true);
        for (searchable, start) in self.searchables.iter().zip(&self.starts) {
            let docs = searchable.search_top_docs(weight, filter, n)?;
            merge_top_docs(&mut merged, docs, *start);
        }
        Ok(merged.top_docs())
    }

    fn search_top_field_docs(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        n: usize,
        sort: &Sort,
    ) -> Result<TopFieldDocs> {
        let mut parts = Vec::with_capacity(self.searchables.len());
        for (searchable, start) in self.searchables.iter().zip(&self.starts) {
            let docs = searchable.search_top_field_docs(weight, filter, n, sort)?;
            parts.push((docs, *start));
        }
        Ok(merge_sorted(parts, n, sort))
    }

    fn explain_weight(&self, weight: &dyn Weight, doc: DocId) -> Result<Explanation> {
        if doc < 0 || doc >= self.max_doc {
            return Err(TesseraError::invalid_argument(format!(
                "doc {doc} out of range [0, {})",
                self.max_doc
            )));
        }
        let idx = self.sub_searcher(doc);
        self.searchables[idx].explain_weight(weight, doc - self.starts[idx])
    }

    fn create_weight(&self, query: &Query) -> Result<Box<dyn Weight>> {
        let rewritten = self.rewrite(query)?;
        let dfs = self.aggregated_dfs(&rewritten)?;
        debug!(
            "weighting {} against {} cached document frequencies",
            rewritten,
            dfs.len()
        );
        let source = CachedDfSource::new(dfs, self.max_doc, self.context.clone());
        rewritten.weight(&source)
    }
}

/// Searches its parts concurrently on a dedicated thread pool.
pub struct ParallelMultiSearcher {
    inner: MultiSearcher,
    pool: ThreadPool,
}

impl fmt::Debug for ParallelMultiSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelMultiSearcher")
            .field("inner", &self.inner)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl ParallelMultiSearcher {
    /// Combine searchables with the default configuration.
    pub fn new(searchables: Vec<Arc<dyn Searchable>>) -> Result<Self> {
        Self::with_config(searchables, SearchConfig::default())
    }

    /// Combine searchables; the pool size comes from `config`.
    pub fn with_config(searchables: Vec<Arc<dyn Searchable>>, config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let threads = config.effective_thread_pool_size();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("parallel-search-{i}"))
            .build()
            .map_err(|e| TesseraError::internal(format!("Failed to create thread pool: {e}")))?;
        Ok(ParallelMultiSearcher {
            inner: MultiSearcher::with_context(searchables, SearchContext::new(config)),
            pool,
        })
    }

    /// The sequential searcher underneath.
    pub fn inner(&self) -> &MultiSearcher {
        &self.inner
    }

    /// Run `task` on every part in parallel; fail with the lowest-numbered
    /// part's error once all parts have finished.
    fn fan_out<F>(&self, task: F) -> Result<()>
    where
        F: Fn(usize, &Arc<dyn Searchable>, DocId) -> Result<()> + Sync,
    {
        let errors: Mutex<Vec<(usize, TesseraError)>> = Mutex::new(Vec::new());
        self.pool.scope(|scope| {
            for (index, (searchable, start)) in self
                .inner
                .searchables
                .iter()
                .zip(&self.inner.starts)
                .enumerate()
            {
                let task = &task;
                let errors = &errors;
                scope.spawn(move |_| {
                    if let Err(e) = task(index, searchable, *start) {
                        warn!("sub-search {index} failed: {e}");
                        errors.lock().push((index, e));
                    }
                });
            }
        });

        let mut errors = errors.into_inner();
        if errors.is_empty() {
            return Ok(());
        }
        errors.sort_by_key(|(index, _)| *index);
        let (index, source) = errors.swap_remove(0);
        Err(TesseraError::SubSearch {
            index,
            source: Box::new(source),
        })
    }
}

impl Searcher for ParallelMultiSearcher {
    fn doc_freq(&self, term: &Term) -> Result<u32> {
        self.inner.doc_freq(term)
    }

    fn max_doc(&self) -> DocId {
        self.inner.max_doc()
    }

    fn context(&self) -> &SearchContext {
        self.inner.context()
    }
}

impl Searchable for ParallelMultiSearcher {
    fn rewrite(&self, query: &Query) -> Result<Query> {
        self.inner.rewrite(query)
    }

    fn search_weight(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        collector: &mut dyn Collector,
    ) -> Result<()> {
        // Collectors are not shareable across threads.
        self.inner.search_weight(weight, filter, collector)
    }

    fn search_top_docs(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        n: usize,
    ) -> Result<TopDocs> {
        if n == 0 {
            return Err(TesseraError::invalid_argument("number of hits must be > 0"));
        }
        let merged = Mutex::new(TopScoreDocCollector::new(n, true));
        self.fan_out(|_, searchable, start| {
            let docs = searchable.search_top_docs(weight, filter, n)?;
            merge_top_docs(&mut merged.lock(), docs, start);
            Ok(())
        })?;
        Ok(merged.into_inner().top_docs())
    }

    fn search_top_field_docs(
        &self,
        weight: &dyn Weight,
        filter: Option<&dyn Filter>,
        n: usize,
        sort: &Sort,
    ) -> Result<TopFieldDocs> {
        let parts: Mutex<Vec<(usize, TopFieldDocs, DocId)>> = Mutex::new(Vec::new());
        self.fan_out(|index, searchable, start| {
            let docs = searchable.search_top_field_docs(weight, filter, n, sort)?;
            parts.lock().push((index, docs, start));
            Ok(())
        })?;
        let mut parts = parts.into_inner();
        parts.sort_by_key(|(index, _, _)| *index);
        Ok(merge_sorted(
            parts.into_iter().map(|(_, docs, start)| (docs, start)).collect(),
            n,
            sort,
        ))
    }

    fn explain_weight(&self, weight: &dyn Weight, doc: DocId) -> Result<Explanation> {
        self.inner.explain_weight(weight, doc)
    }

    fn create_weight(&self, query: &Query) -> Result<Box<dyn Weight>> {
        self.inner.create_weight(query)
    }
}

/// Offer a part's hits, best first, until the merged heap rejects one.
fn merge_top_docs(merged: &mut TopScoreDocCollector, docs: TopDocs, start: DocId) {
    merged.add_total_hits(docs.total_hits);
    for score_doc in docs.score_docs {
        if !merged.offer(score_doc.doc + start, score_doc.score) {
            break;
        }
    }
}

fn merge_sorted(parts: Vec<(TopFieldDocs, DocId)>, n: usize, sort: &Sort) -> TopFieldDocs {
    let mut total_hits = 0;
    let mut max_score = f32::NAN;
    let mut lists = Vec::with_capacity(parts.len());
    for (docs, start) in parts {
        total_hits += docs.total_hits;
        if !(docs.max_score <= max_score) && !docs.max_score.is_nan() {
            max_score = docs.max_score;
        }
        let rebased: Vec<FieldDoc> = docs
            .field_docs
            .into_iter()
            .map(|mut field_doc| {
                field_doc.doc += start;
                for value in &mut field_doc.fields {
                    if let SortValue::Doc(doc) = value {
                        *doc += start;
                    }
                }
                field_doc
            })
            .collect();
        lists.push(rebased);
    }
    TopFieldDocs {
        total_hits,
        field_docs: merge_field_docs(sort, lists, n),
        sort_fields: sort.fields().to_vec(),
        max_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, IndexReader, MemoryIndex, MultiReader};
    use crate::query::TermQuery;
    use crate::search::searcher::IndexSearcher;
    use crate::search::sort::{SortField, SortKind};

    fn part(texts: &[(&str, &str)]) -> Arc<dyn IndexReader> {
        Arc::new(MemoryIndex::from_documents(texts.iter().map(|(body, rank)| {
            Document::new()
                .add_text("body", *body)
                .add_keyword("rank", *rank)
        })))
    }

    fn parts() -> (Arc<dyn IndexReader>, Arc<dyn IndexReader>) {
        (
            part(&[("red fox", "3"), ("blue fox", "1"), ("red", "9")]),
            part(&[("green fox", "2"), ("red red fox", "5")]),
        )
    }

    fn term(text: &str) -> Query {
        TermQuery::new(Term::new("body", text)).into()
    }

    fn searchables(a: &Arc<dyn IndexReader>, b: &Arc<dyn IndexReader>) -> Vec<Arc<dyn Searchable>> {
        vec![
            Arc::new(IndexSearcher::new(Arc::clone(a))),
            Arc::new(IndexSearcher::new(Arc::clone(b))),
        ]
    }

    #[test]
    fn test_matches_single_combined_index() {
        let (a, b) = parts();
        let combined = IndexSearcher::new(Arc::new(MultiReader::new(vec![
            Arc::clone(&a),
            Arc::clone(&b),
        ])));
        let multi = MultiSearcher::new(searchables(&a, &b));

        let expected = combined.search(&term("red"), None, 10).unwrap();
        let actual = multi.search(&term("red"), None, 10).unwrap();
        assert_eq!(actual.total_hits, 3);
        assert_eq!(actual.doc_ids(), expected.doc_ids());
        for (x, y) in actual.score_docs.iter().zip(&expected.score_docs) {
            assert!((x.score - y.score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (a, b) = parts();
        let sequential = MultiSearcher::new(searchables(&a, &b));
        let parallel = ParallelMultiSearcher::with_config(
            searchables(&a, &b),
            SearchConfig::default().with_thread_pool_size(2),
        )
        .unwrap();

        let expected = sequential.search(&term("fox"), None, 3).unwrap();
        let actual = parallel.search(&term("fox"), None, 3).unwrap();
        assert_eq!(actual, expected);
        assert_eq!(actual.total_hits, 4);
    }

    #[test]
    fn test_sorted_merge_rebases_ids() {
        let (a, b) = parts();
        let parallel = ParallelMultiSearcher::with_config(
            searchables(&a, &b),
            SearchConfig::default().with_thread_pool_size(2),
        )
        .unwrap();
        let sort = Sort::new(vec![SortField::new("rank", SortKind::Int).unwrap()]).unwrap();
        let top = parallel.search_sorted(&term("fox"), None, 10, &sort).unwrap();
        assert_eq!(top.doc_ids(), vec![1, 3, 0, 4]);
        assert_eq!(top.total_hits, 4);
    }

    #[test]
    fn test_explain_routes_to_part() {
        let (a, b) = parts();
        let multi = MultiSearcher::new(searchables(&a, &b));
        assert_eq!(multi.sub_searcher(4), 1);
        assert_eq!(multi.sub_doc(4), 1);
        assert!(multi.explain(&term("red"), 4).unwrap().is_match());
        assert!(!multi.explain(&term("red"), 3).unwrap().is_match());
        assert!(multi.explain(&term("red"), 5).is_err());
    }

    #[test]
    fn test_unknown_df_is_an_error() {
        let source = CachedDfSource::new(AHashMap::new(), 10, SearchContext::default());
        assert!(source.doc_freq(&Term::new("body", "x")).is_err());
    }
}
