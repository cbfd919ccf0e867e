//! Criterion benchmarks for the tessera query core.
//!
//! Covers the main scoring paths:
//! - Term and boolean queries, in order and bucketed
//! - Exact and sloppy phrases
//! - Multi-term rewrites
//! - Sorted and parallel searches

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use tessera::prelude::*;
use tessera::search::SortKind;

const WORDS: [&str; 24] = [
    "search", "engine", "full", "text", "index", "query", "document", "field", "term", "phrase",
    "boolean", "score", "relevance", "ranking", "posting", "segment", "merge", "norm", "weight",
    "filter", "collector", "heap", "slop", "boost",
];

/// Generate documents with a pseudo-random word distribution.
fn generate_documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            let length = 20 + (i % 60);
            let text: Vec<&str> = (0..length)
                .map(|j| WORDS[(i * 7 + j * 13 + j / 5) % WORDS.len()])
                .collect();
            Document::new()
                .add_text("body", text.join(" "))
                .add_keyword("rank", (i % 1000).to_string())
        })
        .collect()
}

fn reader(count: usize) -> Arc<dyn IndexReader> {
    Arc::new(MemoryIndex::from_documents(generate_documents(count)))
}

fn term(text: &str) -> Query {
    TermQuery::new(Term::new("body", text)).into()
}

fn disjunction(words: &[&str]) -> Query {
    let mut query = BooleanQuery::new();
    for word in words {
        query
            .add(term(word), Occur::Should)
            .expect("clause limit");
    }
    query.into()
}

/// Benchmark term and boolean scoring.
fn bench_boolean(c: &mut Criterion) {
    let mut group = c.benchmark_group("boolean");
    let reader = reader(10_000);
    let bucketed = IndexSearcher::new(Arc::clone(&reader));
    let in_order =
        IndexSearcher::with_config(reader, SearchConfig::default().with_docs_out_of_order(false));

    let single = term("posting");
    group.bench_function("term", |b| {
        b.iter(|| black_box(bucketed.search(black_box(&single), None, 10).unwrap()))
    });

    let or = disjunction(&["search", "engine", "slop"]);
    group.bench_function("disjunction_bucketed", |b| {
        b.iter(|| black_box(bucketed.search(black_box(&or), None, 10).unwrap()))
    });
    group.bench_function("disjunction_in_order", |b| {
        b.iter(|| black_box(in_order.search(black_box(&or), None, 10).unwrap()))
    });

    let mut and = BooleanQuery::new();
    and.add(term("search"), Occur::Must).expect("clause limit");
    and.add(term("engine"), Occur::Must).expect("clause limit");
    and.add(term("heap"), Occur::MustNot).expect("clause limit");
    let and: Query = and.into();
    group.bench_function("conjunction_excluding", |b| {
        b.iter(|| black_box(in_order.search(black_box(&and), None, 10).unwrap()))
    });

    let mut msm = BooleanQuery::new().with_minimum_should_match(2);
    for word in ["score", "norm", "boost", "heap"] {
        msm.add(term(word), Occur::Should).expect("clause limit");
    }
    let msm: Query = msm.into();
    group.bench_function("minimum_should_match", |b| {
        b.iter(|| black_box(in_order.search(black_box(&msm), None, 10).unwrap()))
    });

    group.finish();
}

/// Benchmark exact and sloppy phrase scoring.
fn bench_phrase(c: &mut Criterion) {
    let mut group = c.benchmark_group("phrase");
    let searcher = IndexSearcher::new(reader(10_000));

    let exact: Query = PhraseQuery::from_phrase("body", "search engine").into();
    group.bench_function("exact", |b| {
        b.iter(|| black_box(searcher.search(black_box(&exact), None, 10).unwrap()))
    });

    let sloppy: Query = PhraseQuery::from_phrase("body", "search engine term")
        .with_slop(4)
        .into();
    group.bench_function("sloppy", |b| {
        b.iter(|| black_box(searcher.search(black_box(&sloppy), None, 10).unwrap()))
    });

    group.finish();
}

/// Benchmark rewrites of prefix, wildcard and fuzzy queries.
fn bench_multi_term(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_term");
    let searcher = IndexSearcher::new(reader(5_000));

    let prefix: Query = PrefixQuery::new(Term::new("body", "s")).into();
    group.bench_function("prefix_auto", |b| {
        b.iter(|| black_box(searcher.search(black_box(&prefix), None, 10).unwrap()))
    });

    let scoring: Query = PrefixQuery::new(Term::new("body", "s"))
        .with_rewrite_method(RewriteMethod::ScoringBoolean)
        .into();
    group.bench_function("prefix_scoring_boolean", |b| {
        b.iter(|| black_box(searcher.search(black_box(&scoring), None, 10).unwrap()))
    });

    let wildcard: Query = WildcardQuery::new(Term::new("body", "*e?t"))
        .expect("valid pattern")
        .into();
    group.bench_function("wildcard", |b| {
        b.iter(|| black_box(searcher.search(black_box(&wildcard), None, 10).unwrap()))
    });

    let fuzzy: Query = FuzzyQuery::with_defaults(Term::new("body", "serch")).into();
    group.bench_function("fuzzy", |b| {
        b.iter(|| black_box(searcher.search(black_box(&fuzzy), None, 10).unwrap()))
    });

    group.finish();
}

/// Benchmark field sorting and searches spread over several parts.
fn bench_sorted_and_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_and_parallel");
    group.sample_size(20);

    let query = disjunction(&["search", "ranking"]);
    let sort = Sort::new(vec![
        SortField::new("rank", SortKind::Int).expect("field sort"),
    ])
    .expect("sort");

    let single = IndexSearcher::new(reader(20_000));
    group.bench_function("sorted_by_int", |b| {
        b.iter(|| black_box(single.search_sorted(&query, None, 10, &sort).unwrap()))
    });

    let parts: Vec<Arc<dyn Searchable>> = (0..4)
        .map(|_| Arc::new(IndexSearcher::new(reader(5_000))) as Arc<dyn Searchable>)
        .collect();
    let sequential = MultiSearcher::new(parts.clone());
    let parallel = ParallelMultiSearcher::new(parts).expect("thread pool");

    group.throughput(Throughput::Elements(20_000));
    group.bench_function("multi_searcher", |b| {
        b.iter(|| black_box(sequential.search(black_box(&query), None, 10).unwrap()))
    });
    group.bench_function("parallel_multi_searcher", |b| {
        b.iter(|| black_box(parallel.search(black_box(&query), None, 10).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_boolean,
    bench_phrase,
    bench_multi_term,
    bench_sorted_and_parallel
);

criterion_main!(benches);
