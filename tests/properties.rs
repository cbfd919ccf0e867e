//! Property tests for the scoring core.
//!
//! Verifies:
//! 1. Scorers never move backwards and stay exhausted
//! 2. Conjunctions return exactly the intersection of their terms
//! 3. Required-excluding-prohibited returns exactly the difference
//! 4. Minimum-should-match counts matching optional clauses and scores
//!    them the same in either order
//! 5. Exact phrases match contiguous token runs
//! 6. Norm bytes round trip within the encoding's precision
//! 7. The top-K collector keeps the best K and counts every hit

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;
use tessera::prelude::*;
use tessera::search::similarity::{decode_norm, encode_norm};
use tessera::search::{DocIdSetIterator, Weight};

const VOCAB: [&str; 5] = ["ant", "bee", "cat", "dog", "eel"];

// ============================================================================
// STRATEGIES
// ============================================================================

/// Documents as token-index lists over a tiny vocabulary.
fn corpus_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0..VOCAB.len(), 1..7), 1..30)
}

fn word_strategy() -> impl Strategy<Value = usize> {
    0..VOCAB.len()
}

#[derive(Debug, Clone)]
enum Step {
    Next,
    Advance(DocId),
}

fn steps_strategy() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        prop_oneof![Just(Step::Next), (0..40i32).prop_map(Step::Advance)],
        1..40,
    )
}

// ============================================================================
// HELPERS
// ============================================================================

fn build(corpus: &[Vec<usize>]) -> (Arc<dyn IndexReader>, IndexSearcher) {
    let reader: Arc<dyn IndexReader> = Arc::new(MemoryIndex::from_documents(
        corpus.iter().map(|tokens| {
            let text: Vec<&str> = tokens.iter().map(|&t| VOCAB[t]).collect();
            Document::new().add_text("body", text.join(" "))
        }),
    ));
    let searcher = IndexSearcher::new(Arc::clone(&reader));
    (reader, searcher)
}

fn term(word: usize) -> Query {
    TermQuery::new(Term::new("body", VOCAB[word])).into()
}

fn docs_with(corpus: &[Vec<usize>], pred: impl Fn(&[usize]) -> bool) -> BTreeSet<DocId> {
    corpus
        .iter()
        .enumerate()
        .filter(|(_, tokens)| pred(tokens))
        .map(|(doc, _)| doc as DocId)
        .collect()
}

fn hits(searcher: &IndexSearcher, query: Query, corpus_len: usize) -> Result<BTreeSet<DocId>> {
    let top = searcher.search(&query, None, corpus_len.max(1))?;
    Ok(top.doc_ids().into_iter().collect())
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: doc ids only grow, and the sentinel is terminal.
    #[test]
    fn prop_scorer_is_monotone(
        corpus in corpus_strategy(),
        a in word_strategy(),
        b in word_strategy(),
        steps in steps_strategy(),
    ) {
        let (reader, searcher) = build(&corpus);
        let mut query = BooleanQuery::new();
        query.add(term(a), Occur::Should).unwrap();
        query.add(term(b), Occur::Should).unwrap();
        let weight = searcher.create_weight(&query.into()).unwrap();
        let Some(mut scorer) = weight.scorer(&reader, true, false).unwrap() else {
            return Ok(());
        };

        let mut last = -1;
        for step in steps {
            if last == NO_MORE_DOCS {
                prop_assert_eq!(scorer.next().unwrap(), NO_MORE_DOCS);
                continue;
            }
            let doc = match step {
                Step::Next => scorer.next().unwrap(),
                Step::Advance(target) => scorer.advance(target.max(last + 1)).unwrap(),
            };
            prop_assert!(doc > last, "{} after {}", doc, last);
            prop_assert_eq!(scorer.doc_id(), doc);
            last = doc;
        }
    }

    /// Property: a required conjunction matches the intersection.
    #[test]
    fn prop_conjunction_is_intersection(
        corpus in corpus_strategy(),
        words in prop::collection::vec(word_strategy(), 2..4),
    ) {
        let (_, searcher) = build(&corpus);
        let mut query = BooleanQuery::new();
        for &word in &words {
            query.add(term(word), Occur::Must).unwrap();
        }
        let expected = docs_with(&corpus, |tokens| words.iter().all(|w| tokens.contains(w)));
        prop_assert_eq!(hits(&searcher, query.into(), corpus.len()).unwrap(), expected);
    }

    /// Property: +a -b matches exactly the docs with a and without b.
    #[test]
    fn prop_and_not_is_difference(
        corpus in corpus_strategy(),
        a in word_strategy(),
        b in word_strategy(),
    ) {
        let (_, searcher) = build(&corpus);
        let mut query = BooleanQuery::new();
        query.add(term(a), Occur::Must).unwrap();
        query.add(term(b), Occur::MustNot).unwrap();
        let expected = docs_with(&corpus, |tokens| tokens.contains(&a) && !tokens.contains(&b));
        prop_assert_eq!(hits(&searcher, query.into(), corpus.len()).unwrap(), expected);
    }

    /// Property: a doc matches iff it holds at least `m` optional terms, and
    /// scores the sum of its matching clauses times coord in either order.
    #[test]
    fn prop_minimum_should_match_counts_clauses(
        corpus in corpus_strategy(),
        m in 1usize..4,
    ) {
        let reader: Arc<dyn IndexReader> = build(&corpus).0;
        let in_order = IndexSearcher::with_config(
            Arc::clone(&reader),
            SearchConfig::default().with_docs_out_of_order(false),
        );
        let bucketed = IndexSearcher::with_config(
            reader,
            SearchConfig::default().with_docs_out_of_order(true),
        );
        let words = [0, 1, 2];
        let mut query = BooleanQuery::new().with_minimum_should_match(m);
        for &word in &words {
            query.add(term(word), Occur::Should).unwrap();
        }
        let query: Query = query.into();
        let expected = docs_with(&corpus, |tokens| {
            words.iter().filter(|&&w| tokens.contains(&w)).count() >= m
        });

        let top = in_order.search(&query, None, corpus.len()).unwrap();
        let actual: BTreeSet<DocId> = top.doc_ids().into_iter().collect();
        prop_assert_eq!(actual, expected);

        let other = bucketed.search(&query, None, corpus.len()).unwrap();
        prop_assert_eq!(other.total_hits, top.total_hits);
        let other_scores: BTreeMap<DocId, f32> =
            other.score_docs.iter().map(|d| (d.doc, d.score)).collect();
        for hit in &top.score_docs {
            let score = other_scores[&hit.doc];
            prop_assert!((hit.score - score).abs() < 1e-5, "{} != {}", hit.score, score);
        }

        // Only clauses with postings take part in coordination.
        let max_coord = words
            .iter()
            .filter(|&w| corpus.iter().any(|tokens| tokens.contains(w)))
            .count();
        for hit in &top.score_docs {
            let tokens = &corpus[hit.doc as usize];
            let overlap = words.iter().filter(|&w| tokens.contains(w)).count();
            let explanation = in_order.explain(&query, hit.doc).unwrap();
            prop_assert!(explanation.is_match());
            let sum_expl = if explanation.description() == "product of:" {
                &explanation.details()[0]
            } else {
                &explanation
            };
            prop_assert_eq!(sum_expl.details().len(), overlap);
            let clause_sum: f32 = sum_expl.details().iter().map(|d| d.value()).sum();
            let coord = overlap as f32 / max_coord as f32;
            let expected_score = clause_sum * coord;
            prop_assert!(
                (hit.score - expected_score).abs() <= 1e-5 * expected_score.max(1.0),
                "doc {} scored {} but clauses give {} x {}",
                hit.doc, hit.score, clause_sum, coord
            );
        }
    }

    /// Property: an exact phrase matches docs containing the contiguous run,
    /// and re-running it reproduces the scores.
    #[test]
    fn prop_exact_phrase_matches_contiguous_runs(
        corpus in corpus_strategy(),
        phrase in prop::collection::vec(word_strategy(), 2..4),
    ) {
        let (_, searcher) = build(&corpus);
        let mut query = PhraseQuery::new();
        for &word in &phrase {
            query.add(Term::new("body", VOCAB[word])).unwrap();
        }
        let query: Query = query.into();
        let expected = docs_with(&corpus, |tokens| {
            tokens.windows(phrase.len()).any(|window| window == phrase.as_slice())
        });
        let first = searcher.search(&query, None, corpus.len()).unwrap();
        let actual: BTreeSet<DocId> = first.doc_ids().into_iter().collect();
        prop_assert_eq!(actual, expected);

        let second = searcher.search(&query, None, corpus.len()).unwrap();
        prop_assert_eq!(first.doc_ids(), second.doc_ids());
        for (x, y) in first.score_docs.iter().zip(&second.score_docs) {
            prop_assert_eq!(x.score, y.score);
        }
    }

    /// Property: decoding loses at most the low mantissa bits, and encoding
    /// preserves order.
    #[test]
    fn prop_norm_round_trip_is_bounded(f in 1e-6f32..1e9, g in 1e-6f32..1e9) {
        let decoded = decode_norm(encode_norm(f));
        prop_assert!(decoded <= f);
        prop_assert!(decoded >= f * 0.875, "{} decoded to {}", f, decoded);
        prop_assert_eq!(encode_norm(decoded), encode_norm(f));
        if f <= g {
            prop_assert!(encode_norm(f) <= encode_norm(g));
        }
    }

    /// Property: K best hits are kept and every collect is counted.
    #[test]
    fn prop_top_k_keeps_best(
        scores in prop::collection::vec(0.0f32..100.0, 0..60),
        k in 1usize..10,
    ) {
        let mut collector = TopScoreDocCollector::new(k, true);
        for (doc, &score) in scores.iter().enumerate() {
            collector.collect(doc as DocId, score).unwrap();
        }
        let top = collector.top_docs();
        prop_assert_eq!(top.total_hits, scores.len());
        prop_assert_eq!(top.score_docs.len(), k.min(scores.len()));

        let kept: BTreeSet<DocId> = top.doc_ids().into_iter().collect();
        let worst_kept = top.score_docs.iter().map(|d| d.score).fold(f32::INFINITY, f32::min);
        for (doc, &score) in scores.iter().enumerate() {
            if !kept.contains(&(doc as DocId)) {
                prop_assert!(score <= worst_kept);
            }
        }
        for pair in top.score_docs.windows(2) {
            prop_assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].doc < pair[1].doc)
            );
        }
    }
}

#[test]
fn test_norm_reference_values() {
    assert_eq!(decode_norm(encode_norm(1.0)), 1.0);
    assert_eq!(decode_norm(encode_norm(0.5)), 0.5);
    assert_eq!(encode_norm(0.0), 0);
    assert_eq!(decode_norm(0), 0.0);
    assert_eq!(encode_norm(f32::MAX), 255);
}

#[test]
fn test_reversed_pair_needs_two_moves() -> Result<()> {
    let reader: Arc<dyn IndexReader> = Arc::new(MemoryIndex::from_documents(vec![
        Document::new().add_text("body", "bee ant"),
        Document::new().add_text("body", "ant bee"),
    ]));
    let searcher = IndexSearcher::new(reader);

    let tight: Query = PhraseQuery::from_phrase("body", "ant bee").with_slop(1).into();
    assert_eq!(searcher.search(&tight, None, 10)?.doc_ids(), vec![1]);

    let loose: Query = PhraseQuery::from_phrase("body", "ant bee").with_slop(2).into();
    let top = searcher.search(&loose, None, 10)?;
    assert_eq!(top.doc_ids(), vec![1, 0]);
    assert!(top.score_docs[1].score < top.score_docs[0].score);

    let explanation = searcher.explain(&loose, 0)?;
    assert!(explanation.to_string().contains("phraseFreq=0.33333334"));
    Ok(())
}
