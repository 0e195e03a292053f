//! Cross-strategy retrieval tests
//!
//! The three strategies must return identical top-k sets and scores for
//! any corpus, query and k; they may differ only in postings visited.
//! Exercised here on hand-built corpora and randomized ones.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use rand::prelude::*;

use crate::error::Error;
use crate::index::IndexBuilder;
use crate::query::{ScoringKind, SearchHit, SearchRequest, Searcher, Strategy};

const ALL_STRATEGIES: [Strategy; 3] = [
    Strategy::TermAtATime,
    Strategy::ExactMerge,
    Strategy::MaxScore,
];

const ALL_SCORINGS: [ScoringKind; 3] = [
    ScoringKind::Frequency,
    ScoringKind::Bm25,
    ScoringKind::QueryLikelihood,
];

fn build_index(num_docs: u32, block_size: usize, terms: &[(&str, Vec<(u32, u32)>)]) -> Searcher {
    let mut builder = IndexBuilder::new(num_docs)
        .with_block_size(block_size)
        .unwrap()
        .score_with(ScoringKind::Bm25)
        .score_with(ScoringKind::QueryLikelihood);
    for (name, postings) in terms {
        builder.add_term(name, postings).unwrap();
    }
    Searcher::new(Arc::new(builder.build().unwrap()))
}

fn assert_identical(results: &[Vec<SearchHit>]) {
    for other in &results[1..] {
        assert_eq!(results[0].len(), other.len(), "result set sizes differ");
        for (a, b) in results[0].iter().zip(other) {
            assert_eq!(a.doc_id, b.doc_id, "result sets differ");
            assert_eq!(
                a.score.to_bits(),
                b.score.to_bits(),
                "scores differ for doc {}",
                a.doc_id
            );
        }
    }
}

#[test]
fn test_worked_example_weighted_frequency() {
    let searcher = build_index(
        10,
        256,
        &[
            ("a", vec![(1, 2), (3, 1), (7, 4)]),
            ("b", vec![(2, 1), (3, 2), (9, 1)]),
        ],
    );
    for strategy in ALL_STRATEGIES {
        let request = SearchRequest::new(vec![("a".into(), 1.0), ("b".into(), 1.0)], 2)
            .with_strategy(strategy);
        let hits = searcher.search(&request).unwrap();
        assert_eq!(hits.len(), 2, "{strategy:?}");
        assert_eq!((hits[0].doc_id, hits[0].score), (7, 4.0), "{strategy:?}");
        assert_eq!((hits[1].doc_id, hits[1].score), (3, 3.0), "{strategy:?}");
    }
}

#[test]
fn test_unknown_terms_contribute_zero() {
    let searcher = build_index(10, 256, &[("a", vec![(1, 2), (4, 1)])]);
    let request = SearchRequest::new(vec![("missing".into(), 3.0), ("a".into(), 1.0)], 5);
    let hits = searcher.search(&request).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].doc_id, 1);

    // Nothing resolved at all: empty result, not an error
    let request = SearchRequest::new(vec![("missing".into(), 1.0)], 5);
    assert!(searcher.search(&request).unwrap().is_empty());
}

#[test]
fn test_invalid_requests_rejected_before_decoding() {
    let searcher = build_index(10, 256, &[("a", vec![(1, 2)])]);

    let request = SearchRequest::new(vec![("a".into(), 1.0)], 0);
    assert!(matches!(searcher.search(&request), Err(Error::Config(_))));

    let request = SearchRequest::new(vec![], 5);
    assert!(matches!(searcher.search(&request), Err(Error::Query(_))));

    let request = SearchRequest::new(vec![("a".into(), -1.0)], 5);
    assert!(matches!(searcher.search(&request), Err(Error::Query(_))));

    let request = SearchRequest::new(vec![("a".into(), f32::NAN)], 5);
    assert!(matches!(searcher.search(&request), Err(Error::Query(_))));
}

#[test]
fn test_maxscore_requires_bounds_for_scoring_function() {
    // Built with frequency bounds only
    let mut builder = IndexBuilder::new(10);
    builder.add_term("a", &[(1, 2), (5, 1)]).unwrap();
    let searcher = Searcher::new(Arc::new(builder.build().unwrap()));

    let request = SearchRequest::new(vec![("a".into(), 1.0)], 3)
        .with_scoring(ScoringKind::Bm25)
        .with_strategy(Strategy::MaxScore);
    assert!(matches!(searcher.search(&request), Err(Error::Config(_))));

    // The exhaustive strategies don't need bounds
    let request = request.with_strategy(Strategy::ExactMerge);
    assert_eq!(searcher.search(&request).unwrap().len(), 2);
}

#[test]
fn test_zero_weight_terms_are_inert() {
    let searcher = build_index(
        20,
        256,
        &[
            ("a", vec![(1, 3), (2, 1)]),
            ("b", vec![(2, 2), (9, 5)]),
        ],
    );
    let weighted = SearchRequest::new(vec![("a".into(), 1.0), ("b".into(), 0.0)], 10);
    let solo = SearchRequest::new(vec![("a".into(), 1.0)], 10);
    let mut results = Vec::new();
    for strategy in ALL_STRATEGIES {
        results.push(
            searcher
                .search(&weighted.clone().with_strategy(strategy))
                .unwrap(),
        );
    }
    assert_identical(&results);
    assert_eq!(results[0], searcher.search(&solo).unwrap());
}

#[test]
fn test_cancellation_aborts_each_strategy() {
    let postings: Vec<(u32, u32)> = (0..5000).map(|i| (i, (i % 7) + 1)).collect();
    let searcher = build_index(5000, 64, &[("a", postings.clone()), ("b", postings)]);
    let cancelled = AtomicBool::new(true);

    for strategy in ALL_STRATEGIES {
        let request =
            SearchRequest::new(vec![("a".into(), 1.0), ("b".into(), 0.5)], 10).with_strategy(strategy);
        let result = searcher.search_cancellable(&request, &cancelled);
        assert!(matches!(result, Err(Error::Cancelled)), "{strategy:?}");
    }
}

fn random_corpus(rng: &mut StdRng) -> (u32, Vec<(String, Vec<(u32, u32)>)>) {
    let num_docs = rng.gen_range(50..800);
    let num_terms = rng.gen_range(2..9);
    let mut terms = Vec::new();
    for t in 0..num_terms {
        // Mix of rare and dense terms so pruning has something to skip
        let density = *[0.02f64, 0.1, 0.4, 0.9].choose(rng).unwrap();
        let mut postings = Vec::new();
        for doc in 0..num_docs {
            if rng.gen_bool(density) {
                postings.push((doc, rng.gen_range(1..12)));
            }
        }
        if postings.is_empty() {
            postings.push((rng.gen_range(0..num_docs), 1));
        }
        terms.push((format!("t{t}"), postings));
    }
    (num_docs, terms)
}

#[test]
fn test_strategies_agree_on_random_corpora() {
    let mut rng = StdRng::seed_from_u64(0x5EED);

    for round in 0..30 {
        let (num_docs, terms) = random_corpus(&mut rng);
        let named: Vec<(&str, Vec<(u32, u32)>)> = terms
            .iter()
            .map(|(name, postings)| (name.as_str(), postings.clone()))
            .collect();
        let block_size = *[4usize, 16, 256].choose(&mut rng).unwrap();
        let searcher = build_index(num_docs, block_size, &named);

        for _ in 0..6 {
            let mut query: Vec<(String, f32)> = Vec::new();
            for (name, _) in &terms {
                if rng.gen_bool(0.7) {
                    let weight = *[0.0f32, 0.5, 1.0, 2.5].choose(&mut rng).unwrap();
                    query.push((name.clone(), weight));
                }
            }
            if query.is_empty() {
                continue;
            }
            let k = *[1usize, 2, 5, 10_000].choose(&mut rng).unwrap();
            for scoring in ALL_SCORINGS {
                let mut results = Vec::new();
                for strategy in ALL_STRATEGIES {
                    let request = SearchRequest::new(query.clone(), k)
                        .with_scoring(scoring)
                        .with_strategy(strategy);
                    results.push(searcher.search(&request).unwrap());
                }
                assert_identical(&results);
                assert!(results[0].len() <= k, "round {round}: more than k hits");
                // Results arrive sorted: descending score, ascending doc id
                for pair in results[0].windows(2) {
                    assert!(
                        pair[0].score > pair[1].score
                            || (pair[0].score == pair[1].score
                                && pair[0].doc_id < pair[1].doc_id)
                    );
                }
            }
        }
    }
}

#[test]
fn test_concurrent_queries_share_one_index() {
    let postings: Vec<(u32, u32)> = (0..2000).map(|i| (i, (i % 11) + 1)).collect();
    let sparse: Vec<(u32, u32)> = (0..2000).filter(|i| i % 13 == 0).map(|i| (i, 3)).collect();
    let searcher = build_index(2000, 128, &[("a", postings), ("b", sparse)]);

    let request = SearchRequest::new(vec![("a".into(), 1.0), ("b".into(), 2.0)], 10);
    let expected = searcher.search(&request).unwrap();

    std::thread::scope(|scope| {
        for strategy in ALL_STRATEGIES {
            let searcher = &searcher;
            let request = request.clone().with_strategy(strategy);
            let expected = &expected;
            scope.spawn(move || {
                for _ in 0..20 {
                    assert_eq!(&searcher.search(&request).unwrap(), expected);
                }
            });
        }
    });
}

#[test]
fn test_corrupt_posting_block_is_fatal_for_one_query_only() {
    use crate::index::InvertedIndex;
    use crate::structures::PostingListBuilder;

    let mut builder = IndexBuilder::new(5000).with_block_size(16).unwrap();
    builder.add_term("good", &[(3, 2), (90, 1)]).unwrap();
    let bad_postings: Vec<(u32, u32)> = (0..40).map(|i| (i * 97 + 11, (i % 4) + 1)).collect();
    builder.add_term("bad", &bad_postings).unwrap();
    let index = builder.build().unwrap();

    let mut stream = Vec::new();
    index.serialize(&mut stream).unwrap();

    // Locate the second term's encoded list inside the arena and wreck its
    // first block header (base doc id pushed past the last doc id)
    let mut list = PostingListBuilder::with_block_size(16).unwrap();
    for &(doc, tf) in &bad_postings {
        list.push(doc, tf);
    }
    let needle = list.encode().unwrap();
    let at = stream
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("encoded list not found in stream");
    stream[at + 8 + 3] = 0xFF; // high byte of the first block's base doc id

    let tampered = InvertedIndex::deserialize(&mut &stream[..]).unwrap();
    let searcher = Searcher::new(Arc::new(tampered));

    // Queries touching the broken list fail with corruption...
    let request = SearchRequest::new(vec![("good".into(), 1.0), ("bad".into(), 1.0)], 5);
    assert!(matches!(searcher.search(&request), Err(Error::Corruption(_))));

    // ...while the shared index stays valid for everything else
    let request = SearchRequest::new(vec![("good".into(), 1.0)], 5);
    assert_eq!(searcher.search(&request).unwrap().len(), 2);
}

#[test]
fn test_pruned_retrieval_matches_reference_under_adversarial_ties() {
    // Many identical frequencies produce score ties right at the heap
    // threshold, the case pruning most easily gets wrong
    let postings_a: Vec<(u32, u32)> = (0..300).map(|d| (d, 2)).collect();
    let postings_b: Vec<(u32, u32)> = (0..300).filter(|d| d % 3 == 0).map(|d| (d, 1)).collect();
    let postings_c: Vec<(u32, u32)> = (0..300).filter(|d| d % 7 == 0).map(|d| (d, 4)).collect();
    let searcher = build_index(
        300,
        16,
        &[("a", postings_a), ("b", postings_b), ("c", postings_c)],
    );

    for k in [1usize, 3, 7, 50] {
        let query = vec![("a".into(), 1.0), ("b".into(), 1.0), ("c".into(), 1.0)];
        let mut results = Vec::new();
        for strategy in ALL_STRATEGIES {
            let request = SearchRequest::new(query.clone(), k).with_strategy(strategy);
            results.push(searcher.search(&request).unwrap());
        }
        assert_identical(&results);
    }
}
