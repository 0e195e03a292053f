//! Query execution: scoring, accumulation, pruning and collection

mod accumulator;
mod collector;
mod daat;
mod maxscore;
pub mod scoring;
mod searcher;
#[cfg(test)]
mod strategy_tests;
mod taat;

pub use accumulator::{ACC_BLOCK_SIZE, AccumulatorArray};
pub use collector::{SearchHit, TopKCollector};
pub use maxscore::MaxScorePartition;
pub use scoring::{BM25_B, BM25_K1, QL_MU, ScoringKind, TermScorer, TermStats, bm25_idf};
pub use searcher::{SearchRequest, Searcher, Strategy};
