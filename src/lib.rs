//! Quiver - a block-compressed inverted-index query engine
//!
//! This library stores compressed posting lists per term and executes
//! ranked top-k retrieval over them:
//! - Bitpacked posting lists split into fixed-capacity blocks with
//!   per-block skip info and score upper bounds
//! - Succinct compact tables for per-document statistics and offset
//!   directories
//! - Term-at-a-time, exact document-at-a-time, and MaxScore-pruned
//!   retrieval over one shared bounded top-k heap
//! - Immutable indexes published by atomic swap, shared freely across
//!   concurrent queries

pub mod error;
pub mod index;
pub mod query;
pub mod structures;

pub use error::{Error, Result};

// Re-exports from structures
pub use structures::{
    CompactTable, CompactTableCursor, Posting, PostingCursor, PostingListBuilder, PostingListView,
    TERMINATED, block_count, block_index,
};

// Re-exports from index
pub use index::{IndexBuilder, IndexHandle, IndexProperties, InvertedIndex, ScoreBounds, TermEntry};

// Re-exports from query
pub use query::{
    AccumulatorArray, ScoringKind, SearchHit, SearchRequest, Searcher, Strategy, TopKCollector,
};

/// Document identifier, local to one index
pub type DocId = u32;
/// Term identifier assigned at build time
pub type TermId = u32;
/// Within-document term frequency
pub type TermFreq = u32;
/// Retrieval score
pub type Score = f32;
