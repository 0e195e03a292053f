//! All-or-nothing index construction
//!
//! The builder consumes, per term, a strictly-increasing run of
//! `(doc_id, term_freq)` pairs from the ingestion pipeline, encodes each
//! list straight into the posting arena, accumulates document lengths and
//! collection statistics, and finishes with `build()`. Every input error
//! aborts construction; a partially built index is never observable (pair
//! with `IndexHandle::replace` for live swaps).

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::query::scoring::ScoringKind;
use crate::structures::{
    CompactTable, DEFAULT_BLOCK_SIZE, DEFAULT_TABLE_BLOCK_SIZE, PostingListBuilder,
};
use crate::{DocId, TermFreq, TermId};

use super::metadata::IndexProperties;
use super::{InvertedIndex, TermEntry};

pub struct IndexBuilder {
    num_docs: u32,
    block_size: usize,
    score_functions: Vec<ScoringKind>,
    term_ids: FxHashMap<String, TermId>,
    term_names: Vec<String>,
    entries: Vec<TermEntry>,
    offsets: Vec<u64>,
    arena: Vec<u8>,
    doc_lens: Vec<u64>,
    occurrences: u64,
}

impl IndexBuilder {
    /// Start building an index over a collection of `num_docs` documents
    pub fn new(num_docs: u32) -> Self {
        Self {
            num_docs,
            block_size: DEFAULT_BLOCK_SIZE,
            score_functions: vec![ScoringKind::Frequency],
            term_ids: FxHashMap::default(),
            term_names: Vec::new(),
            entries: Vec::new(),
            offsets: Vec::new(),
            arena: Vec::new(),
            doc_lens: vec![0; num_docs as usize],
            occurrences: 0,
        }
    }

    /// Use a non-default posting block size
    pub fn with_block_size(mut self, block_size: usize) -> Result<Self> {
        // Validate eagerly so the error surfaces before any postings land
        PostingListBuilder::with_block_size(block_size)?;
        self.block_size = block_size;
        Ok(self)
    }

    /// Also precompute score bounds for `kind` at build time.
    /// Frequency bounds are always computed; the last function added
    /// becomes the active one.
    pub fn score_with(mut self, kind: ScoringKind) -> Self {
        if !self.score_functions.contains(&kind) {
            self.score_functions.push(kind);
        }
        self
    }

    /// Add one term's posting list (strictly increasing doc ids,
    /// frequencies >= 1, doc ids within the collection)
    pub fn add_term(&mut self, term: &str, postings: &[(DocId, TermFreq)]) -> Result<()> {
        if self.term_ids.contains_key(term) {
            return Err(Error::Config(format!("term '{term}' added twice")));
        }
        if postings.is_empty() {
            return Err(Error::Config(format!("term '{term}' has no postings")));
        }

        let mut list = PostingListBuilder::with_block_size(self.block_size)?;
        let mut prev: Option<DocId> = None;
        let mut collection_freq = 0u64;
        for &(doc_id, term_freq) in postings {
            if doc_id >= self.num_docs {
                return Err(Error::Config(format!(
                    "term '{term}': doc id {doc_id} outside collection of {}",
                    self.num_docs
                )));
            }
            if term_freq == 0 {
                return Err(Error::Config(format!(
                    "term '{term}': zero frequency for doc {doc_id}"
                )));
            }
            if let Some(p) = prev
                && doc_id <= p
            {
                return Err(Error::Config(format!(
                    "term '{term}': doc ids not strictly increasing at {doc_id}"
                )));
            }
            prev = Some(doc_id);
            list.push(doc_id, term_freq);
            self.doc_lens[doc_id as usize] += term_freq as u64;
            collection_freq += term_freq as u64;
        }

        let term_id = self.entries.len() as TermId;
        self.term_ids.insert(term.to_string(), term_id);
        self.term_names.push(term.to_string());
        self.offsets.push(self.arena.len() as u64);
        list.encode_into(&mut self.arena)?;
        self.entries.push(TermEntry {
            doc_freq: postings.len() as u32,
            collection_freq,
            max_score: 0.0,
        });
        self.occurrences += collection_freq;
        Ok(())
    }

    /// Finish construction. Errors abort the whole build.
    pub fn build(mut self) -> Result<InvertedIndex> {
        self.offsets.push(self.arena.len() as u64);
        let offsets = CompactTable::build(&self.offsets, true, DEFAULT_TABLE_BLOCK_SIZE)?;
        let doc_lens = CompactTable::build(&self.doc_lens, false, DEFAULT_TABLE_BLOCK_SIZE)?;

        let avg_doc_len = if self.num_docs > 0 {
            self.occurrences as f64 / self.num_docs as f64
        } else {
            0.0
        };
        let props = IndexProperties {
            documents: self.num_docs,
            avg_doc_len,
            occurrences: self.occurrences,
            block_size: self.block_size as u32,
            active_scoring: ScoringKind::Frequency,
        };

        let mut index = InvertedIndex::from_parts(
            self.term_ids,
            self.term_names,
            self.entries,
            offsets,
            self.arena,
            doc_lens,
            props,
            FxHashMap::default(),
        );
        for kind in self.score_functions {
            index.recompute_max_scores(kind)?;
        }
        log::info!(
            "built index: {} terms, {} documents, {} postings bytes",
            index.term_count(),
            index.collection_size(),
            index.postings_arena_len()
        );
        Ok(index)
    }
}

impl InvertedIndex {
    pub(crate) fn postings_arena_len(&self) -> usize {
        self.postings.len()
    }
}
