//! Inverted index: term dictionary, posting arena, statistics and
//! precomputed score bounds
//!
//! An `InvertedIndex` is immutable once built; any number of queries may
//! read it concurrently without locking. Posting lists live in one
//! contiguous byte arena addressed through a delta-encoded offset table,
//! per-document lengths in a compact table, and per-term / per-block score
//! upper bounds in side structures keyed by scoring function (so bounds
//! can be recomputed without touching the postings).

mod builder;
mod metadata;

pub use builder::IndexBuilder;
pub use metadata::IndexProperties;

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::query::scoring::{ScoringKind, TermScorer, TermStats};
use crate::structures::{CompactTable, PostingListView, TERMINATED};
use crate::{DocId, Score, TermId};

/// Dictionary entry for one term
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermEntry {
    /// Number of documents containing the term
    pub doc_freq: u32,
    /// Total occurrences of the term across the collection
    pub collection_freq: u64,
    /// Upper bound on the term's per-document score under the active
    /// scoring function
    pub max_score: Score,
}

/// Per-term and per-block score upper bounds for one scoring function
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBounds {
    pub(crate) term_bounds: Vec<Score>,
    /// Start of each term's run in `block_bounds` (terms + 1 entries)
    pub(crate) block_starts: Vec<u32>,
    pub(crate) block_bounds: Vec<Score>,
}

impl ScoreBounds {
    /// Upper bound on the term's score contribution anywhere in its list
    #[inline]
    pub fn term_bound(&self, term_id: TermId) -> Score {
        self.term_bounds[term_id as usize]
    }

    /// Upper bounds per block of the term's posting list
    #[inline]
    pub fn block_bounds(&self, term_id: TermId) -> &[Score] {
        let t = term_id as usize;
        &self.block_bounds[self.block_starts[t] as usize..self.block_starts[t + 1] as usize]
    }
}

pub struct InvertedIndex {
    term_ids: FxHashMap<String, TermId>,
    term_names: Vec<String>,
    entries: Vec<TermEntry>,
    /// Byte offset of each term's posting list in `postings`
    /// (terms + 1 entries, last one the arena length)
    offsets: CompactTable,
    /// Encoded posting-list arena
    postings: Vec<u8>,
    doc_lens: CompactTable,
    props: IndexProperties,
    bounds: FxHashMap<ScoringKind, ScoreBounds>,
}

impl InvertedIndex {
    pub(crate) fn from_parts(
        term_ids: FxHashMap<String, TermId>,
        term_names: Vec<String>,
        entries: Vec<TermEntry>,
        offsets: CompactTable,
        postings: Vec<u8>,
        doc_lens: CompactTable,
        props: IndexProperties,
        bounds: FxHashMap<ScoringKind, ScoreBounds>,
    ) -> Self {
        Self {
            term_ids,
            term_names,
            entries,
            offsets,
            postings,
            doc_lens,
            props,
            bounds,
        }
    }

    /// Number of documents in the collection
    pub fn collection_size(&self) -> u32 {
        self.props.documents
    }

    pub fn term_count(&self) -> usize {
        self.entries.len()
    }

    pub fn avg_doc_len(&self) -> f32 {
        self.props.avg_doc_len as f32
    }

    /// Total token occurrences across the collection
    pub fn occurrences_count(&self) -> u64 {
        self.props.occurrences
    }

    pub fn block_size(&self) -> usize {
        self.props.block_size as usize
    }

    pub fn properties(&self) -> &IndexProperties {
        &self.props
    }

    /// Look up a term. Absence is not an error: an unknown term simply
    /// contributes nothing to any query.
    pub fn lookup(&self, term: &str) -> Option<(TermId, &TermEntry)> {
        self.term_ids
            .get(term)
            .map(|&id| (id, &self.entries[id as usize]))
    }

    pub fn term_entry(&self, term_id: TermId) -> &TermEntry {
        &self.entries[term_id as usize]
    }

    pub fn term_name(&self, term_id: TermId) -> &str {
        &self.term_names[term_id as usize]
    }

    /// Length (token count) of one document
    pub fn doc_len(&self, doc_id: DocId) -> u32 {
        self.doc_lens.get(doc_id as usize) as u32
    }

    /// Per-document length table, for query-local cached cursors
    pub fn doc_lens(&self) -> &CompactTable {
        &self.doc_lens
    }

    /// Total postings across the given terms (unknown terms count zero)
    pub fn count_postings<S: AsRef<str>>(&self, terms: &[S]) -> u64 {
        terms
            .iter()
            .filter_map(|t| self.lookup(t.as_ref()))
            .map(|(_, entry)| entry.doc_freq as u64)
            .sum()
    }

    /// Open a validated view over one term's posting list.
    ///
    /// Corruption detected here aborts only the calling query; the shared
    /// index state is never mutated on this path.
    pub fn postings(&self, term_id: TermId) -> Result<PostingListView<'_>> {
        let t = term_id as usize;
        if t >= self.entries.len() {
            return Err(Error::Query(format!("term id {term_id} out of range")));
        }
        let start = self.offsets.get(t) as usize;
        let end = self.offsets.get(t + 1) as usize;
        if start > end || end > self.postings.len() {
            return Err(Error::Corruption(format!(
                "term {term_id} ({}): posting offsets {start}..{end} out of range",
                self.term_names[t]
            )));
        }
        PostingListView::open(
            &self.postings[start..end],
            self.entries[t].doc_freq,
            self.props.block_size as usize,
            self.props.documents,
            term_id,
        )
    }

    /// Statistics feeding scorer construction for one term
    pub fn term_stats(&self, term_id: TermId) -> TermStats {
        let entry = &self.entries[term_id as usize];
        TermStats {
            doc_freq: entry.doc_freq,
            collection_freq: entry.collection_freq,
            num_docs: self.props.documents,
            avg_doc_len: self.avg_doc_len(),
            occurrences: self.props.occurrences,
        }
    }

    /// Score bounds for a scoring function, if computed
    pub fn bounds_for(&self, kind: ScoringKind) -> Option<&ScoreBounds> {
        self.bounds.get(&kind)
    }

    /// The scoring function the dictionary's `max_score` fields reflect
    pub fn active_scoring(&self) -> ScoringKind {
        self.props.active_scoring
    }

    fn compute_bounds(&self, kind: ScoringKind) -> Result<ScoreBounds> {
        let nterms = self.entries.len();
        let mut term_bounds = Vec::with_capacity(nterms);
        let mut block_starts = Vec::with_capacity(nterms + 1);
        let mut block_bounds = Vec::new();
        let mut len_cursor = self.doc_lens.cursor();

        block_starts.push(0u32);
        for t in 0..nterms {
            let scorer = TermScorer::new(kind, self.term_stats(t as TermId));
            let view = self.postings(t as TermId)?;
            let nblocks = view.num_blocks();
            let run_start = block_bounds.len();
            block_bounds.resize(run_start + nblocks, 0.0);

            let mut cursor = view.into_cursor();
            let mut term_max = 0.0f32;
            while cursor.doc() != TERMINATED {
                let doc = cursor.doc();
                let tf = cursor.term_freq();
                let score = scorer.score(tf, len_cursor.get(doc as usize) as u32);
                let block = run_start + cursor.block_ordinal();
                if score > block_bounds[block] {
                    block_bounds[block] = score;
                }
                term_max = term_max.max(score);
                cursor.advance();
            }
            term_bounds.push(term_max);
            block_starts.push(block_bounds.len() as u32);
        }

        Ok(ScoreBounds {
            term_bounds,
            block_starts,
            block_bounds,
        })
    }

    /// Walk every posting list and store, per term and per block, the
    /// maximum achievable score under `kind`.
    ///
    /// Must be re-run whenever the scoring function or the collection
    /// statistics change; until then the index has no (or stale) bounds
    /// for that function and MaxScore retrieval with it is rejected.
    pub fn recompute_max_scores(&mut self, kind: ScoringKind) -> Result<()> {
        log::debug!(
            "computing max scores: function={}, terms={}",
            kind.name(),
            self.entries.len()
        );
        let bounds = self.compute_bounds(kind)?;
        for (entry, &bound) in self.entries.iter_mut().zip(&bounds.term_bounds) {
            entry.max_score = bound;
        }
        self.props.active_scoring = kind;
        self.bounds.insert(kind, bounds);
        Ok(())
    }
}

/// Atomic publication point for fully built indexes
///
/// Queries grab an `Arc` snapshot and keep using it even while a newer
/// index is swapped in; a partially built index is never observable.
pub struct IndexHandle {
    current: RwLock<Arc<InvertedIndex>>,
}

impl IndexHandle {
    pub fn new(index: InvertedIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// Snapshot of the currently published index
    pub fn get(&self) -> Arc<InvertedIndex> {
        self.current.read().clone()
    }

    /// Publish a new index, atomically replacing the previous one.
    /// In-flight queries keep their snapshot.
    pub fn replace(&self, index: InvertedIndex) -> Arc<InvertedIndex> {
        let mut guard = self.current.write();
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_index() -> InvertedIndex {
        let mut builder = IndexBuilder::new(10);
        builder.add_term("alpha", &[(1, 2), (3, 1), (7, 4)]).unwrap();
        builder.add_term("beta", &[(2, 1), (3, 2), (9, 1)]).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_lookup_and_stats() {
        let index = small_index();
        assert_eq!(index.collection_size(), 10);
        assert_eq!(index.term_count(), 2);

        let (id, entry) = index.lookup("alpha").unwrap();
        assert_eq!(index.term_name(id), "alpha");
        assert_eq!(entry.doc_freq, 3);
        assert_eq!(entry.collection_freq, 7);
        assert!(index.lookup("gamma").is_none());

        // doc 3 holds one "alpha" and two "beta"
        assert_eq!(index.doc_len(3), 3);
        assert_eq!(index.doc_len(0), 0);
        assert_eq!(index.occurrences_count(), 11);
        assert_eq!(index.count_postings(&["alpha", "beta", "gamma"]), 6);
    }

    #[test]
    fn test_postings_roundtrip() {
        let index = small_index();
        let (id, _) = index.lookup("beta").unwrap();
        let mut cursor = index.postings(id).unwrap().into_cursor();
        let mut seen = Vec::new();
        while cursor.doc() != TERMINATED {
            seen.push((cursor.doc(), cursor.term_freq()));
            cursor.advance();
        }
        assert_eq!(seen, vec![(2, 1), (3, 2), (9, 1)]);
    }

    #[test]
    fn test_frequency_bounds_dominate_postings() {
        let index = small_index();
        let bounds = index.bounds_for(ScoringKind::Frequency).unwrap();
        let (alpha, entry) = index.lookup("alpha").unwrap();
        assert_eq!(bounds.term_bound(alpha), 4.0);
        assert_eq!(entry.max_score, 4.0);
        for &b in bounds.block_bounds(alpha) {
            assert!(b <= 4.0);
        }
    }

    #[test]
    fn test_recompute_max_scores_adds_bounds() {
        let mut index = small_index();
        assert!(index.bounds_for(ScoringKind::Bm25).is_none());
        index.recompute_max_scores(ScoringKind::Bm25).unwrap();
        let bounds = index.bounds_for(ScoringKind::Bm25).unwrap();
        assert_eq!(index.active_scoring(), ScoringKind::Bm25);

        // Bounds must dominate every actual posting score
        for (term, name) in [(0u32, "alpha"), (1u32, "beta")] {
            let scorer = TermScorer::new(ScoringKind::Bm25, index.term_stats(term));
            let blocks = bounds.block_bounds(term);
            let mut cursor = index.postings(term).unwrap().into_cursor();
            while cursor.doc() != TERMINATED {
                let doc = cursor.doc();
                let score = scorer.score(cursor.term_freq(), index.doc_len(doc));
                assert!(
                    score <= bounds.term_bound(term) + f32::EPSILON,
                    "term bound violated for {name}"
                );
                assert!(score <= blocks[cursor.block_ordinal()] + f32::EPSILON);
                cursor.advance();
            }
        }
    }

    #[test]
    fn test_handle_swaps_atomically() {
        let handle = IndexHandle::new(small_index());
        let before = handle.get();
        assert_eq!(before.term_count(), 2);

        let mut builder = IndexBuilder::new(4);
        builder.add_term("solo", &[(0, 1)]).unwrap();
        handle.replace(builder.build().unwrap());

        // Old snapshot still fully usable, new one visible
        assert_eq!(before.term_count(), 2);
        assert_eq!(handle.get().term_count(), 1);
    }
}
