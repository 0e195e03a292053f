//! Bounded top-k collection
//!
//! Min-heap over candidates with the lowest score at the top, so the live
//! pruning threshold is an O(1) peek and eviction is O(log k). Candidates
//! scoring at or below the threshold of a full heap are rejected in O(1).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::{DocId, Score};

/// One ranked result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: Score,
}

#[derive(Clone, Copy)]
struct HeapEntry {
    doc_id: DocId,
    score: Score,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.doc_id == other.doc_id
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the worst candidate (lowest score, then highest doc id)
        // sits at the top of the max-heap
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.doc_id.cmp(&other.doc_id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fixed-capacity top-k heap shared by all retrieval strategies
pub struct TopKCollector {
    heap: BinaryHeap<HeapEntry>,
    k: usize,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        debug_assert!(k > 0, "collector capacity must be positive");
        let capacity = k.saturating_add(1).min(1_000_000);
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            k,
        }
    }

    /// Live pruning threshold: the minimum held score once full,
    /// negative infinity before that
    #[inline]
    pub fn threshold(&self) -> Score {
        if self.heap.len() >= self.k {
            self.heap.peek().map(|e| e.score).unwrap_or(Score::NEG_INFINITY)
        } else {
            Score::NEG_INFINITY
        }
    }

    /// Insert a candidate; returns whether it was kept.
    /// Caller must insert each doc_id at most once.
    #[inline]
    pub fn insert(&mut self, doc_id: DocId, score: Score) -> bool {
        if self.heap.len() < self.k {
            self.heap.push(HeapEntry { doc_id, score });
            true
        } else if score > self.threshold() {
            self.heap.push(HeapEntry { doc_id, score });
            self.heap.pop();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain into descending score order, ties broken by ascending doc id
    pub fn into_sorted_results(self) -> Vec<SearchHit> {
        let mut results: Vec<SearchHit> = self
            .heap
            .into_vec()
            .into_iter()
            .map(|e| SearchHit {
                doc_id: e.doc_id,
                score: e.score,
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        results
    }
}
