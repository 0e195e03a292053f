//! MaxScore dynamic pruning
//!
//! Query terms are ordered ascending by their weighted score upper bound.
//! The non-essential set is the longest prefix whose bounds sum to at most
//! the live heap threshold: a document matching only those terms cannot
//! enter the top k. The merge runs over the essential suffix only;
//! surviving candidates are checked against non-essential terms strictly
//! by upper-bound arithmetic (term bounds first, then the owning block's
//! bound) before any payload is decoded.
//!
//! The threshold never decreases within a query, so the essential set only
//! shrinks and total scoring work is non-increasing as the query
//! progresses. Pruning is exact: the result set always equals the one the
//! unpruned strategies produce.

use std::cmp::Ordering;
use std::sync::atomic::AtomicBool;

use crate::Score;
use crate::error::Result;
use crate::index::{InvertedIndex, ScoreBounds};
use crate::structures::TERMINATED;

use super::collector::{SearchHit, TopKCollector};
use super::searcher::{QueryTerm, check_cancel};

/// Essential / non-essential split over bounds sorted ascending
///
/// `update` moves the boundary forward only; within one query the
/// essential suffix can shrink but never grow back.
pub struct MaxScorePartition {
    /// prefix[i] = sum of the first i bounds
    prefix: Vec<Score>,
    first_essential: usize,
}

impl MaxScorePartition {
    pub fn new(ascending_bounds: &[Score]) -> Self {
        let mut prefix = Vec::with_capacity(ascending_bounds.len() + 1);
        let mut sum = 0.0;
        prefix.push(sum);
        for &b in ascending_bounds {
            debug_assert!(b >= 0.0);
            sum += b;
            prefix.push(sum);
        }
        Self {
            prefix,
            first_essential: 0,
        }
    }

    pub fn num_terms(&self) -> usize {
        self.prefix.len() - 1
    }

    /// Index of the first essential term; everything below it is
    /// non-essential
    #[inline]
    pub fn first_essential(&self) -> usize {
        self.first_essential
    }

    /// Sum of the lowest `i` bounds
    #[inline]
    pub fn prefix_sum(&self, i: usize) -> Score {
        self.prefix[i]
    }

    /// Grow the non-essential prefix as far as `threshold` allows
    pub fn update(&mut self, threshold: Score) {
        while self.first_essential < self.num_terms()
            && self.prefix[self.first_essential + 1] <= threshold
        {
            self.first_essential += 1;
        }
    }
}

pub(crate) fn run(
    index: &InvertedIndex,
    mut terms: Vec<QueryTerm<'_>>,
    k: usize,
    bounds: &ScoreBounds,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<SearchHit>> {
    // Ascending weighted bound; the stable sort keeps query order on ties
    terms.sort_by(|a, b| {
        let ba = a.weight * bounds.term_bound(a.term_id);
        let bb = b.weight * bounds.term_bound(b.term_id);
        ba.partial_cmp(&bb).unwrap_or(Ordering::Equal)
    });
    let weighted: Vec<Score> = terms
        .iter()
        .map(|qt| qt.weight * bounds.term_bound(qt.term_id))
        .collect();

    let n = terms.len();
    let mut partition = MaxScorePartition::new(&weighted);
    let mut collector = TopKCollector::new(k);
    let mut len_cursor = index.doc_lens().cursor();
    let mut contribs: Vec<(usize, Score)> = Vec::with_capacity(n);
    let mut docs_scored = 0u64;
    let mut docs_abandoned = 0u64;

    loop {
        check_cancel(cancel)?;
        let e = partition.first_essential();
        if e == n {
            // Even full credit for every term cannot beat the threshold
            break;
        }

        let mut candidate = TERMINATED;
        for qt in &terms[e..] {
            candidate = candidate.min(qt.cursor.doc());
        }
        if candidate == TERMINATED {
            break;
        }
        let doc_len = len_cursor.get(candidate as usize) as u32;

        contribs.clear();
        let mut partial = 0.0;
        for qt in &mut terms[e..] {
            if qt.cursor.doc() == candidate {
                let c = qt.weight * qt.scorer.score(qt.cursor.term_freq(), doc_len);
                contribs.push((qt.pos, c));
                partial += c;
                qt.cursor.advance();
            }
        }

        // Consult non-essential terms from the highest bound down,
        // upper-bound arithmetic first, payload decode only while the
        // candidate can still reach the threshold
        let mut abandoned = false;
        for i in (0..e).rev() {
            if partial + partition.prefix_sum(i + 1) <= collector.threshold() {
                abandoned = true;
                break;
            }
            let qt = &mut terms[i];
            let Some(block) = qt.cursor.skip_to_block(candidate) else {
                continue;
            };
            let block_bound = qt.weight * bounds.block_bounds(qt.term_id)[block];
            if partial + block_bound + partition.prefix_sum(i) <= collector.threshold() {
                abandoned = true;
                break;
            }
            if qt.cursor.next_geq(candidate) == candidate {
                let c = qt.weight * qt.scorer.score(qt.cursor.term_freq(), doc_len);
                contribs.push((qt.pos, c));
                partial += c;
            }
        }
        if abandoned {
            docs_abandoned += 1;
            continue;
        }

        // Sum in query order so scores stay bit-identical with the
        // exhaustive strategies
        contribs.sort_unstable_by_key(|&(pos, _)| pos);
        let score: Score = contribs.iter().map(|&(_, c)| c).sum();
        docs_scored += 1;
        if score > 0.0 && collector.insert(candidate, score) {
            partition.update(collector.threshold());
        }
    }
    log::debug!(
        "maxscore done: scored={docs_scored}, abandoned={docs_abandoned}, essential {}..{n}",
        partition.first_essential()
    );
    Ok(collector.into_sorted_results())
}
