//! Exact document-at-a-time retrieval
//!
//! Synchronized cursor merge: every iteration advances all cursors
//! positioned on the smallest current document id, summing their
//! contributions before moving past it. Memory is proportional to the
//! number of query terms, and results are identical to term-at-a-time.

use std::sync::atomic::AtomicBool;

use crate::error::Result;
use crate::index::InvertedIndex;
use crate::structures::TERMINATED;

use super::collector::{SearchHit, TopKCollector};
use super::searcher::{QueryTerm, check_cancel};

pub(crate) fn run(
    index: &InvertedIndex,
    mut terms: Vec<QueryTerm<'_>>,
    k: usize,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<SearchHit>> {
    let mut len_cursor = index.doc_lens().cursor();
    let mut collector = TopKCollector::new(k);

    loop {
        check_cancel(cancel)?;
        let mut candidate = TERMINATED;
        for qt in &terms {
            candidate = candidate.min(qt.cursor.doc());
        }
        if candidate == TERMINATED {
            break;
        }

        let doc_len = len_cursor.get(candidate as usize) as u32;
        // Terms stay in query order, so contributions always sum in the
        // same sequence as the other strategies
        let mut score = 0.0;
        for qt in &mut terms {
            if qt.cursor.doc() == candidate {
                score += qt.weight * qt.scorer.score(qt.cursor.term_freq(), doc_len);
                qt.cursor.advance();
            }
        }
        if score > 0.0 {
            collector.insert(candidate, score);
        }
    }
    Ok(collector.into_sorted_results())
}
