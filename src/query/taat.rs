//! Term-at-a-time retrieval
//!
//! Fully decodes each query term's posting list into the accumulator
//! array, then scans the touched slots once to fill the heap. No pruning;
//! cost is proportional to the sum of posting-list lengths.

use std::sync::atomic::AtomicBool;

use crate::error::Result;
use crate::index::InvertedIndex;
use crate::structures::TERMINATED;

use super::accumulator::AccumulatorArray;
use super::collector::{SearchHit, TopKCollector};
use super::searcher::{QueryTerm, check_cancel};

pub(crate) fn run(
    index: &InvertedIndex,
    mut terms: Vec<QueryTerm<'_>>,
    k: usize,
    acc: &mut AccumulatorArray,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<SearchHit>> {
    acc.begin_query();
    let mut len_cursor = index.doc_lens().cursor();

    for qt in &mut terms {
        let mut last_block = usize::MAX;
        while qt.cursor.doc() != TERMINATED {
            let block = qt.cursor.block_ordinal();
            if block != last_block {
                check_cancel(cancel)?;
                last_block = block;
            }
            let doc = qt.cursor.doc();
            let tf = qt.cursor.term_freq();
            let doc_len = len_cursor.get(doc as usize) as u32;
            acc.accumulate(doc, qt.weight * qt.scorer.score(tf, doc_len));
            qt.cursor.advance();
        }
    }

    let mut collector = TopKCollector::new(k);
    acc.for_each_touched(|doc, score| {
        if score > 0.0 {
            collector.insert(doc, score);
        }
    });
    Ok(collector.into_sorted_results())
}
