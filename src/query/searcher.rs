//! Query validation and strategy dispatch
//!
//! One capability surface over the three retrieval algorithms: a
//! `SearchRequest` names the terms with their weights, k, the scoring
//! function and the strategy; the searcher validates it at the call
//! boundary (before any posting is decoded), resolves terms against the
//! dictionary and runs the selected executor. All per-query state lives
//! in the executor and is discarded when it returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use crate::structures::PostingCursor;
use crate::{Score, TermId};

use super::accumulator::AccumulatorArray;
use super::collector::SearchHit;
use super::scoring::{ScoringKind, TermScorer};
use super::{daat, maxscore, taat};

/// Retrieval strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    TermAtATime,
    ExactMerge,
    MaxScore,
}

/// One ranked-retrieval request
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// (term, weight) pairs; weights must be finite and >= 0
    pub terms: Vec<(String, f32)>,
    pub k: usize,
    pub scoring: ScoringKind,
    pub strategy: Strategy,
}

impl SearchRequest {
    pub fn new(terms: Vec<(String, f32)>, k: usize) -> Self {
        Self {
            terms,
            k,
            scoring: ScoringKind::Frequency,
            strategy: Strategy::MaxScore,
        }
    }

    pub fn with_scoring(mut self, scoring: ScoringKind) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Per-query state for one resolved term
pub(crate) struct QueryTerm<'a> {
    pub cursor: PostingCursor<'a>,
    pub scorer: TermScorer,
    pub weight: Score,
    pub term_id: TermId,
    /// Original query position, fixing the contribution summation order
    pub pos: usize,
}

#[inline]
pub(crate) fn check_cancel(cancel: Option<&AtomicBool>) -> Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
        _ => Ok(()),
    }
}

/// Query entry point over one immutable index snapshot
pub struct Searcher {
    index: Arc<InvertedIndex>,
}

impl Searcher {
    pub fn new(index: Arc<InvertedIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    /// Total postings across the request's terms (unknown terms count zero)
    pub fn count_postings<S: AsRef<str>>(&self, terms: &[S]) -> u64 {
        self.index.count_postings(terms)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.run(request, None)
    }

    /// Like `search`, but aborts with `Error::Cancelled` once `cancel` is
    /// set; checked at block/candidate boundaries
    pub fn search_cancellable(
        &self,
        request: &SearchRequest,
        cancel: &AtomicBool,
    ) -> Result<Vec<SearchHit>> {
        self.run(request, Some(cancel))
    }

    fn missing_bounds(&self, scoring: ScoringKind) -> Error {
        Error::Config(format!(
            "no max-score bounds for {}; run recompute_max_scores first",
            scoring.name()
        ))
    }

    fn run(
        &self,
        request: &SearchRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<SearchHit>> {
        if request.k == 0 {
            return Err(Error::Config("k must be positive".into()));
        }
        if request.terms.is_empty() {
            return Err(Error::Query("empty term list".into()));
        }
        for (term, weight) in &request.terms {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::Query(format!(
                    "invalid weight {weight} for term '{term}'"
                )));
            }
        }
        if request.strategy == Strategy::MaxScore
            && self.index.bounds_for(request.scoring).is_none()
        {
            return Err(self.missing_bounds(request.scoring));
        }

        let mut terms = Vec::with_capacity(request.terms.len());
        for (pos, (term, weight)) in request.terms.iter().enumerate() {
            if *weight == 0.0 {
                continue;
            }
            let Some((term_id, _)) = self.index.lookup(term) else {
                continue;
            };
            terms.push(QueryTerm {
                cursor: self.index.postings(term_id)?.into_cursor(),
                scorer: TermScorer::new(request.scoring, self.index.term_stats(term_id)),
                weight: *weight,
                term_id,
                pos,
            });
        }
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        log::trace!(
            "query: {} of {} terms resolved, k={}, strategy={:?}",
            terms.len(),
            request.terms.len(),
            request.k,
            request.strategy
        );
        match request.strategy {
            Strategy::TermAtATime => {
                let mut acc = AccumulatorArray::new(self.index.collection_size());
                taat::run(&self.index, terms, request.k, &mut acc, cancel)
            }
            Strategy::ExactMerge => daat::run(&self.index, terms, request.k, cancel),
            Strategy::MaxScore => {
                let bounds = self
                    .index
                    .bounds_for(request.scoring)
                    .ok_or_else(|| self.missing_bounds(request.scoring))?;
                maxscore::run(&self.index, terms, request.k, bounds, cancel)
            }
        }
    }
}
