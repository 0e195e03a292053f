//! Per-term scoring functions
//!
//! A `TermScorer` is constructed once per query term from index-wide
//! statistics and then evaluated per posting. Three functions are
//! supported: plain weighted frequency, BM25 with real document-length
//! normalization, and Dirichlet-smoothed query likelihood in its additive
//! form. All of them are non-negative and monotone in term frequency,
//! which is what the precomputed upper bounds rely on.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{Score, TermFreq};

/// BM25 k1 parameter - term frequency saturation
pub const BM25_K1: f32 = 1.2;

/// BM25 b parameter - document length normalization
pub const BM25_B: f32 = 0.75;

/// Dirichlet smoothing mass for query likelihood
pub const QL_MU: f32 = 2500.0;

/// Scoring function selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringKind {
    /// Contribution = term frequency (weighted frequency sum)
    Frequency,
    /// Okapi BM25 with per-document length normalization
    Bm25,
    /// Dirichlet-smoothed query likelihood, additive form
    QueryLikelihood,
}

impl ScoringKind {
    pub(crate) fn to_tag(self) -> u8 {
        match self {
            ScoringKind::Frequency => 0,
            ScoringKind::Bm25 => 1,
            ScoringKind::QueryLikelihood => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ScoringKind::Frequency),
            1 => Ok(ScoringKind::Bm25),
            2 => Ok(ScoringKind::QueryLikelihood),
            other => Err(Error::Corruption(format!(
                "unknown scoring function tag {other}"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScoringKind::Frequency => "frequency",
            ScoringKind::Bm25 => "bm25",
            ScoringKind::QueryLikelihood => "query_likelihood",
        }
    }
}

/// Compute IDF (inverse document frequency), BM25 variant
#[inline]
pub fn bm25_idf(doc_freq: f32, total_docs: f32) -> f32 {
    ((total_docs - doc_freq + 0.5) / (doc_freq + 0.5) + 1.0).ln()
}

/// Index-wide statistics needed to instantiate a term scorer
#[derive(Debug, Clone, Copy)]
pub struct TermStats {
    /// Number of documents containing the term
    pub doc_freq: u32,
    /// Total occurrences of the term in the collection
    pub collection_freq: u64,
    /// Collection size in documents
    pub num_docs: u32,
    /// Average document length in tokens
    pub avg_doc_len: f32,
    /// Total token occurrences in the collection
    pub occurrences: u64,
}

/// Scorer for one term under one scoring function
#[derive(Debug, Clone, Copy)]
pub enum TermScorer {
    Frequency,
    Bm25 { idf: f32, avg_doc_len: f32 },
    QueryLikelihood { smoothing_mass: f32 },
}

impl TermScorer {
    pub fn new(kind: ScoringKind, stats: TermStats) -> Self {
        match kind {
            ScoringKind::Frequency => TermScorer::Frequency,
            ScoringKind::Bm25 => TermScorer::Bm25 {
                idf: bm25_idf(stats.doc_freq as f32, stats.num_docs as f32),
                avg_doc_len: stats.avg_doc_len.max(1.0),
            },
            ScoringKind::QueryLikelihood => {
                // mu * p_c, where p_c is the term's collection-model probability
                let occurrences = stats.occurrences.max(1) as f32;
                let prior = stats.collection_freq.max(1) as f32 / occurrences;
                TermScorer::QueryLikelihood {
                    smoothing_mass: QL_MU * prior,
                }
            }
        }
    }

    /// Score contribution of a posting with frequency `tf` in a document
    /// of length `doc_len`. Always >= 0 and monotone in `tf`.
    #[inline]
    pub fn score(&self, tf: TermFreq, doc_len: u32) -> Score {
        let tf = tf as f32;
        match *self {
            TermScorer::Frequency => tf,
            TermScorer::Bm25 { idf, avg_doc_len } => {
                let length_norm = 1.0 - BM25_B + BM25_B * (doc_len as f32 / avg_doc_len);
                idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * length_norm)
            }
            TermScorer::QueryLikelihood { smoothing_mass } => (1.0 + tf / smoothing_mass).ln(),
        }
    }
}
