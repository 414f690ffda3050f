//! Segment statistics for BM25+ scoring
//!
//! Each segment stores per-docno lengths. Queries aggregate document counts,
//! lengths and term document frequencies across every segment in a search
//! snapshot, so scores are comparable no matter which segment a hit lives in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::DocNo;

/// BM25+ parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term frequency saturation parameter
    pub k1: f32,
    /// Length normalization parameter
    pub b: f32,
    /// BM25+ delta parameter (avoids zero scores for high-frequency terms)
    pub delta: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            delta: 1.0,
        }
    }
}

/// Statistics for a single segment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentStatistics {
    /// Total number of documents in this segment
    pub doc_count: u32,
    /// Sum of all document lengths (for computing avgdl)
    pub total_doc_length: u64,
    /// Document lengths indexed by docno
    doc_lengths: Vec<u32>,
    /// Cached average document length
    avgdl: f64,
}

impl SegmentStatistics {
    pub fn new() -> Self {
        Self {
            doc_count: 0,
            total_doc_length: 0,
            doc_lengths: Vec::new(),
            avgdl: 0.0,
        }
    }

    /// Create statistics with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            doc_count: 0,
            total_doc_length: 0,
            doc_lengths: Vec::with_capacity(capacity),
            avgdl: 0.0,
        }
    }

    /// Add a document with the given length
    pub fn add_document(&mut self, doc_len: u32) -> DocNo {
        let docno = DocNo::new(self.doc_count);
        self.doc_lengths.push(doc_len);
        self.total_doc_length += doc_len as u64;
        self.doc_count += 1;
        self.update_avgdl();
        docno
    }

    /// Get document length for a docno
    pub fn get_doc_length(&self, docno: DocNo) -> Option<u32> {
        self.doc_lengths.get(docno.as_usize()).copied()
    }

    /// Get average document length
    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    fn update_avgdl(&mut self) {
        if self.doc_count > 0 {
            self.avgdl = self.total_doc_length as f64 / self.doc_count as f64;
        } else {
            self.avgdl = 0.0;
        }
    }

    /// Get all document lengths (for serialization)
    pub fn doc_lengths(&self) -> &[u32] {
        &self.doc_lengths
    }

    /// Create from serialized document lengths
    pub fn from_doc_lengths(doc_lengths: Vec<u32>) -> Self {
        let doc_count = doc_lengths.len() as u32;
        let total_doc_length: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avgdl = if doc_count > 0 {
            total_doc_length as f64 / doc_count as f64
        } else {
            0.0
        };

        Self {
            doc_count,
            total_doc_length,
            doc_lengths,
            avgdl,
        }
    }
}

impl Default for SegmentStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Collection-wide statistics for one search snapshot
#[derive(Clone, Debug, Default)]
pub struct IndexStatistics {
    /// Total documents across all segments
    pub total_docs: u32,
    /// Global average document length
    pub global_avgdl: f64,
    /// Per-term document frequencies (aggregated)
    term_dfs: HashMap<String, u32>,
}

impl IndexStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate document counts and lengths from multiple segments
    pub fn aggregate<'a>(segments: impl IntoIterator<Item = &'a SegmentStatistics>) -> Self {
        let mut total_docs = 0u32;
        let mut total_length = 0u64;
        for stats in segments {
            total_docs += stats.doc_count;
            total_length += stats.total_doc_length;
        }
        let global_avgdl = if total_docs > 0 {
            total_length as f64 / total_docs as f64
        } else {
            0.0
        };

        Self {
            total_docs,
            global_avgdl,
            term_dfs: HashMap::new(),
        }
    }

    /// Add term document frequency
    pub fn add_term_df(&mut self, term: &str, df: u32) {
        *self.term_dfs.entry(term.to_string()).or_insert(0) += df;
    }

    /// Get term document frequency
    pub fn get_term_df(&self, term: &str) -> u32 {
        self.term_dfs.get(term).copied().unwrap_or(0)
    }

    /// Document frequency if it was already recorded
    pub fn term_df(&self, term: &str) -> Option<u32> {
        self.term_dfs.get(term).copied()
    }

    /// Record the collection-wide frequency of a term, keeping an earlier value
    pub fn set_term_df(&mut self, term: &str, df: u32) -> u32 {
        *self.term_dfs.entry(term.to_string()).or_insert(df)
    }

    /// Robertson-Sparck-Jones IDF
    pub fn idf(&self, term: &str) -> f32 {
        let n = self.total_docs as f32;
        if n == 0.0 {
            return 0.0;
        }
        let df = self.get_term_df(term).max(1) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25+ contribution of one term occurrence
    pub fn bm25_score(&self, term: &str, tf: f32, doc_len: u32, params: &Bm25Params) -> f32 {
        let avgdl = self.global_avgdl as f32;
        if avgdl == 0.0 || self.total_docs == 0 {
            return 0.0;
        }

        let idf = self.idf(term);

        // Length normalization
        let norm = 1.0 - params.b + params.b * (doc_len as f32 / avgdl);

        // BM25+ formula (with delta to avoid zero scores)
        let tf_component = (tf * (params.k1 + 1.0)) / (tf + params.k1 * norm);
        idf * (tf_component + params.delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(docs: u32, len: u32) -> SegmentStatistics {
        let mut stats = SegmentStatistics::new();
        for _ in 0..docs {
            stats.add_document(len);
        }
        stats
    }

    #[test]
    fn test_segment_statistics() {
        let mut stats = SegmentStatistics::new();

        let docno1 = stats.add_document(100);
        let docno2 = stats.add_document(200);
        let docno3 = stats.add_document(150);

        assert_eq!(stats.doc_count, 3);
        assert_eq!(stats.total_doc_length, 450);
        assert!((stats.avgdl() - 150.0).abs() < 0.001);

        assert_eq!(stats.get_doc_length(docno1), Some(100));
        assert_eq!(stats.get_doc_length(docno2), Some(200));
        assert_eq!(stats.get_doc_length(docno3), Some(150));
    }

    #[test]
    fn test_bm25_score() {
        let mut stats = IndexStatistics::aggregate([&uniform(100, 100)]);
        stats.add_term_df("body:common", 50);
        stats.add_term_df("body:rare", 5);
        let params = Bm25Params::default();

        assert!(stats.bm25_score("body:rare", 5.0, 100, &params) > 0.0);

        // Higher TF should give higher score
        let low_tf = stats.bm25_score("body:rare", 1.0, 100, &params);
        let high_tf = stats.bm25_score("body:rare", 5.0, 100, &params);
        assert!(high_tf > low_tf);

        // Rarer terms (lower DF) should have higher scores
        let common = stats.bm25_score("body:common", 5.0, 100, &params);
        let rare = stats.bm25_score("body:rare", 5.0, 100, &params);
        assert!(rare > common);

        // Shorter documents score higher for the same TF
        let short = stats.bm25_score("body:rare", 2.0, 50, &params);
        let long = stats.bm25_score("body:rare", 2.0, 200, &params);
        assert!(short > long);
    }

    #[test]
    fn test_index_statistics() {
        let mut index_stats = IndexStatistics::aggregate([&uniform(50, 100), &uniform(50, 150)]);
        assert_eq!(index_stats.total_docs, 100);
        assert!((index_stats.global_avgdl - 125.0).abs() < 0.001);

        index_stats.add_term_df("title:dune", 3);
        index_stats.add_term_df("title:dune", 4);
        assert_eq!(index_stats.get_term_df("title:dune"), 7);
        assert_eq!(index_stats.get_term_df("title:other"), 0);
    }

    #[test]
    fn test_empty_statistics_score_zero() {
        let stats = IndexStatistics::new();
        assert_eq!(stats.idf("x"), 0.0);
        assert_eq!(stats.bm25_score("x", 1.0, 10, &Bm25Params::default()), 0.0);
    }
}
