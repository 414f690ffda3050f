//! Phrase query - matches exact phrases with optional proximity/slop
//!
//! A phrase query matches documents containing the sequence of terms in
//! order, optionally allowing a number of positions of play (slop) between
//! them.
//!
//! # Example
//!
//! ```rust
//! use rtsearch::query::nodes::PhraseQuery;
//!
//! // Exact phrase match on analyzed tokens and their relative offsets
//! let query = PhraseQuery::new("content", vec![("rust".into(), 0), ("programming".into(), 1)]);
//!
//! // Phrase with slop (allows 2 positions of play)
//! let query = query.with_slop(2);
//! ```

use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::segment::field_term;
use crate::Result;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

/// Query that matches an ordered phrase of terms
///
/// Terms are already analyzed; each carries its offset within the phrase so
/// that gaps left by removed stop words are matched as gaps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhraseQuery {
    /// Field to search in
    pub field: String,
    /// Analyzed terms with their position offsets in the phrase
    pub terms: Vec<(String, u32)>,
    /// Total positional play allowed across the phrase (default: 0 for exact phrase)
    #[serde(default)]
    pub slop: u32,
    /// Boost factor for scoring
    #[serde(default = "default_boost")]
    pub boost: f32,
}

fn default_boost() -> f32 {
    1.0
}

impl PhraseQuery {
    /// Create a new phrase query with exact matching (slop=0)
    pub fn new(field: impl Into<String>, terms: Vec<(String, u32)>) -> Self {
        Self {
            field: field.into(),
            terms,
            slop: 0,
            boost: 1.0,
        }
    }

    /// Set the slop (maximum positional play)
    ///
    /// - slop=0: exact phrase match (terms must be adjacent)
    /// - slop=1: one extra position may appear between phrase terms
    pub fn with_slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    /// Set the boost factor
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    fn indexed_terms(&self) -> Vec<String> {
        self.terms
            .iter()
            .map(|(token, _)| field_term(&self.field, token))
            .collect()
    }

    /// Positions lists of every phrase term in `docno`, or None if one is missing
    fn positions(&self, ctx: &QueryContext, docno: u32) -> Result<Option<Vec<Vec<u32>>>> {
        let mut lists = Vec::with_capacity(self.terms.len());
        for term in self.indexed_terms() {
            match ctx.posting(&term, docno)? {
                Some(posting) => lists.push(posting.positions),
                None => return Ok(None),
            }
        }
        Ok(Some(lists))
    }

    /// Number of phrase occurrences in `docno`
    fn phrase_frequency(&self, ctx: &QueryContext, docno: u32) -> Result<u32> {
        let lists = match self.positions(ctx, docno)? {
            Some(lists) => lists,
            None => return Ok(0),
        };
        let offsets: Vec<u32> = self.terms.iter().map(|(_, off)| *off).collect();

        let freq = lists[0]
            .iter()
            .filter(|&&start| matches_from(start, offsets[0], &lists[1..], &offsets[1..], self.slop))
            .count();
        Ok(freq as u32)
    }
}

/// Whether the remaining terms can be placed after `prev_pos` within `slop_left`
fn matches_from(
    prev_pos: u32,
    prev_off: u32,
    remaining: &[Vec<u32>],
    offsets: &[u32],
    slop_left: u32,
) -> bool {
    let (positions, offset) = match (remaining.first(), offsets.first()) {
        (Some(p), Some(o)) => (p, *o),
        _ => return true,
    };
    let expected = prev_pos as i64 + (offset as i64 - prev_off as i64);

    for &pos in positions {
        if pos <= prev_pos {
            continue;
        }
        let cost = (pos as i64 - expected).unsigned_abs();
        if cost > slop_left as u64 {
            if pos as i64 > expected {
                break;
            }
            continue;
        }
        if matches_from(pos, offset, &remaining[1..], &offsets[1..], slop_left - cost as u32) {
            return true;
        }
    }
    false
}

impl QueryNode for PhraseQuery {
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        if self.terms.is_empty() {
            return Ok(RoaringBitmap::new());
        }

        // Rarest terms first so the candidate set shrinks quickly
        let mut terms = self.indexed_terms();
        terms.sort_by_key(|t| ctx.doc_frequency(t));

        let mut candidates: Option<RoaringBitmap> = None;
        for term in &terms {
            let bitmap = ctx.postings_bitmap(term)?;
            let next = match candidates {
                Some(c) => c & bitmap,
                None => bitmap,
            };
            if next.is_empty() {
                return Ok(next);
            }
            candidates = Some(next);
        }

        let mut result = RoaringBitmap::new();
        for docno in candidates.unwrap_or_default().iter() {
            if self.phrase_frequency(ctx, docno)? > 0 {
                result.insert(docno);
            }
        }
        Ok(result)
    }

    fn estimate_cost(&self, ctx: &QueryContext) -> f64 {
        // Cost is based on the rarest term, plus position checks
        let min_df = self
            .indexed_terms()
            .iter()
            .map(|t| ctx.doc_frequency(t))
            .min()
            .unwrap_or(0);
        let position_check_cost = if self.slop == 0 { 2.0 } else { 3.0 + self.slop as f64 };
        min_df as f64 * position_check_cost
    }

    fn query_type(&self) -> &'static str {
        "phrase"
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn score(&self, ctx: &QueryContext, docno: u32) -> Option<f32> {
        let freq = self.phrase_frequency(ctx, docno).ok()?;
        if freq == 0 {
            return None;
        }
        let score: f32 = self
            .indexed_terms()
            .iter()
            .map(|term| ctx.bm25(&self.field, term, freq, docno))
            .sum();
        Some(score * self.boost)
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }
}
