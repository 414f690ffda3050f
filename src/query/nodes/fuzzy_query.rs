//! Fuzzy query - matches terms within an edit distance
//!
//! Uses a Levenshtein automaton intersected with the term dictionary FST to
//! find terms similar to the query term, without scanning the dictionary.
//!
//! # Example
//!
//! ```rust
//! use rtsearch::query::nodes::FuzzyQuery;
//!
//! // Find terms within edit distance 2 of "roust" (matches "rust")
//! let query = FuzzyQuery::new("content", "roust").with_fuzziness(2);
//! ```

use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::segment::field_term;
use crate::Result;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::union_postings;

/// Largest edit distance a fuzzy query may use
pub const MAX_EDIT_DISTANCE: u32 = 2;

/// Query that matches terms within an edit distance of the query term
///
/// The edit distance is calculated using Levenshtein distance, counting:
/// - Insertions
/// - Deletions
/// - Substitutions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuzzyQuery {
    /// Field to search in
    pub field: String,
    /// Term to match approximately
    pub term: String,
    /// Maximum edit distance (default: 2)
    #[serde(default = "default_fuzziness")]
    pub fuzziness: u32,
    /// Number of initial characters that must match exactly (default: 0)
    #[serde(default)]
    pub prefix_length: usize,
    /// Boost factor for scoring
    #[serde(default = "default_boost")]
    pub boost: f32,
}

fn default_fuzziness() -> u32 {
    MAX_EDIT_DISTANCE
}

fn default_boost() -> f32 {
    1.0
}

impl FuzzyQuery {
    /// Create a new fuzzy query with default fuzziness of 2
    pub fn new(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            term: term.into(),
            fuzziness: default_fuzziness(),
            prefix_length: 0,
            boost: 1.0,
        }
    }

    /// Set the maximum edit distance, capped at [`MAX_EDIT_DISTANCE`]
    pub fn with_fuzziness(mut self, fuzziness: u32) -> Self {
        self.fuzziness = fuzziness.min(MAX_EDIT_DISTANCE);
        self
    }

    /// Set the number of leading characters that must match exactly
    pub fn with_prefix_length(mut self, prefix_length: usize) -> Self {
        self.prefix_length = prefix_length;
        self
    }

    /// Set the boost factor
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Get the cache key for this query
    pub fn cache_key(&self) -> String {
        format!(
            "fuzzy:{}:{}:{}:{}",
            self.field, self.term, self.fuzziness, self.prefix_length
        )
    }

    fn exact_prefix(&self) -> &str {
        match self.term.char_indices().nth(self.prefix_length) {
            Some((idx, _)) => &self.term[..idx],
            None => &self.term,
        }
    }

    fn matches(&self, ctx: &QueryContext) -> Result<Arc<RoaringBitmap>> {
        ctx.get_or_cache_filter(&self.cache_key(), || {
            let terms = ctx.reader().terms().fuzzy_search(
                &field_term(&self.field, self.exact_prefix()),
                &field_term(&self.field, &self.term),
                self.fuzziness.min(MAX_EDIT_DISTANCE),
            )?;
            union_postings(ctx, &terms)
        })
    }
}

impl QueryNode for FuzzyQuery {
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        Ok((*self.matches(ctx)?).clone())
    }

    fn estimate_cost(&self, ctx: &QueryContext) -> f64 {
        // Automaton walk grows with the allowed distance
        ctx.visible().len() as f64 * (1.0 + self.fuzziness as f64)
    }

    fn query_type(&self) -> &'static str {
        "fuzzy"
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn score(&self, ctx: &QueryContext, docno: u32) -> Option<f32> {
        self.matches(ctx)
            .ok()?
            .contains(docno)
            .then_some(self.boost)
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::context::tests::context_for;

    #[test]
    fn test_fuzzy_query_creation() {
        let query = FuzzyQuery::new("content", "roust");
        assert_eq!(query.fuzziness, 2);
        assert_eq!(query.prefix_length, 0);
        assert_eq!(query.with_fuzziness(7).fuzziness, MAX_EDIT_DISTANCE);
    }

    #[test]
    fn test_fuzzy_query_execute() {
        let ctx = context_for(
            &[("a", "rust"), ("b", "trust"), ("c", "dust"), ("d", "python")],
            &[],
        );
        let one = FuzzyQuery::new("body", "rust").with_fuzziness(1);
        assert_eq!(one.execute(&ctx).unwrap().iter().collect::<Vec<_>>(), vec![0, 1, 2]);

        let exact = FuzzyQuery::new("body", "rust").with_fuzziness(0);
        assert_eq!(exact.execute(&ctx).unwrap().iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_fuzzy_prefix_length() {
        let ctx = context_for(&[("a", "rust"), ("b", "dust")], &[]);
        let query = FuzzyQuery::new("body", "rust").with_fuzziness(1).with_prefix_length(1);
        assert_eq!(query.exact_prefix(), "r");
        assert_eq!(query.execute(&ctx).unwrap().iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(query.score(&ctx, 0), Some(1.0));
        assert_eq!(query.score(&ctx, 1), None);
    }

    #[test]
    fn test_fuzzy_does_not_cross_fields() {
        let ctx = context_for(&[("a", "rust")], &[]);
        let query = FuzzyQuery::new("bod", "yrust").with_fuzziness(2);
        assert!(query.execute(&ctx).unwrap().is_empty());
    }
}
