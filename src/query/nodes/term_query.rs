//! Term query - exact match on a field

use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::segment::field_term;
use crate::Result;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

/// Query that matches documents containing an exact term in a field
///
/// This is the most basic query type - it looks up the term in the inverted
/// index and returns the posting list as a bitmap. The term is matched as
/// given; the query string parser has already run it through the field's
/// analyzer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TermQuery {
    /// Field to search in
    pub field: String,
    /// Exact term to match
    pub term: String,
    /// Boost factor for scoring
    #[serde(default = "default_boost")]
    pub boost: f32,
}

fn default_boost() -> f32 {
    1.0
}

impl TermQuery {
    /// Create a new term query
    pub fn new(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            term: term.into(),
            boost: 1.0,
        }
    }

    /// Set the boost factor
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// The term as indexed: `field:term`
    pub fn indexed_term(&self) -> String {
        field_term(&self.field, &self.term)
    }
}

impl QueryNode for TermQuery {
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        ctx.postings_bitmap(&self.indexed_term())
    }

    fn estimate_cost(&self, ctx: &QueryContext) -> f64 {
        ctx.doc_frequency(&self.indexed_term()) as f64
    }

    fn query_type(&self) -> &'static str {
        "term"
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn score(&self, ctx: &QueryContext, docno: u32) -> Option<f32> {
        let term = self.indexed_term();
        let tf = ctx.term_frequency(&term, docno).ok()?;
        if tf == 0 {
            return None;
        }
        Some(ctx.bm25(&self.field, &term, tf, docno) * self.boost)
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
    fn test_term_query_creation() {
        let query = TermQuery::new("title", "rust");
        assert_eq!(query.field, "title");
        assert_eq!(query.term, "rust");
        assert_eq!(query.boost, 1.0);
        assert_eq!(query.indexed_term(), "title:rust");
    }

    #[test]
    fn test_term_query_with_boost() {
        let query = TermQuery::new("title", "rust").with_boost(2.5);
        assert_eq!(query.boost, 2.5);
    }

    #[test]
    fn test_term_query_execute() {
        let ctx = context_for(&[("a", "rust search"), ("b", "go"), ("c", "rust")], &[]);
        let query = TermQuery::new("body", "rust");
        let result = query.execute(&ctx).unwrap();
        assert_eq!(result.iter().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(query.estimate_cost(&ctx), 2.0);

        let other_field = TermQuery::new("title", "rust");
        assert!(other_field.execute(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_term_query_score() {
        let ctx = context_for(&[("a", "rust rust"), ("b", "rust and more words")], &[]);
        let query = TermQuery::new("body", "rust");
        let a = query.score(&ctx, 0).unwrap();
        let b = query.score(&ctx, 1).unwrap();
        assert!(a > b);
        assert!(TermQuery::new("body", "go").score(&ctx, 0).is_none());

        let boosted = query.clone().with_boost(2.0).score(&ctx, 0).unwrap();
        assert!((boosted - a * 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_term_query_type() {
        let query = TermQuery::new("title", "rust");
        assert_eq!(query.query_type(), "term");
        assert!(query.is_scoring());
    }
}
