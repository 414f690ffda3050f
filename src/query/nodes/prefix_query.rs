//! Prefix query - matches terms starting with a prefix
//!
//! Like Lucene's default rewrite for multi-term queries, every match scores
//! the query boost.

use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::segment::field_term;
use crate::Result;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::union_postings;

/// Query that matches documents with any term starting with the prefix
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrefixQuery {
    /// Field to search in
    pub field: String,
    /// Prefix to match
    pub prefix: String,
    /// Boost factor for scoring
    #[serde(default = "default_boost")]
    pub boost: f32,
}

fn default_boost() -> f32 {
    1.0
}

impl PrefixQuery {
    /// Create a new prefix query
    pub fn new(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            prefix: prefix.into(),
            boost: 1.0,
        }
    }

    /// Set the boost factor
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Get the cache key for this query
    pub fn cache_key(&self) -> String {
        format!("prefix:{}:{}", self.field, self.prefix)
    }

    fn matches(&self, ctx: &QueryContext) -> Result<std::sync::Arc<RoaringBitmap>> {
        ctx.get_or_cache_filter(&self.cache_key(), || {
            let terms = ctx
                .reader()
                .terms()
                .prefix_search(&field_term(&self.field, &self.prefix));
            union_postings(ctx, &terms)
        })
    }
}

impl QueryNode for PrefixQuery {
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        Ok((*self.matches(ctx)?).clone())
    }

    fn estimate_cost(&self, ctx: &QueryContext) -> f64 {
        // Shorter prefixes expand to more terms
        ctx.visible().len() as f64 / (1.0 + self.prefix.chars().count() as f64)
    }

    fn query_type(&self) -> &'static str {
        "prefix"
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
