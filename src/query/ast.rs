//! Abstract Syntax Tree for query representation
//!
//! This module defines the core `QueryNode` trait that all query types implement.
//! A parsed query is executed once per segment of a search snapshot.

use crate::Result;
use roaring::RoaringBitmap;
use std::fmt::Debug;
use std::sync::Arc;

use super::context::QueryContext;

/// Reference-counted query node for efficient tree sharing
pub type QueryNodeRef = Arc<dyn QueryNode>;

/// Core trait for all query nodes in the AST
///
/// Query nodes form a tree structure that represents the logical structure
/// of a search query. Each node can be executed against a `QueryContext`
/// to produce a set of matching document numbers within that segment.
pub trait QueryNode: Send + Sync + Debug {
    /// Execute the query and return matching docnos as a bitmap
    ///
    /// The result may include documents hidden in the segment; the executor
    /// intersects it with the segment's visible set.
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap>;

    /// Estimate the execution cost of this query
    ///
    /// Boolean queries run their cheapest required clause first.
    fn estimate_cost(&self, ctx: &QueryContext) -> f64;

    /// Get the query type name for debugging and logging
    fn query_type(&self) -> &'static str;

    /// Whether this query produces scores (vs just filtering)
    fn is_scoring(&self) -> bool {
        true
    }

    /// Get the boost factor for this query
    fn boost(&self) -> f32 {
        1.0
    }

    /// Calculate the score contribution for a matching document
    ///
    /// Returns None if the document doesn't match or if this is a non-scoring query.
    fn score(&self, _ctx: &QueryContext, _docno: u32) -> Option<f32> {
        None
    }

    /// Clone this query node into a boxed trait object
    fn clone_box(&self) -> Box<dyn QueryNode>;
}

impl Clone for Box<dyn QueryNode> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A query that matches all documents
#[derive(Clone, Debug)]
pub struct MatchAllQuery {
    pub boost: f32,
}

impl Default for MatchAllQuery {
    fn default() -> Self {
        Self { boost: 1.0 }
    }
}

impl MatchAllQuery {
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

impl QueryNode for MatchAllQuery {
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        Ok(ctx.visible().clone())
    }

    fn estimate_cost(&self, ctx: &QueryContext) -> f64 {
        ctx.visible().len() as f64
    }

    fn query_type(&self) -> &'static str {
        "match_all"
    }

    fn is_scoring(&self) -> bool {
        false
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn score(&self, _ctx: &QueryContext, _docno: u32) -> Option<f32> {
        Some(self.boost)
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }
}

/// A query that matches no documents
///
/// Produced for query text that analyzes to nothing, such as a lone stop word.
#[derive(Clone, Debug, Default)]
pub struct MatchNoneQuery;

impl QueryNode for MatchNoneQuery {
    fn execute(&self, _ctx: &QueryContext) -> Result<RoaringBitmap> {
        Ok(RoaringBitmap::new())
    }

    fn estimate_cost(&self, _ctx: &QueryContext) -> f64 {
        0.0
    }

    fn query_type(&self) -> &'static str {
        "match_none"
    }

    fn is_scoring(&self) -> bool {
        false
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }
}
