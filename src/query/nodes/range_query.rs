//! Range query - matches documents with terms in a lexicographic range
//!
//! `field:[a TO b]` includes both ends, `field:{a TO b}` excludes them and
//! `*` leaves an end open. Terms compare as strings, as in Lucene's
//! `TermRangeQuery`.

use std::ops::Bound;
use std::sync::Arc;

use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::segment::field_term;
use crate::Result;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::union_postings;

/// Query that matches documents holding a term within the bounds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RangeQuery {
    /// Field to search in
    pub field: String,
    /// Lower bound; None is open
    pub lower: Option<String>,
    /// Upper bound; None is open
    pub upper: Option<String>,
    #[serde(default = "default_true")]
    pub include_lower: bool,
    #[serde(default = "default_true")]
    pub include_upper: bool,
    /// Boost factor for scoring
    #[serde(default = "default_boost")]
    pub boost: f32,
}

fn default_true() -> bool {
    true
}

fn default_boost() -> f32 {
    1.0
}

impl RangeQuery {
    /// Create a new range query open at both ends
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            lower: None,
            upper: None,
            include_lower: true,
            include_upper: true,
            boost: 1.0,
        }
    }

    /// Terms greater than or equal to `value`
    pub fn gte(mut self, value: impl Into<String>) -> Self {
        self.lower = Some(value.into());
        self.include_lower = true;
        self
    }

    /// Terms greater than `value`
    pub fn gt(mut self, value: impl Into<String>) -> Self {
        self.lower = Some(value.into());
        self.include_lower = false;
        self
    }

    /// Terms less than or equal to `value`
    pub fn lte(mut self, value: impl Into<String>) -> Self {
        self.upper = Some(value.into());
        self.include_upper = true;
        self
    }

    /// Terms less than `value`
    pub fn lt(mut self, value: impl Into<String>) -> Self {
        self.upper = Some(value.into());
        self.include_upper = false;
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
            "range:{}:{}{}:{}{}",
            self.field,
            if self.include_lower { "[" } else { "{" },
            self.lower.as_deref().unwrap_or("*"),
            self.upper.as_deref().unwrap_or("*"),
            if self.include_upper { "]" } else { "}" },
        )
    }

    pub fn is_unbounded_lower(&self) -> bool {
        self.lower.is_none()
    }

    pub fn is_unbounded_upper(&self) -> bool {
        self.upper.is_none()
    }

    fn matches(&self, ctx: &QueryContext) -> Result<Arc<RoaringBitmap>> {
        ctx.get_or_cache_filter(&self.cache_key(), || {
            // Open ends stay inside this field's slice of the dictionary;
            // ';' is the byte after the ':' separator.
            let lower = match &self.lower {
                Some(v) => field_term(&self.field, v),
                None => field_term(&self.field, ""),
            };
            let upper = match &self.upper {
                Some(v) => field_term(&self.field, v),
                None => format!("{};", self.field),
            };

            let lower_bound = match (&self.lower, self.include_lower) {
                (Some(_), false) => Bound::Excluded(lower.as_str()),
                _ => Bound::Included(lower.as_str()),
            };
            let upper_bound = match (&self.upper, self.include_upper) {
                (Some(_), true) => Bound::Included(upper.as_str()),
                _ => Bound::Excluded(upper.as_str()),
            };

            let terms = ctx.reader().terms().range_search(lower_bound, upper_bound);
            union_postings(ctx, &terms)
        })
    }
}

impl QueryNode for RangeQuery {
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        Ok((*self.matches(ctx)?).clone())
    }

    fn estimate_cost(&self, ctx: &QueryContext) -> f64 {
        let open_ends = self.is_unbounded_lower() as u8 + self.is_unbounded_upper() as u8;
        ctx.visible().len() as f64 * (0.25 + 0.25 * open_ends as f64)
    }

    fn query_type(&self) -> &'static str {
        "range"
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn score(&self, ctx: &QueryContext, docno: u32) -> Option<f32> {
        // Constant score
        self.matches(ctx)
            .ok()?
            .contains(docno)
            .then_some(self.boost)
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }
}
