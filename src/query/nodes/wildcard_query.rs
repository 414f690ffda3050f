//! Wildcard query - matches terms using wildcards
//!
//! Supports:
//! - `*` - matches any sequence of characters
//! - `?` - matches any single character
//!
//! # Example
//!
//! ```rust
//! use rtsearch::query::nodes::WildcardQuery;
//!
//! let query = WildcardQuery::new("title", "te?t*").unwrap();
//! ```

use crate::error::RtSearchError;
use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::segment::field_term;
use crate::Result;
use regex::Regex;
use roaring::RoaringBitmap;
use std::sync::Arc;

use super::union_postings;

/// Query that matches terms using wildcard patterns
///
/// The pattern can include:
/// - `*` to match any sequence of characters (including empty)
/// - `?` to match exactly one character
///
/// Only dictionary terms sharing the pattern's literal prefix are tested
/// against the compiled pattern.
#[derive(Clone, Debug)]
pub struct WildcardQuery {
    /// Field to search in
    pub field: String,
    /// Wildcard pattern
    pub pattern: String,
    /// Boost factor for scoring
    pub boost: f32,
    regex: Regex,
}

impl WildcardQuery {
    /// Create a new wildcard query, compiling the pattern
    pub fn new(field: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let regex = pattern_to_regex(&pattern)?;
        Ok(Self {
            field: field.into(),
            pattern,
            boost: 1.0,
            regex,
        })
    }

    /// Set the boost factor
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Get the cache key for this query
    pub fn cache_key(&self) -> String {
        format!("wildcard:{}:{}", self.field, self.pattern)
    }

    /// Extract the literal prefix from the pattern
    ///
    /// Returns the longest prefix before the first wildcard character.
    pub fn extract_prefix(&self) -> &str {
        let end = self
            .pattern
            .find(|c| c == '*' || c == '?')
            .unwrap_or(self.pattern.len());
        &self.pattern[..end]
    }

    /// Check if the pattern has any wildcards
    pub fn has_wildcards(&self) -> bool {
        self.pattern.contains('*') || self.pattern.contains('?')
    }

    fn matches(&self, ctx: &QueryContext) -> Result<Arc<RoaringBitmap>> {
        ctx.get_or_cache_filter(&self.cache_key(), || {
            let field_prefix = field_term(&self.field, "");
            let candidates = ctx
                .reader()
                .terms()
                .prefix_search(&field_term(&self.field, self.extract_prefix()));
            let terms: Vec<_> = candidates
                .into_iter()
                .filter(|(term, _)| {
                    term.strip_prefix(&field_prefix)
                        .map(|token| self.regex.is_match(token))
                        .unwrap_or(false)
                })
                .collect();
            union_postings(ctx, &terms)
        })
    }
}

/// Convert a wildcard pattern to an anchored regex
fn pattern_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex_pattern = String::with_capacity(pattern.len() + 8);
    regex_pattern.push('^');

    for ch in pattern.chars() {
        match ch {
            '*' => regex_pattern.push_str(".*"),
            '?' => regex_pattern.push('.'),
            other => regex_pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    regex_pattern.push('$');

    Regex::new(&regex_pattern)
        .map_err(|e| RtSearchError::InvalidQuery(format!("Invalid wildcard pattern: {}", e)))
}

impl QueryNode for WildcardQuery {
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        Ok((*self.matches(ctx)?).clone())
    }

    fn estimate_cost(&self, ctx: &QueryContext) -> f64 {
        // Wildcard queries are expensive; a literal prefix narrows the scan
        let prefix_len = self.extract_prefix().chars().count();
        if prefix_len > 0 {
            ctx.visible().len() as f64 / (1.0 + prefix_len as f64)
        } else {
            ctx.visible().len() as f64 * 10.0
        }
    }

    fn query_type(&self) -> &'static str {
        "wildcard"
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn score(&self, ctx: &QueryContext, docno: u32) -> Option<f32> {
        // Wildcard queries use constant scoring
        self.matches(ctx)
            .ok()?
            .contains(docno)
            .then_some(self.boost)
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }
}
