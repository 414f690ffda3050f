//! Boolean query - combines multiple clauses with AND, OR, NOT semantics

use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::Result;
use roaring::RoaringBitmap;

/// Boolean query combining multiple clauses
///
/// The boolean query supports three types of clauses:
/// - `must`: All clauses must match (AND). Contributes to score.
/// - `should`: With no `must` clause, at least `minimum_should_match` of them
///   must match (OR). Otherwise they only add to the score.
/// - `must_not`: No clause must match (NOT). Does not contribute to score.
///
/// A query with only `must_not` clauses matches every visible document
/// except the excluded ones.
///
/// # Example
///
/// `+rust -draft tutorial` parses to:
///
/// ```text
/// bool
///   must:     term(content:rust)
///   should:   term(content:tutorial)
///   must_not: term(content:draft)
/// ```
#[derive(Clone, Debug)]
pub struct BoolQuery {
    /// Clauses that must match (AND, scoring)
    pub must: Vec<Box<dyn QueryNode>>,
    /// Clauses where at least one should match (OR, scoring)
    pub should: Vec<Box<dyn QueryNode>>,
    /// Clauses that must not match (NOT, no scoring)
    pub must_not: Vec<Box<dyn QueryNode>>,
    /// Minimum number of should clauses that must match when there is no must clause
    pub minimum_should_match: usize,
    /// Boost factor for scoring
    pub boost: f32,
}

impl Default for BoolQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl BoolQuery {
    /// Create a new empty boolean query
    pub fn new() -> Self {
        Self {
            must: Vec::new(),
            should: Vec::new(),
            must_not: Vec::new(),
            minimum_should_match: 1,
            boost: 1.0,
        }
    }

    /// Add a must clause
    pub fn must(mut self, query: impl QueryNode + 'static) -> Self {
        self.must.push(Box::new(query));
        self
    }

    /// Add a should clause
    pub fn should(mut self, query: impl QueryNode + 'static) -> Self {
        self.should.push(Box::new(query));
        self
    }

    /// Add a must_not clause
    pub fn must_not(mut self, query: impl QueryNode + 'static) -> Self {
        self.must_not.push(Box::new(query));
        self
    }

    /// Add a boxed must clause
    pub fn must_boxed(mut self, query: Box<dyn QueryNode>) -> Self {
        self.must.push(query);
        self
    }

    /// Add a boxed should clause
    pub fn should_boxed(mut self, query: Box<dyn QueryNode>) -> Self {
        self.should.push(query);
        self
    }

    /// Add a boxed must_not clause
    pub fn must_not_boxed(mut self, query: Box<dyn QueryNode>) -> Self {
        self.must_not.push(query);
        self
    }

    /// Set minimum should match
    pub fn with_minimum_should_match(mut self, minimum: usize) -> Self {
        self.minimum_should_match = minimum.max(1);
        self
    }

    /// Set the boost factor
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Check if the query has no clauses
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    /// Get total number of clauses
    pub fn clause_count(&self) -> usize {
        self.must.len() + self.should.len() + self.must_not.len()
    }

    /// Only exclusions: matches everything not excluded
    pub fn is_pure_negative(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && !self.must_not.is_empty()
    }

    /// Reorder must clauses so the cheapest runs first
    pub fn optimize_clause_order(&mut self, ctx: &QueryContext) {
        let mut costed: Vec<_> = self
            .must
            .drain(..)
            .map(|q| (q.estimate_cost(ctx), q))
            .collect();
        costed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        self.must = costed.into_iter().map(|(_, q)| q).collect();
        // Should clauses keep their order; they are all evaluated anyway
    }

    fn should_matches(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        if self.minimum_should_match <= 1 {
            let mut union = RoaringBitmap::new();
            for query in &self.should {
                union |= query.execute(ctx)?;
            }
            return Ok(union);
        }

        let mut counts: std::collections::HashMap<u32, usize> = std::collections::HashMap::new();
        for query in &self.should {
            for docno in query.execute(ctx)?.iter() {
                *counts.entry(docno).or_insert(0) += 1;
            }
        }
        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count >= self.minimum_should_match)
            .map(|(docno, _)| docno)
            .collect())
    }
}

impl QueryNode for BoolQuery {
    fn execute(&self, ctx: &QueryContext) -> Result<RoaringBitmap> {
        // Empty bool query matches nothing
        if self.is_empty() {
            return Ok(RoaringBitmap::new());
        }

        let mut result: Option<RoaringBitmap> = None;

        // Execute MUST clauses, cheapest first
        let mut must: Vec<&Box<dyn QueryNode>> = self.must.iter().collect();
        must.sort_by(|a, b| {
            a.estimate_cost(ctx)
                .partial_cmp(&b.estimate_cost(ctx))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for query in must {
            let matches = query.execute(ctx)?;
            let next = match result {
                Some(r) => r & matches,
                None => matches,
            };

            // Early exit if no matches
            if next.is_empty() {
                return Ok(next);
            }
            result = Some(next);
        }

        // SHOULD clauses only decide matching when there is no must clause
        if result.is_none() && !self.should.is_empty() {
            result = Some(self.should_matches(ctx)?);
        }

        let mut result = match result {
            Some(r) => r,
            None => ctx.visible().clone(),
        };

        // Execute MUST_NOT clauses (exclusion)
        for query in &self.must_not {
            if result.is_empty() {
                break;
            }
            result -= query.execute(ctx)?;
        }

        Ok(result)
    }

    fn estimate_cost(&self, ctx: &QueryContext) -> f64 {
        // Cost is dominated by the most selective clause
        let must_cost = self
            .must
            .iter()
            .map(|q| q.estimate_cost(ctx))
            .fold(f64::MAX, f64::min);
        let should_cost: f64 = self.should.iter().map(|q| q.estimate_cost(ctx)).sum();
        let must_not_cost: f64 = self.must_not.iter().map(|q| q.estimate_cost(ctx)).sum();

        let base_cost = if must_cost < f64::MAX {
            must_cost
        } else if !self.should.is_empty() {
            should_cost
        } else {
            ctx.visible().len() as f64
        };

        // Should and must_not clauses process the base result
        base_cost + should_cost * 0.1 + must_not_cost * 0.1
    }

    fn query_type(&self) -> &'static str {
        "bool"
    }

    fn is_scoring(&self) -> bool {
        // Bool query scores if any must or should clause scores
        self.must.iter().any(|q| q.is_scoring()) || self.should.iter().any(|q| q.is_scoring())
    }

    fn boost(&self) -> f32 {
        self.boost
    }

    fn score(&self, ctx: &QueryContext, docno: u32) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        if self.must_not.iter().any(|q| q.score(ctx, docno).is_some()) {
            return None;
        }

        let mut total_score = 0.0f32;

        // Every must clause has to match
        for query in &self.must {
            total_score += query.score(ctx, docno)?;
        }

        let mut should_matched = 0;
        for query in &self.should {
            if let Some(score) = query.score(ctx, docno) {
                total_score += score;
                should_matched += 1;
            }
        }

        if self.must.is_empty() && !self.should.is_empty() && should_matched < self.minimum_should_match {
            return None;
        }

        if self.is_pure_negative() {
            return Some(self.boost);
        }

        Some(total_score * self.boost)
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }
}
