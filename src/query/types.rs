//! Core types for the query system

use serde::{Deserialize, Serialize};

/// Operator joining adjacent clauses that carry no explicit operator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOperator {
    /// All terms must match (AND)
    And,
    /// At least one term must match (OR)
    #[default]
    Or,
}

impl std::str::FromStr for MatchOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(MatchOperator::And),
            "or" => Ok(MatchOperator::Or),
            other => Err(format!("unknown operator '{}'", other)),
        }
    }
}

/// Execution statistics of one search, logged at debug level
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryStats {
    /// Segments searched
    pub segments: usize,
    /// Visible matches before pagination
    pub total_hits: u64,
    /// Whether results were ordered by a stored sort value
    pub sorted: bool,
    /// Time to parse the query string
    pub parse_time_us: u64,
    /// Time to execute and collect across segments
    pub execute_time_us: u64,
}
