//! Query parsing and execution
//!
//! Query text uses the Lucene classic syntax and is parsed into a tree of
//! [`QueryNode`]s:
//! - Boolean queries (`AND`, `OR`, `NOT`, `+`, `-`)
//! - Term and phrase queries, analyzed with the field's analyzer
//! - Prefix, wildcard and fuzzy queries over the term dictionary
//! - Term range queries
//!
//! The [`QueryExecutor`] runs one tree against every segment of a
//! [`SearchSnapshot`] and merges the results by BM25 relevance or by a
//! sortable field.
//!
//! # Example
//!
//! ```text
//! title:dune AND (author:herbert OR year:[1960 TO 1970]) -category:film
//! ```

pub mod ast;
pub mod context;
pub mod executor;
pub mod nodes;
pub mod query_string;
pub mod types;

pub use ast::{MatchAllQuery, MatchNoneQuery, QueryNode, QueryNodeRef};
pub use context::{CollectionStats, QueryContext};
pub use executor::{QueryExecutor, SearchSnapshot, SegmentSnapshot};
pub use nodes::{
    BoolQuery, FuzzyQuery, PhraseQuery, PrefixQuery, RangeQuery, TermQuery, WildcardQuery,
};
pub use query_string::QueryStringParser;
pub use types::*;
