//! Lucene-style query string parser
//!
//! Supports syntax like:
//! - `title:rust AND category:tutorial`
//! - `+rust -python go`
//! - `year:[1990 TO 2000}`
//! - `body:"exact phrase"~2`
//! - `title:prog*`
//! - `author:john~1`
//! - `category:(science OR fantasy)^2`
//!
//! # Example
//!
//! ```rust
//! use rtsearch::query::query_string::QueryStringParser;
//! use rtsearch::schema::Schema;
//! use rtsearch::tokenizer::AnalyzerSet;
//!
//! let schema = Schema::default();
//! let analyzers = AnalyzerSet::default();
//! let mut parser = QueryStringParser::new("title:rust AND body:fast", &schema, &analyzers).unwrap();
//! let query = parser.parse().unwrap();
//! assert_eq!(query.query_type(), "bool");
//! ```

pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Token};
pub use parser::QueryStringParser;
