//! Text analysis
//!
//! `Tokenizer` is the configurable token pipeline; `Analyzer` names the
//! per-field presets documents and queries are analyzed with.

mod analyzer;
mod tokenizer;

pub use analyzer::{Analyzer, AnalyzerSet};
pub use tokenizer::{SplitMode, StopwordSet, Tokenizer, TokenizerOptions, LUCENE_STOP_WORDS};
