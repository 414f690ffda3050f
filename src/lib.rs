pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod query;
pub mod registry;
pub mod schema;
pub mod segment;
pub mod tokenizer;

pub use config::{CompactionConfig, EngineConfig, QueryConfig, TokenizerConfig};
pub use engine::{BatchResult, CompactionPhase, CycleReport, Engine, EngineStats};
pub use error::{Result, RtSearchError};
pub use models::*;
pub use registry::IndexRegistry;
pub use tokenizer::Analyzer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
