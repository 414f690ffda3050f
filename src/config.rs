use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RtSearchError;
use crate::query::MatchOperator;
use crate::segment::Bm25Params;
use crate::Result;

/// Engine configuration for a single named index
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    pub data_dir: PathBuf,
    pub compaction: CompactionConfig,
    pub query: QueryConfig,
    pub tokenizer: TokenizerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            data_dir: PathBuf::from("./data/default"),
            compaction: CompactionConfig::default(),
            query: QueryConfig::default(),
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration rooted at `data_dir`
    pub fn new(name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: EngineConfig = serde_json::from_slice(&bytes)
            .map_err(|e| RtSearchError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the compaction wake-up interval
    pub fn with_compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction.interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the Live footprint that triggers a rotation
    pub fn with_rotate_threshold(mut self, bytes: usize) -> Self {
        self.compaction.rotate_threshold_bytes = bytes;
        self
    }

    /// Set the field searched by unqualified query terms
    pub fn with_default_field(mut self, field: impl Into<String>) -> Self {
        self.query.default_field = field.into();
        self
    }

    /// Set the operator joining adjacent query clauses
    pub fn with_default_operator(mut self, operator: MatchOperator) -> Self {
        self.query.default_operator = operator;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RtSearchError::InvalidConfig("index name is empty".to_string()));
        }
        if self.compaction.interval_ms == 0 {
            return Err(RtSearchError::InvalidConfig(
                "compaction interval must be positive".to_string(),
            ));
        }
        if self.query.default_field.is_empty() {
            return Err(RtSearchError::InvalidConfig("default field is empty".to_string()));
        }
        if self.tokenizer.min_token_length == 0
            || self.tokenizer.min_token_length > self.tokenizer.max_token_length
        {
            return Err(RtSearchError::InvalidConfig(format!(
                "invalid token length bounds {}..={}",
                self.tokenizer.min_token_length, self.tokenizer.max_token_length
            )));
        }
        Ok(())
    }
}

/// Background compaction settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Coordinator wake-up interval
    pub interval_ms: u64,
    /// Rotate Live once its estimated footprint reaches this size
    pub rotate_threshold_bytes: usize,
    /// Forced cycles attempted during shutdown before giving up
    pub shutdown_retries: u32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            // 1 MiB
            rotate_threshold_bytes: 1024 * 1024,
            shutdown_retries: 3,
        }
    }
}

impl CompactionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Query parsing and scoring settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_field: String,
    pub default_operator: MatchOperator,
    pub bm25: Bm25Params,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_field: "content".to_string(),
            default_operator: MatchOperator::Or,
            bm25: Bm25Params::default(),
        }
    }
}

/// Tokenizer bounds shared by all analyzers
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub min_token_length: usize,
    pub max_token_length: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 1,
            max_token_length: 255,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let config = EngineConfig::default();
        assert_eq!(config.compaction.interval_ms, 10_000);
        assert_eq!(config.compaction.rotate_threshold_bytes, 1024 * 1024);
        assert_eq!(config.query.default_field, "content");
        assert_eq!(config.query.default_operator, MatchOperator::Or);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new("books", "/tmp/books")
            .with_compaction_interval(Duration::from_millis(250))
            .with_rotate_threshold(4096)
            .with_default_field("title");

        assert_eq!(config.name, "books");
        assert_eq!(config.compaction.interval(), Duration::from_millis(250));
        assert_eq!(config.compaction.rotate_threshold_bytes, 4096);
        assert_eq!(config.query.default_field, "title");
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut config = EngineConfig::default();
        config.tokenizer.min_token_length = 10;
        config.tokenizer.max_token_length = 5;
        assert!(config.validate().is_err());

        let zero_interval = EngineConfig::default().with_compaction_interval(Duration::ZERO);
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{"name":"news","compaction":{"interval_ms":500}}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "news");
        assert_eq!(config.compaction.interval_ms, 500);
        assert_eq!(config.compaction.rotate_threshold_bytes, 1024 * 1024);
    }
}
