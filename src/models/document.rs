use serde::{Deserialize, Serialize};

use crate::error::RtSearchError;
use crate::schema::KEY_FIELD;
use crate::tokenizer::Analyzer;
use crate::Result;

/// A keyed document with analyzed text fields and an opaque payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
}

/// A named text field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub analyzer: Analyzer,
    /// Index-time boost applied to this field's scores
    #[serde(default = "default_boost")]
    pub boost: f32,
    /// Keep the raw value as a sort key
    #[serde(default)]
    pub sortable: bool,
}

fn default_boost() -> f32 {
    1.0
}

impl Document {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Vec::new(),
            payload: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Shorthand for a standard-analyzed text field
    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_field(Field::new(name, value))
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Reject documents the index cannot represent
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(RtSearchError::InvalidDocument(
                "No Document key found".to_string(),
            ));
        }
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(RtSearchError::InvalidDocument(format!(
                    "empty field name in document {}",
                    self.key
                )));
            }
            if field.name.contains(':') {
                return Err(RtSearchError::InvalidDocument(format!(
                    "field name '{}' contains ':'",
                    field.name
                )));
            }
            if field.name == KEY_FIELD {
                return Err(RtSearchError::InvalidDocument(format!(
                    "field name '{}' is reserved",
                    KEY_FIELD
                )));
            }
            if !field.boost.is_finite() || field.boost < 0.0 {
                return Err(RtSearchError::InvalidDocument(format!(
                    "invalid boost {} on field '{}'",
                    field.boost, field.name
                )));
            }
        }
        Ok(())
    }
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            analyzer: Analyzer::Standard,
            boost: 1.0,
            sortable: false,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }
}
