use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Document;
use crate::tokenizer::Analyzer;

/// Reserved field holding the untokenized document key
pub const KEY_FIELD: &str = "__KEY__";

/// Per-field indexing options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub analyzer: Analyzer,

    /// Whether at least one document stored a sort value for this field
    #[serde(default)]
    pub sortable: bool,
}

impl FieldInfo {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            sortable: false,
        }
    }
}

/// Field name to indexing options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: HashMap<String, FieldInfo>,
}

impl Default for Schema {
    fn default() -> Self {
        let mut fields = HashMap::new();
        fields.insert(KEY_FIELD.to_string(), FieldInfo::new(Analyzer::Keyword));
        Self { fields }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a schema from persisted field entries
    pub fn from_fields(fields: HashMap<String, FieldInfo>) -> Self {
        let mut schema = Self::default();
        for (name, info) in fields {
            if name != KEY_FIELD {
                schema.fields.insert(name, info);
            }
        }
        schema
    }

    pub fn get(&self, field: &str) -> Option<&FieldInfo> {
        self.fields.get(field)
    }

    /// Analyzer used for `field`, falling back to the standard analyzer
    pub fn analyzer_for(&self, field: &str) -> Analyzer {
        self.fields
            .get(field)
            .map(|info| info.analyzer)
            .unwrap_or_default()
    }

    pub fn is_sortable(&self, field: &str) -> bool {
        self.fields.get(field).map(|info| info.sortable).unwrap_or(false)
    }

    pub fn fields(&self) -> &HashMap<String, FieldInfo> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.len() <= 1
    }

    /// Record the fields of `doc`, returning true if anything changed
    ///
    /// The most recent analyzer for a field wins. Sortability is sticky.
    pub fn learn(&mut self, doc: &Document) -> bool {
        let mut changed = false;
        for field in &doc.fields {
            match self.fields.get_mut(&field.name) {
                Some(info) => {
                    if info.analyzer != field.analyzer {
                        info.analyzer = field.analyzer;
                        changed = true;
                    }
                    if field.sortable && !info.sortable {
                        info.sortable = true;
                        changed = true;
                    }
                }
                None => {
                    self.fields.insert(
                        field.name.clone(),
                        FieldInfo {
                            analyzer: field.analyzer,
                            sortable: field.sortable,
                        },
                    );
                    changed = true;
                }
            }
        }
        changed
    }

    /// Check whether learning `doc` would change the schema
    pub fn would_change(&self, doc: &Document) -> bool {
        doc.fields.iter().any(|field| match self.fields.get(&field.name) {
            Some(info) => info.analyzer != field.analyzer || (field.sortable && !info.sortable),
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;

    #[test]
    fn test_default_has_key_field() {
        let schema = Schema::new();
        assert_eq!(schema.analyzer_for(KEY_FIELD), Analyzer::Keyword);
        assert!(schema.is_empty());
        assert_eq!(schema.analyzer_for("unknown"), Analyzer::Standard);
    }

    #[test]
    fn test_learn_fields() {
        let mut schema = Schema::new();
        let doc = Document::new("k1")
            .with_field(Field::new("category", "fiction").with_analyzer(Analyzer::Keyword))
            .with_field(Field::new("title", "Dune").sortable());

        assert!(schema.would_change(&doc));
        assert!(schema.learn(&doc));
        assert!(!schema.would_change(&doc));
        assert!(!schema.learn(&doc));

        assert_eq!(schema.analyzer_for("category"), Analyzer::Keyword);
        assert!(schema.is_sortable("title"));
        assert!(!schema.is_sortable("category"));
    }

    #[test]
    fn test_sortable_is_sticky() {
        let mut schema = Schema::new();
        schema.learn(&Document::new("a").with_field(Field::new("title", "x").sortable()));
        schema.learn(&Document::new("b").with_field(Field::new("title", "y")));
        assert!(schema.is_sortable("title"));
    }

    #[test]
    fn test_from_fields_keeps_reserved_key() {
        let mut fields = HashMap::new();
        fields.insert(KEY_FIELD.to_string(), FieldInfo::new(Analyzer::Standard));
        fields.insert("body".to_string(), FieldInfo::new(Analyzer::Snowball));

        let schema = Schema::from_fields(fields);
        assert_eq!(schema.analyzer_for(KEY_FIELD), Analyzer::Keyword);
        assert_eq!(schema.analyzer_for("body"), Analyzer::Snowball);
        assert_eq!(schema.len(), 2);
    }
}
