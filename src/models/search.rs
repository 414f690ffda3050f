use serde::{Deserialize, Serialize};

/// Search request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Lucene-style query text
    pub query: String,
    /// Sort by this field's stored value instead of relevance
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_payload: bool,
}

fn default_limit() -> usize {
    10
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sort_by: None,
            descending: false,
            offset: 0,
            limit: default_limit(),
            include_payload: false,
        }
    }

    pub fn with_sort(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort_by = Some(field.into());
        self.descending = descending;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_payload(mut self) -> Self {
        self.include_payload = true;
        self
    }

    /// Sort field, ignoring blank names
    pub fn sort_field(&self) -> Option<&str> {
        self.sort_by.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// One page entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

/// Search response with timing information
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Number of visible matches across all segments
    pub total: u64,
    pub hits: Vec<SearchHit>,
    pub took_ms: u64,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.key.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_default() {
        let req = SearchRequest::new("title:dune");
        assert_eq!(req.limit, 10);
        assert_eq!(req.offset, 0);
        assert!(!req.include_payload);
        assert!(req.sort_field().is_none());
    }

    #[test]
    fn test_blank_sort_field_ignored() {
        let req = SearchRequest::new("x").with_sort("  ", true);
        assert!(req.sort_field().is_none());
        let req = SearchRequest::new("x").with_sort("title", true);
        assert_eq!(req.sort_field(), Some("title"));
        assert!(req.descending);
    }

    #[test]
    fn test_request_json_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query":"a"}"#).unwrap();
        assert_eq!(req.limit, 10);
        assert!(req.sort_by.is_none());
    }
}
