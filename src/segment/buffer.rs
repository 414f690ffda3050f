//! Mutable buffer for in-memory writes
//!
//! The buffer is the indexing structure behind the Live segment. Documents
//! arrive already analyzed, so the engine lock is never held while text is
//! tokenized. An upsert appends a fresh docno and marks the previous docno of
//! the same key deleted.

use std::collections::BTreeMap;

use super::docno_map::{DocNoMap, DocNoMapBuilder};
use super::statistics::SegmentStatistics;
use super::stored::{StoredFields, StoredRow};
use super::types::{DocNo, Posting};
use crate::models::Document;
use crate::schema::KEY_FIELD;
use crate::tokenizer::AnalyzerSet;

/// Build the indexed term for a field token
pub fn field_term(field: &str, token: &str) -> String {
    format!("{}:{}", field, token)
}

/// Term under which a document key is indexed
pub fn key_term(key: &str) -> String {
    field_term(KEY_FIELD, key)
}

/// A document after text analysis, ready to be indexed
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzedDocument {
    pub key: String,
    /// `field:token` -> ascending positions
    pub terms: BTreeMap<String, Vec<u32>>,
    /// Number of indexed tokens across all fields, excluding the key
    pub doc_len: u32,
    pub stored: StoredRow,
}

impl AnalyzedDocument {
    /// Analyze every field of `doc` with its analyzer
    ///
    /// Repeated fields continue the position sequence of the previous value,
    /// with a gap so phrases never match across values.
    pub fn analyze(doc: &Document, analyzers: &AnalyzerSet) -> Self {
        let mut terms: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut next_position: BTreeMap<&str, u32> = BTreeMap::new();
        let mut stored = StoredRow {
            payload: doc.payload.clone(),
            ..Default::default()
        };
        let mut doc_len = 0u32;

        for field in &doc.fields {
            let base = next_position.get(field.name.as_str()).copied().unwrap_or(0);
            let tokens = analyzers.analyze(field.analyzer, &field.value);

            let mut last = None;
            for (token, pos) in tokens {
                let pos = base + pos;
                terms
                    .entry(field_term(&field.name, &token))
                    .or_default()
                    .push(pos);
                last = Some(pos);
                doc_len += 1;
            }
            if let Some(last) = last {
                next_position.insert(field.name.as_str(), last + 2);
            }

            if field.sortable {
                stored
                    .sort_values
                    .insert(field.name.clone(), field.value.clone());
            }
            if field.boost != 1.0 {
                *stored.boosts.entry(field.name.clone()).or_insert(1.0) *= field.boost;
            }
        }

        terms.insert(key_term(&doc.key), vec![0]);

        Self {
            key: doc.key.clone(),
            terms,
            doc_len,
            stored,
        }
    }

    /// Approximate memory held once indexed
    pub fn size_bytes(&self) -> usize {
        let terms: usize = self
            .terms
            .iter()
            .map(|(t, p)| t.len() + std::mem::size_of::<Posting>() + p.len() * 4)
            .sum();
        let payload = self.stored.payload.as_ref().map(Vec::len).unwrap_or(0);
        let sorts: usize = self.stored.sort_values.values().map(String::len).sum();
        self.key.len() + terms + payload + sorts
    }
}

/// In-memory mutable buffer for recent writes
#[derive(Debug, Default)]
pub struct MutableBuffer {
    /// Term to postings mapping, kept sorted for segment writing
    terms: BTreeMap<String, Vec<Posting>>,
    /// Docno to key mapping with deletes
    docnos: DocNoMapBuilder,
    stats: SegmentStatistics,
    stored: StoredFields,
    /// Approximate size in bytes
    size_bytes: usize,
}

impl MutableBuffer {
    /// Create a new empty mutable buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a document, replacing any earlier version with the same key
    ///
    /// Returns the assigned DocNo and the DocNo it superseded.
    pub fn upsert(&mut self, doc: AnalyzedDocument) -> (DocNo, Option<DocNo>) {
        self.size_bytes += doc.size_bytes();

        let (docno, replaced) = self.docnos.upsert(&doc.key);
        let stats_docno = self.stats.add_document(doc.doc_len);
        let stored_docno = self.stored.push(doc.stored);
        debug_assert_eq!(docno, stats_docno);
        debug_assert_eq!(docno, stored_docno);

        for (term, positions) in doc.terms {
            self.terms
                .entry(term)
                .or_default()
                .push(Posting::with_positions(docno, positions));
        }

        (docno, replaced)
    }

    /// Mark the live version of `key` deleted
    pub fn delete(&mut self, key: &str) -> bool {
        self.docnos.delete_by_key(key).is_some()
    }

    /// Check if a document exists and is not deleted
    pub fn contains_key(&self, key: &str) -> bool {
        self.docnos.get_docno(key).is_some()
    }

    /// Get postings for a term
    pub fn get_postings(&self, term: &str) -> Option<&Vec<Posting>> {
        self.terms.get(term)
    }

    pub fn is_deleted(&self, docno: DocNo) -> bool {
        self.docnos.map().is_deleted(docno)
    }

    pub fn stats(&self) -> &SegmentStatistics {
        &self.stats
    }

    /// Number of docnos allocated, including superseded ones
    pub fn doc_count(&self) -> u32 {
        self.stats.doc_count
    }

    pub fn live_doc_count(&self) -> u32 {
        self.docnos.map().live_count() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.stats.doc_count == 0
    }

    /// Get approximate size in bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Get all postings in the buffer (for segment writing)
    pub fn all_postings(&self) -> &BTreeMap<String, Vec<Posting>> {
        &self.terms
    }

    pub fn docno_map(&self) -> &DocNoMap {
        self.docnos.map()
    }

    pub fn stored(&self) -> &StoredFields {
        &self.stored
    }
}
