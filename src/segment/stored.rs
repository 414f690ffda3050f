//! Stored per-document values
//!
//! Everything a hit needs besides its key: the opaque payload, the raw value
//! of each sortable field (dictionary-encoded per column) and index-time
//! field boosts that differ from 1.0. Serialized with bincode as `stored.bin`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::types::DocNo;

/// Stored values of one document
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoredRow {
    pub payload: Option<Vec<u8>>,
    /// Sortable field -> raw value
    pub sort_values: BTreeMap<String, String>,
    /// Field -> index-time boost, only for boosts other than 1.0
    pub boosts: BTreeMap<String, f32>,
}

/// Keyword column with dictionary encoding
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeywordColumn {
    /// Dictionary: ordinal -> keyword
    dictionary: Vec<String>,
    /// Reverse lookup: keyword -> ordinal
    #[serde(skip)]
    keyword_to_ordinal: HashMap<String, u32>,
    /// Ordinals indexed by docno
    ordinals: Vec<Option<u32>>,
}

impl KeywordColumn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of `docno`, padding skipped docnos with nulls
    pub fn set(&mut self, docno: DocNo, value: &str) {
        if self.ordinals.len() <= docno.as_usize() {
            self.ordinals.resize(docno.as_usize() + 1, None);
        }
        let ordinal = match self.keyword_to_ordinal.get(value) {
            Some(&ord) => ord,
            None => {
                let ord = self.dictionary.len() as u32;
                self.dictionary.push(value.to_string());
                self.keyword_to_ordinal.insert(value.to_string(), ord);
                ord
            }
        };
        self.ordinals[docno.as_usize()] = Some(ordinal);
    }

    /// Get value for a docno
    pub fn get(&self, docno: DocNo) -> Option<&str> {
        self.ordinals
            .get(docno.as_usize())
            .and_then(|ord| ord.as_ref())
            .and_then(|&ord| self.dictionary.get(ord as usize))
            .map(|s| s.as_str())
    }

    /// Get all unique keywords
    pub fn unique_keywords(&self) -> &[String] {
        &self.dictionary
    }

    fn rebuild_lookup(&mut self) {
        self.keyword_to_ordinal = self
            .dictionary
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i as u32))
            .collect();
    }
}

/// Stored values for every docno of a segment
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoredFields {
    payloads: Vec<Option<Vec<u8>>>,
    sort_columns: BTreeMap<String, KeywordColumn>,
    /// Sparse: field -> docno -> boost
    boosts: BTreeMap<String, BTreeMap<u32, f32>>,
}

impl StoredFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the row for the next docno
    pub fn push(&mut self, row: StoredRow) -> DocNo {
        let docno = DocNo::new(self.payloads.len() as u32);
        self.payloads.push(row.payload);
        for (field, value) in row.sort_values {
            self.sort_columns.entry(field).or_default().set(docno, &value);
        }
        for (field, boost) in row.boosts {
            self.boosts.entry(field).or_default().insert(docno.as_u32(), boost);
        }
        docno
    }

    /// Reassemble the row of `docno` (used when merging segments)
    pub fn row(&self, docno: DocNo) -> StoredRow {
        StoredRow {
            payload: self.payload(docno).map(<[u8]>::to_vec),
            sort_values: self
                .sort_columns
                .iter()
                .filter_map(|(field, col)| col.get(docno).map(|v| (field.clone(), v.to_string())))
                .collect(),
            boosts: self
                .boosts
                .iter()
                .filter_map(|(field, docs)| docs.get(&docno.as_u32()).map(|&b| (field.clone(), b)))
                .collect(),
        }
    }

    pub fn payload(&self, docno: DocNo) -> Option<&[u8]> {
        self.payloads
            .get(docno.as_usize())
            .and_then(|p| p.as_deref())
    }

    /// Raw sort value of `field` for `docno`
    pub fn sort_value(&self, field: &str, docno: DocNo) -> Option<&str> {
        self.sort_columns.get(field).and_then(|col| col.get(docno))
    }

    pub fn has_sort_column(&self, field: &str) -> bool {
        self.sort_columns.contains_key(field)
    }

    /// Index-time boost of `field` for `docno`
    pub fn boost(&self, field: &str, docno: DocNo) -> f32 {
        self.boosts
            .get(field)
            .and_then(|docs| docs.get(&docno.as_u32()))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Rough in-memory footprint
    pub fn size_bytes(&self) -> usize {
        let payloads: usize = self
            .payloads
            .iter()
            .map(|p| p.as_ref().map(Vec::len).unwrap_or(0) + std::mem::size_of::<Option<Vec<u8>>>())
            .sum();
        let sorts: usize = self
            .sort_columns
            .values()
            .map(|c| c.ordinals.len() * 8 + c.dictionary.iter().map(String::len).sum::<usize>())
            .sum();
        let boosts: usize = self.boosts.values().map(|m| m.len() * 8).sum();
        payloads + sorts + boosts
    }

    pub fn serialize(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn deserialize(data: &[u8]) -> bincode::Result<Self> {
        let mut stored: StoredFields = bincode::deserialize(data)?;
        for column in stored.sort_columns.values_mut() {
            column.rebuild_lookup();
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(payload: Option<&str>, sorts: &[(&str, &str)], boosts: &[(&str, f32)]) -> StoredRow {
        StoredRow {
            payload: payload.map(|p| p.as_bytes().to_vec()),
            sort_values: sorts.iter().map(|(f, v)| (f.to_string(), v.to_string())).collect(),
            boosts: boosts.iter().map(|(f, b)| (f.to_string(), *b)).collect(),
        }
    }

    #[test]
    fn test_keyword_column_padding() {
        let mut col = KeywordColumn::new();
        col.set(DocNo(3), "b");
        col.set(DocNo(5), "a");
        col.set(DocNo(6), "b");

        assert_eq!(col.get(DocNo(0)), None);
        assert_eq!(col.get(DocNo(3)), Some("b"));
        assert_eq!(col.get(DocNo(6)), Some("b"));
        assert_eq!(col.get(DocNo(9)), None);
        assert_eq!(col.unique_keywords(), &["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_stored_fields_rows() {
        let mut stored = StoredFields::new();
        stored.push(row(Some("p0"), &[("title", "Dune")], &[]));
        stored.push(row(None, &[], &[("title", 2.5)]));
        stored.push(row(Some("p2"), &[("title", "Emma")], &[]));

        assert_eq!(stored.len(), 3);
        assert_eq!(stored.payload(DocNo(0)), Some(&b"p0"[..]));
        assert_eq!(stored.payload(DocNo(1)), None);
        assert_eq!(stored.sort_value("title", DocNo(2)), Some("Emma"));
        assert_eq!(stored.sort_value("title", DocNo(1)), None);
        assert_eq!(stored.boost("title", DocNo(1)), 2.5);
        assert_eq!(stored.boost("title", DocNo(0)), 1.0);
        assert!(stored.has_sort_column("title"));

        assert_eq!(stored.row(DocNo(1)), row(None, &[], &[("title", 2.5)]));
    }

    #[test]
    fn test_stored_fields_serialization() {
        let mut stored = StoredFields::new();
        stored.push(row(Some("x"), &[("author", "Herbert")], &[("body", 0.5)]));
        stored.push(row(None, &[("author", "Austen")], &[]));

        let bytes = stored.serialize().unwrap();
        let mut restored = StoredFields::deserialize(&bytes).unwrap();

        assert_eq!(restored.row(DocNo(0)), stored.row(DocNo(0)));
        assert_eq!(restored.sort_value("author", DocNo(1)), Some("Austen"));

        // Lookup table is rebuilt so new values reuse ordinals
        restored.push(row(None, &[("author", "Austen")], &[]));
        assert_eq!(
            restored.sort_columns["author"].unique_keywords().len(),
            2
        );
    }
}
