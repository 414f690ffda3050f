//! Term dictionary using FST (Finite State Transducer)
//!
//! Maps `field:token` terms to posting list metadata. The FST gives O(|key|)
//! lookups and drives the multi-term queries: prefix and range scans, and
//! Levenshtein automata for fuzzy matching.

use std::io;
use std::ops::Bound;

use fst::automaton::{Automaton, Levenshtein, Str};
use fst::{IntoStreamer, Map, MapBuilder, Streamer};

use super::types::PostingListMeta;

/// Term dictionary backed by FST
///
/// The FST stores a u64 value which indexes into a metadata array.
pub struct TermDictionary {
    /// FST mapping term -> index in metadata array
    fst: Map<Vec<u8>>,
    /// Metadata for each term (parallel to FST output values)
    metadata: Vec<PostingListMeta>,
}

impl TermDictionary {
    /// Create a term dictionary from FST data and metadata
    pub fn new(fst_data: Vec<u8>, metadata: Vec<PostingListMeta>) -> io::Result<Self> {
        let fst = Map::new(fst_data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if fst.len() != metadata.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "term dictionary has {} terms but {} metadata entries",
                    fst.len(),
                    metadata.len()
                ),
            ));
        }
        Ok(Self { fst, metadata })
    }

    pub fn empty() -> io::Result<Self> {
        TermDictionaryBuilder::new().build()
    }

    /// Look up a term and return its postings metadata
    pub fn get(&self, term: &str) -> Option<&PostingListMeta> {
        self.fst
            .get(term.as_bytes())
            .and_then(|idx| self.metadata.get(idx as usize))
    }

    /// Check if a term exists
    pub fn contains(&self, term: &str) -> bool {
        self.fst.contains_key(term.as_bytes())
    }

    /// Get the number of terms
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// All terms starting with `prefix`, in lexicographic order
    pub fn prefix_search(&self, prefix: &str) -> Vec<(String, &PostingListMeta)> {
        let automaton = Str::new(prefix).starts_with();
        self.collect(self.fst.search(automaton).into_stream())
    }

    /// All terms within `[lower, upper]` bounds
    pub fn range_search(&self, lower: Bound<&str>, upper: Bound<&str>) -> Vec<(String, &PostingListMeta)> {
        let mut range = self.fst.range();
        range = match lower {
            Bound::Included(t) => range.ge(t),
            Bound::Excluded(t) => range.gt(t),
            Bound::Unbounded => range,
        };
        range = match upper {
            Bound::Included(t) => range.le(t),
            Bound::Excluded(t) => range.lt(t),
            Bound::Unbounded => range,
        };
        self.collect(range.into_stream())
    }

    /// Terms starting with `prefix` whose full key is within `distance` edits of `term`
    ///
    /// `term` must itself start with `prefix`, so edits are confined to the
    /// suffix.
    pub fn fuzzy_search(
        &self,
        prefix: &str,
        term: &str,
        distance: u32,
    ) -> io::Result<Vec<(String, &PostingListMeta)>> {
        let lev = Levenshtein::new(term, distance)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let automaton = Str::new(prefix).starts_with().intersection(lev);
        Ok(self.collect(self.fst.search(automaton).into_stream()))
    }

    /// Get the raw FST data (for serialization)
    pub fn fst_bytes(&self) -> &[u8] {
        self.fst.as_fst().as_bytes()
    }

    /// Get the metadata array (for serialization)
    pub fn metadata(&self) -> &[PostingListMeta] {
        &self.metadata
    }

    /// Iterate over all terms in the dictionary
    pub fn iter_terms(&self) -> Vec<(String, &PostingListMeta)> {
        self.collect(self.fst.stream())
    }

    fn collect<S>(&self, mut stream: S) -> Vec<(String, &PostingListMeta)>
    where
        S: for<'a> Streamer<'a, Item = (&'a [u8], u64)>,
    {
        let mut results = Vec::new();
        while let Some((key, idx)) = stream.next() {
            if let (Ok(term), Some(meta)) = (std::str::from_utf8(key), self.metadata.get(idx as usize)) {
                results.push((term.to_string(), meta));
            }
        }
        results
    }
}

/// Builder for term dictionaries
pub struct TermDictionaryBuilder {
    terms: Vec<(String, PostingListMeta)>,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            terms: Vec::with_capacity(capacity),
        }
    }

    /// Add a term with its postings metadata
    pub fn add(&mut self, term: String, meta: PostingListMeta) {
        self.terms.push((term, meta));
    }

    /// Build the term dictionary
    pub fn build(mut self) -> io::Result<TermDictionary> {
        // FST requires sorted input
        self.terms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut fst_builder = MapBuilder::memory();
        let mut metadata = Vec::with_capacity(self.terms.len());

        for (idx, (term, meta)) in self.terms.into_iter().enumerate() {
            fst_builder
                .insert(term.as_bytes(), idx as u64)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            metadata.push(meta);
        }

        let fst_data = fst_builder
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        TermDictionary::new(fst_data, metadata)
    }
}

impl Default for TermDictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
