//! Query execution context
//!
//! A `QueryContext` is built for each segment of a search snapshot. It gives
//! query nodes access to that segment's postings and visibility, and to the
//! [`CollectionStats`] shared by every segment, so BM25+ scores are comparable
//! across segments.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringBitmap;

use crate::segment::{Bm25Params, DocNo, IndexStatistics, Posting, SegmentReader};
use crate::Result;

/// Collection-wide statistics over the segments of one snapshot
///
/// Document frequencies are summed over segments the first time a term is
/// scored. Hidden and deleted copies are included, as in Lucene.
#[derive(Debug)]
pub struct CollectionStats {
    readers: Vec<Arc<SegmentReader>>,
    stats: RwLock<IndexStatistics>,
}

impl CollectionStats {
    pub fn new(readers: Vec<Arc<SegmentReader>>) -> Self {
        let stats = IndexStatistics::aggregate(readers.iter().map(|r| r.stats()));
        Self {
            readers,
            stats: RwLock::new(stats),
        }
    }

    pub fn total_docs(&self) -> u32 {
        self.stats.read().total_docs
    }

    pub fn avgdl(&self) -> f64 {
        self.stats.read().global_avgdl
    }

    /// Document frequency of `term` across the snapshot
    pub fn doc_frequency(&self, term: &str) -> u32 {
        if let Some(df) = self.stats.read().term_df(term) {
            return df;
        }
        let df = self.readers.iter().map(|r| r.doc_frequency(term)).sum();
        self.stats.write().set_term_df(term, df)
    }

    /// BM25+ contribution of `tf` occurrences of `term` in a document of `doc_len`
    pub fn bm25(&self, term: &str, tf: u32, doc_len: u32, params: &Bm25Params) -> f32 {
        self.doc_frequency(term);
        self.stats
            .read()
            .bm25_score(term, tf as f32, doc_len, params)
    }
}

/// Query execution context for a single segment
pub struct QueryContext {
    reader: Arc<SegmentReader>,
    /// Docnos a query may return: delete bits and tombstones already applied
    visible: Arc<RoaringBitmap>,
    collection: Arc<CollectionStats>,
    bm25: Bm25Params,
    /// Decoded posting lists, shared by every node of the query tree
    postings_cache: RwLock<HashMap<String, Arc<Vec<Posting>>>>,
    /// Match sets of multi-term nodes, keyed by their canonical form
    filter_cache: RwLock<HashMap<String, Arc<RoaringBitmap>>>,
}

impl QueryContext {
    pub fn new(
        reader: Arc<SegmentReader>,
        visible: Arc<RoaringBitmap>,
        collection: Arc<CollectionStats>,
        bm25: Bm25Params,
    ) -> Self {
        Self {
            reader,
            visible,
            collection,
            bm25,
            postings_cache: RwLock::new(HashMap::new()),
            filter_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn reader(&self) -> &Arc<SegmentReader> {
        &self.reader
    }

    pub fn visible(&self) -> &RoaringBitmap {
        &self.visible
    }

    pub fn collection(&self) -> &CollectionStats {
        &self.collection
    }

    /// Decoded postings of `term` in this segment, empty if absent
    pub fn postings(&self, term: &str) -> Result<Arc<Vec<Posting>>> {
        if let Some(cached) = self.postings_cache.read().get(term) {
            return Ok(Arc::clone(cached));
        }

        let postings: Vec<Posting> = match self.reader.get_postings(term)? {
            Some(iter) => iter.collect(),
            None => Vec::new(),
        };
        let postings = Arc::new(postings);
        self.postings_cache
            .write()
            .insert(term.to_string(), Arc::clone(&postings));
        Ok(postings)
    }

    /// Get or compute a cached filter result
    pub fn get_or_cache_filter<F>(&self, cache_key: &str, compute: F) -> Result<Arc<RoaringBitmap>>
    where
        F: FnOnce() -> Result<RoaringBitmap>,
    {
        if let Some(cached) = self.filter_cache.read().get(cache_key) {
            return Ok(Arc::clone(cached));
        }

        let result = Arc::new(compute()?);
        self.filter_cache
            .write()
            .insert(cache_key.to_string(), Arc::clone(&result));
        Ok(result)
    }

    /// Docnos containing `term`
    pub fn postings_bitmap(&self, term: &str) -> Result<RoaringBitmap> {
        Ok(self
            .postings(term)?
            .iter()
            .map(|p| p.docno.as_u32())
            .collect())
    }

    /// The posting of `term` for `docno`, if the document contains it
    pub fn posting(&self, term: &str, docno: u32) -> Result<Option<Posting>> {
        let postings = self.postings(term)?;
        Ok(postings
            .binary_search_by_key(&docno, |p| p.docno.as_u32())
            .ok()
            .map(|idx| postings[idx].clone()))
    }

    /// Term frequency of `term` in `docno`
    pub fn term_frequency(&self, term: &str, docno: u32) -> Result<u32> {
        Ok(self
            .posting(term, docno)?
            .map(|p| p.term_frequency)
            .unwrap_or(0))
    }

    /// Document frequency of `term` in this segment
    pub fn doc_frequency(&self, term: &str) -> u32 {
        self.reader.doc_frequency(term)
    }

    /// BM25+ score of `tf` occurrences of `term`, scaled by the field's
    /// index-time boost for `docno`
    pub fn bm25(&self, field: &str, term: &str, tf: u32, docno: u32) -> f32 {
        if tf == 0 {
            return 0.0;
        }
        let docno = DocNo(docno);
        let doc_len = self.reader.get_doc_length(docno).unwrap_or(0);
        let score = self.collection.bm25(term, tf, doc_len, &self.bm25);
        score * self.reader.boost(field, docno)
    }
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("segment", &self.reader.id())
            .field("visible", &self.visible.len())
            .finish()
    }
}
