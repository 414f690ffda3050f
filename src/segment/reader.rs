//! Immutable segment reader
//!
//! A reader is the read handle for one segment: term dictionary, postings,
//! stored values, statistics and the docno map with its delete bits. Readers
//! are shared behind `Arc` by search snapshots and never mutated; applying
//! deletes produces a new reader.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::buffer::key_term;
use super::docno_map::DocNoMap;
use super::postings::{PostingIterator, PostingsReader};
use super::statistics::SegmentStatistics;
use super::stored::StoredFields;
use super::term_dict::TermDictionary;
use super::types::{DocNo, PostingListMeta, SegmentId};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

fn next_instance() -> u64 {
    NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

/// Metadata for a segment stored in the manifest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Unique segment identifier
    pub id: SegmentId,
    /// Number of documents in the segment, including deleted ones
    pub doc_count: u32,
    /// Number of live (non-deleted) documents
    pub live_doc_count: u32,
    /// Number of distinct terms
    pub term_count: u32,
    /// Size in bytes of the postings data
    pub size_bytes: u64,
    /// Creation timestamp (unix seconds)
    pub created_at: i64,
}

impl SegmentMeta {
    pub fn new(id: SegmentId) -> Self {
        Self {
            id,
            doc_count: 0,
            live_doc_count: 0,
            term_count: 0,
            size_bytes: 0,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Immutable segment reader backed by in-memory data
pub struct SegmentReader {
    /// Process-unique identity of this handle
    instance: u64,
    meta: SegmentMeta,
    terms: Arc<TermDictionary>,
    postings: Arc<PostingsReader>,
    stored: Arc<StoredFields>,
    stats: Arc<SegmentStatistics>,
    docno_map: Arc<DocNoMap>,
    /// Cached complement of the delete bits
    live_docs: Arc<RoaringBitmap>,
}

impl SegmentReader {
    /// Create a segment reader from in-memory data
    pub fn from_memory(
        meta: SegmentMeta,
        terms: TermDictionary,
        postings: PostingsReader,
        stored: StoredFields,
        stats: SegmentStatistics,
        docno_map: DocNoMap,
    ) -> Self {
        let live_docs = docno_map.live_bitmap();
        Self {
            instance: next_instance(),
            meta,
            terms: Arc::new(terms),
            postings: Arc::new(postings),
            stored: Arc::new(stored),
            stats: Arc::new(stats),
            docno_map: Arc::new(docno_map),
            live_docs: Arc::new(live_docs),
        }
    }

    /// A reader over zero documents
    pub fn empty(id: SegmentId) -> io::Result<Self> {
        Ok(Self::from_memory(
            SegmentMeta::new(id),
            TermDictionary::empty()?,
            PostingsReader::new(Vec::new()),
            StoredFields::new(),
            SegmentStatistics::new(),
            DocNoMap::new(),
        ))
    }

    /// A new handle over the same data with `docnos` additionally deleted
    pub fn with_deletes(&self, docnos: &RoaringBitmap) -> Self {
        let mut docno_map = (*self.docno_map).clone();
        docno_map.delete_all(docnos);
        let live_docs = docno_map.live_bitmap();

        let mut meta = self.meta.clone();
        meta.live_doc_count = live_docs.len() as u32;

        Self {
            instance: next_instance(),
            meta,
            terms: Arc::clone(&self.terms),
            postings: Arc::clone(&self.postings),
            stored: Arc::clone(&self.stored),
            stats: Arc::clone(&self.stats),
            docno_map: Arc::new(docno_map),
            live_docs: Arc::new(live_docs),
        }
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn id(&self) -> SegmentId {
        self.meta.id
    }

    /// Get the term dictionary
    pub fn terms(&self) -> &TermDictionary {
        &self.terms
    }

    /// Get postings metadata for a term
    pub fn get_posting_meta(&self, term: &str) -> Option<&PostingListMeta> {
        self.terms.get(term)
    }

    /// Get a posting iterator for a term
    pub fn get_postings(&self, term: &str) -> io::Result<Option<PostingIterator<'_>>> {
        match self.terms.get(term) {
            Some(meta) => Ok(Some(self.postings.get_postings(meta)?)),
            None => Ok(None),
        }
    }

    /// Posting iterator for metadata obtained from this reader's dictionary
    pub fn postings_for(&self, meta: &PostingListMeta) -> io::Result<PostingIterator<'_>> {
        self.postings.get_postings(meta)
    }

    /// Get document frequency for a term, deleted documents included
    pub fn doc_frequency(&self, term: &str) -> u32 {
        self.terms.get(term).map(|m| m.doc_frequency).unwrap_or(0)
    }

    /// Every docno indexed under `key`, deleted or not
    pub fn docnos_for_key(&self, key: &str) -> io::Result<RoaringBitmap> {
        let mut docnos = RoaringBitmap::new();
        if let Some(iter) = self.get_postings(&key_term(key))? {
            for posting in iter {
                docnos.insert(posting.docno.as_u32());
            }
        }
        Ok(docnos)
    }

    pub fn is_deleted(&self, docno: DocNo) -> bool {
        self.docno_map.is_deleted(docno)
    }

    pub fn is_live(&self, docno: DocNo) -> bool {
        self.docno_map.is_live(docno)
    }

    /// Bitmap of every docno not deleted in this segment
    pub fn live_docs(&self) -> &RoaringBitmap {
        &self.live_docs
    }

    pub fn get_key(&self, docno: DocNo) -> Option<&str> {
        self.docno_map.get_key(docno)
    }

    pub fn get_doc_length(&self, docno: DocNo) -> Option<u32> {
        self.stats.get_doc_length(docno)
    }

    pub fn stats(&self) -> &SegmentStatistics {
        &self.stats
    }

    pub fn stored(&self) -> &StoredFields {
        &self.stored
    }

    pub fn payload(&self, docno: DocNo) -> Option<&[u8]> {
        self.stored.payload(docno)
    }

    pub fn sort_value(&self, field: &str, docno: DocNo) -> Option<&str> {
        self.stored.sort_value(field, docno)
    }

    pub fn boost(&self, field: &str, docno: DocNo) -> f32 {
        self.stored.boost(field, docno)
    }

    pub fn docno_map(&self) -> &DocNoMap {
        &self.docno_map
    }

    /// Number of docnos, including deleted ones
    pub fn max_doc(&self) -> u32 {
        self.docno_map.len() as u32
    }

    pub fn live_doc_count(&self) -> u32 {
        self.live_docs.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.docno_map.is_empty()
    }

    /// Share of stored documents that are deleted but not yet expunged
    pub fn delete_ratio(&self) -> f64 {
        let max_doc = self.max_doc();
        if max_doc == 0 {
            0.0
        } else {
            1.0 - (self.live_doc_count() as f64 / max_doc as f64)
        }
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("instance", &self.instance)
            .field("id", &self.meta.id)
            .field("max_doc", &self.max_doc())
            .field("live_docs", &self.live_doc_count())
            .finish()
    }
}

/// Builder for creating segment readers from serialized data
#[derive(Default)]
pub struct SegmentReaderBuilder {
    meta: Option<SegmentMeta>,
    terms_data: Option<(Vec<u8>, Vec<PostingListMeta>)>,
    postings_data: Option<Vec<u8>>,
    stored: Option<StoredFields>,
    stats: Option<SegmentStatistics>,
    docno_map: Option<DocNoMap>,
}

impl SegmentReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meta(mut self, meta: SegmentMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_terms(mut self, fst_data: Vec<u8>, metadata: Vec<PostingListMeta>) -> Self {
        self.terms_data = Some((fst_data, metadata));
        self
    }

    pub fn with_postings(mut self, data: Vec<u8>) -> Self {
        self.postings_data = Some(data);
        self
    }

    pub fn with_stored(mut self, stored: StoredFields) -> Self {
        self.stored = Some(stored);
        self
    }

    pub fn with_stats(mut self, stats: SegmentStatistics) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_docno_map(mut self, docno_map: DocNoMap) -> Self {
        self.docno_map = Some(docno_map);
        self
    }

    pub fn build(self) -> io::Result<SegmentReader> {
        let mut meta = self
            .meta
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Missing segment meta"))?;

        let (fst_data, term_meta) = self
            .terms_data
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Missing terms data"))?;
        let terms = TermDictionary::new(fst_data, term_meta)?;

        let postings_data = self
            .postings_data
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Missing postings data"))?;

        let docno_map = self
            .docno_map
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Missing docno map"))?;
        let stats = self.stats.unwrap_or_default();
        let stored = self.stored.unwrap_or_default();

        if stats.doc_count as usize != docno_map.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "segment {} has {} lengths for {} docnos",
                    meta.id,
                    stats.doc_count,
                    docno_map.len()
                ),
            ));
        }

        meta.live_doc_count = docno_map.live_count() as u32;

        Ok(SegmentReader::from_memory(
            meta,
            terms,
            PostingsReader::new(postings_data),
            stored,
            stats,
            docno_map,
        ))
    }
}
