//! Segment writer for creating new immutable segments
//!
//! Two entry points:
//! - `write_from_buffer` turns the mutable buffer into a read handle. Used
//!   for Live and Frozen segments, never persisted.
//! - `merge_segments` concatenates the kept documents of several segments
//!   into a new segment and serializes every artifact for the store. Postings,
//!   positions, stored values and lengths are copied; no text is re-analyzed.

use std::collections::BTreeSet;
use std::io;

use crc32fast::Hasher;
use roaring::RoaringBitmap;

use super::buffer::MutableBuffer;
use super::docno_map::DocNoMap;
use super::postings::{PostingsReader, PostingsWriter};
use super::reader::{SegmentMeta, SegmentReader};
use super::statistics::SegmentStatistics;
use super::stored::StoredFields;
use super::term_dict::TermDictionaryBuilder;
use super::types::{DocNo, Posting, SegmentId};

fn invalid_data(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// Result of writing a segment
pub struct SegmentWriteResult {
    /// The created segment reader
    pub reader: SegmentReader,
    /// Postings data
    pub postings_data: Vec<u8>,
    /// Term dictionary FST data
    pub fst_data: Vec<u8>,
    /// Term metadata (bincode)
    pub term_meta_data: Vec<u8>,
    /// DocNo map serialized
    pub docno_map_data: Vec<u8>,
    /// Statistics serialized
    pub stats_data: Vec<u8>,
    /// Stored values serialized
    pub stored_data: Vec<u8>,
}

impl SegmentWriteResult {
    /// CRC32 over all persisted segment artifacts, in file order
    ///
    /// The manifest checksum must match this value when the segment is loaded.
    pub fn checksum(&self) -> u64 {
        segment_checksum([
            &self.postings_data[..],
            &self.fst_data,
            &self.term_meta_data,
            &self.docno_map_data,
            &self.stats_data,
            &self.stored_data,
        ])
    }
}

/// CRC32 over segment artifacts
pub fn segment_checksum<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> u64 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize() as u64
}

/// One input of a merge
pub struct MergeSource<'a> {
    pub reader: &'a SegmentReader,
    /// Restrict the merge to these docnos (still subject to delete bits)
    pub mask: Option<&'a RoaringBitmap>,
}

impl<'a> MergeSource<'a> {
    pub fn new(reader: &'a SegmentReader) -> Self {
        Self { reader, mask: None }
    }

    pub fn masked(reader: &'a SegmentReader, mask: &'a RoaringBitmap) -> Self {
        Self {
            reader,
            mask: Some(mask),
        }
    }

    /// Docnos carried into the merged segment
    fn kept(&self) -> RoaringBitmap {
        let mut kept = self.reader.live_docs().clone();
        if let Some(mask) = self.mask {
            kept &= mask;
        }
        kept
    }
}

/// Writer for creating new segments
pub struct SegmentWriter {
    segment_id: SegmentId,
}

impl SegmentWriter {
    pub fn new(segment_id: SegmentId) -> Self {
        Self { segment_id }
    }

    /// Build a read handle over the buffer's current contents
    ///
    /// Docnos are preserved, so deleted documents keep their slot and delete
    /// bit; their postings are dropped.
    pub fn write_from_buffer(&self, buffer: &MutableBuffer) -> io::Result<SegmentReader> {
        let mut postings_writer = PostingsWriter::new();
        let mut term_builder = TermDictionaryBuilder::with_capacity(buffer.all_postings().len());

        for (term, postings) in buffer.all_postings() {
            postings_writer.start_posting_list();

            let mut doc_frequency = 0u32;
            let mut total_term_frequency = 0u64;

            for posting in postings {
                if !buffer.is_deleted(posting.docno) {
                    postings_writer.add_posting(posting.clone());
                    doc_frequency += 1;
                    total_term_frequency += posting.term_frequency as u64;
                }
            }

            if doc_frequency > 0 {
                let meta = postings_writer.finish_posting_list(doc_frequency, total_term_frequency);
                term_builder.add(term.clone(), meta);
            }
        }

        let postings_data = postings_writer.into_data();
        let term_dict = term_builder.build()?;

        let docno_map = buffer.docno_map().clone();
        let stats = SegmentStatistics::from_doc_lengths(buffer.stats().doc_lengths().to_vec());

        let mut meta = SegmentMeta::new(self.segment_id);
        meta.doc_count = docno_map.len() as u32;
        meta.live_doc_count = docno_map.live_count() as u32;
        meta.term_count = term_dict.len() as u32;
        meta.size_bytes = postings_data.len() as u64;

        Ok(SegmentReader::from_memory(
            meta,
            term_dict,
            PostingsReader::new(postings_data),
            buffer.stored().clone(),
            stats,
            docno_map,
        ))
    }

    /// Merge the kept documents of `sources`, in order, into a new segment
    pub fn merge_segments(&self, sources: &[MergeSource<'_>]) -> io::Result<SegmentWriteResult> {
        let kept: Vec<RoaringBitmap> = sources.iter().map(MergeSource::kept).collect();

        // Docno remapping: sources are concatenated, so each remap is monotone
        let parts: Vec<(&DocNoMap, &RoaringBitmap)> = sources
            .iter()
            .zip(&kept)
            .map(|(s, k)| (s.reader.docno_map(), k))
            .collect();
        let (merged_docno_map, remaps) = DocNoMap::merge(&parts);

        let mut merged_stats = SegmentStatistics::with_capacity(merged_docno_map.len());
        let mut merged_stored = StoredFields::new();
        for (source, keep) in sources.iter().zip(&kept) {
            for old in keep.iter() {
                let old = DocNo(old);
                let doc_len = source.reader.get_doc_length(old).unwrap_or(0);
                merged_stats.add_document(doc_len);
                merged_stored.push(source.reader.stored().row(old));
            }
        }

        let mut all_terms: BTreeSet<String> = BTreeSet::new();
        for source in sources {
            for (term, _) in source.reader.terms().iter_terms() {
                all_terms.insert(term);
            }
        }

        let mut postings_writer = PostingsWriter::new();
        let mut term_builder = TermDictionaryBuilder::with_capacity(all_terms.len());

        for term in &all_terms {
            postings_writer.start_posting_list();
            let mut doc_frequency = 0u32;
            let mut total_term_frequency = 0u64;

            for (source, remap) in sources.iter().zip(&remaps) {
                let iter = match source.reader.get_postings(term)? {
                    Some(iter) => iter,
                    None => continue,
                };
                for posting in iter {
                    let new_docno = remap
                        .get(posting.docno.as_usize())
                        .copied()
                        .unwrap_or(DocNo::MAX);
                    if new_docno == DocNo::MAX {
                        continue;
                    }
                    doc_frequency += 1;
                    total_term_frequency += posting.term_frequency as u64;
                    postings_writer.add_posting(Posting {
                        docno: new_docno,
                        ..posting
                    });
                }
            }

            if doc_frequency > 0 {
                let meta = postings_writer.finish_posting_list(doc_frequency, total_term_frequency);
                term_builder.add(term.clone(), meta);
            }
        }

        let postings_data = postings_writer.into_data();
        let term_dict = term_builder.build()?;

        let mut meta = SegmentMeta::new(self.segment_id);
        meta.doc_count = merged_docno_map.len() as u32;
        meta.live_doc_count = merged_docno_map.live_count() as u32;
        meta.term_count = term_dict.len() as u32;
        meta.size_bytes = postings_data.len() as u64;

        let fst_data = term_dict.fst_bytes().to_vec();
        let term_meta_data = bincode::serialize(term_dict.metadata()).map_err(invalid_data)?;
        let docno_map_data = merged_docno_map.serialize()?;
        let stats_data = bincode::serialize(&merged_stats).map_err(invalid_data)?;
        let stored_data = merged_stored.serialize().map_err(invalid_data)?;

        let reader = SegmentReader::from_memory(
            meta,
            term_dict,
            PostingsReader::new(postings_data.clone()),
            merged_stored,
            merged_stats,
            merged_docno_map,
        );

        Ok(SegmentWriteResult {
            reader,
            postings_data,
            fst_data,
            term_meta_data,
            docno_map_data,
            stats_data,
            stored_data,
        })
    }
}
