//! The writable, memory-resident segment
//!
//! Writes go into a [`MutableBuffer`]. Readers see the buffer through an
//! immutable [`SegmentReader`] snapshot that is rebuilt on demand: a write
//! sets the dirty flag, and the next search flushes before snapshotting.
//! Handles taken before a flush stay valid and keep their old contents.

use std::io;
use std::sync::Arc;

use super::buffer::{AnalyzedDocument, MutableBuffer};
use super::reader::SegmentReader;
use super::types::SegmentId;
use super::writer::SegmentWriter;

pub struct LiveSegment {
    buffer: MutableBuffer,
    reader: Arc<SegmentReader>,
    dirty: bool,
}

impl LiveSegment {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            buffer: MutableBuffer::new(),
            reader: Arc::new(SegmentReader::empty(SegmentId::EPHEMERAL)?),
            dirty: false,
        })
    }

    /// Insert or replace the document with the same key
    ///
    /// Returns true when an earlier Live version was superseded.
    pub fn upsert(&mut self, doc: AnalyzedDocument) -> bool {
        let (_, replaced) = self.buffer.upsert(doc);
        self.dirty = true;
        replaced.is_some()
    }

    /// Delete the Live version of `key`, if any
    pub fn delete(&mut self, key: &str) -> bool {
        let deleted = self.buffer.delete(key);
        if deleted {
            self.dirty = true;
        }
        deleted
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.buffer.contains_key(key)
    }

    /// Make pending writes visible to new read handles
    ///
    /// Returns the current handle, rebuilt first if writes are pending.
    pub fn flush_if_dirty(&mut self) -> io::Result<Arc<SegmentReader>> {
        if self.dirty {
            let reader = SegmentWriter::new(SegmentId::EPHEMERAL).write_from_buffer(&self.buffer)?;
            self.reader = Arc::new(reader);
            self.dirty = false;
        }
        Ok(Arc::clone(&self.reader))
    }

    /// The last flushed handle, possibly behind the buffer
    pub fn reader(&self) -> &Arc<SegmentReader> {
        &self.reader
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Estimated memory footprint of the buffer
    pub fn size_bytes(&self) -> usize {
        self.buffer.size_bytes()
    }

    /// Docnos allocated so far, superseded ones included
    pub fn doc_count(&self) -> u32 {
        self.buffer.doc_count()
    }

    pub fn live_doc_count(&self) -> u32 {
        self.buffer.live_doc_count()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
