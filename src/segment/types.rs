//! Core types for the segment-based index

use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment identifier (monotonically increasing per index)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// Id carried by in-memory segments that never reach the store
    pub const EPHEMERAL: SegmentId = SegmentId(u64::MAX);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn is_ephemeral(&self) -> bool {
        *self == Self::EPHEMERAL
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ephemeral() {
            write!(f, "segment_mem")
        } else {
            write!(f, "segment_{}", self.0)
        }
    }
}

/// Dense document number within a segment (0..max_doc)
/// This is used internally for efficient posting list storage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocNo(pub u32);

impl DocNo {
    pub const MAX: DocNo = DocNo(u32::MAX);

    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// A single posting entry within a posting list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Dense document number within the segment
    pub docno: DocNo,
    /// Term frequency in this document
    pub term_frequency: u32,
    /// Token positions, ascending
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(docno: DocNo, term_frequency: u32) -> Self {
        Self {
            docno,
            term_frequency,
            positions: Vec::new(),
        }
    }

    pub fn with_positions(docno: DocNo, positions: Vec<u32>) -> Self {
        Self {
            docno,
            term_frequency: positions.len() as u32,
            positions,
        }
    }
}

/// Block of postings (fixed size for SIMD-friendly processing)
pub const BLOCK_SIZE: usize = 128;

/// A block of postings with skip data and impact metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostingBlock {
    /// Document numbers (delta-encoded when serialized)
    pub docnos: Vec<DocNo>,
    /// Term frequencies
    pub term_frequencies: Vec<u32>,
    /// Per-document positions (delta-encoded when serialized)
    pub positions: Vec<Vec<u32>>,
    /// Maximum document number in this block (for skip data)
    pub max_docno: DocNo,
    /// Maximum term frequency in this block
    pub max_tf: u32,
}

impl PostingBlock {
    pub fn new() -> Self {
        Self {
            docnos: Vec::with_capacity(BLOCK_SIZE),
            term_frequencies: Vec::with_capacity(BLOCK_SIZE),
            positions: Vec::with_capacity(BLOCK_SIZE),
            max_docno: DocNo(0),
            max_tf: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.docnos.len() >= BLOCK_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.docnos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docnos.len()
    }

    pub fn push(&mut self, posting: Posting) {
        if posting.docno > self.max_docno {
            self.max_docno = posting.docno;
        }
        if posting.term_frequency > self.max_tf {
            self.max_tf = posting.term_frequency;
        }
        self.docnos.push(posting.docno);
        self.term_frequencies.push(posting.term_frequency);
        self.positions.push(posting.positions);
    }
}

impl Default for PostingBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Posting list metadata stored in the term dictionary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostingListMeta {
    /// Offset in the postings file
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
    /// Document frequency (number of documents containing this term)
    pub doc_frequency: u32,
    /// Total term frequency across all documents
    pub total_term_frequency: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_id() {
        let id = SegmentId::new(42);
        assert_eq!(id.0, 42);
        assert_eq!(id.next().0, 43);
        assert_eq!(format!("{}", id), "segment_42");
        assert!(SegmentId::EPHEMERAL.is_ephemeral());
        assert!(!id.is_ephemeral());
    }

    #[test]
    fn test_docno() {
        let docno = DocNo::new(100);
        assert_eq!(docno.as_u32(), 100);
        assert_eq!(docno.as_usize(), 100);
    }

    #[test]
    fn test_posting_block() {
        let mut block = PostingBlock::new();
        assert!(block.is_empty());
        assert!(!block.is_full());

        block.push(Posting::with_positions(DocNo(1), vec![0, 3, 9, 12, 20]));
        block.push(Posting::new(DocNo(10), 3));

        assert_eq!(block.len(), 2);
        assert_eq!(block.max_docno, DocNo(10));
        assert_eq!(block.max_tf, 5);
        assert_eq!(block.positions[0], vec![0, 3, 9, 12, 20]);
    }
}
