//! Segment-based inverted index for full-text search
//!
//! # Architecture
//!
//! - `MutableBuffer`: in-memory indexing structure behind the Live segment
//! - `LiveSegment`: the writable segment, flushed to read handles on demand
//! - `SegmentReader`: immutable read handle shared by search snapshots
//! - `DiskSegment`: the durable segment, replaced by merges
//! - `TombstoneFilter`: hides superseded copies in segments that cannot be
//!   rewritten in place
//! - `SegmentStore` / `SegmentManifest`: segment files and the atomic commit
//!   record

mod types;
mod statistics;
mod buffer;
mod postings;
mod term_dict;
mod docno_map;
mod stored;
mod reader;
mod writer;
mod manifest;
mod store;
mod live;
mod tombstone;
mod disk;

pub use types::*;
pub use statistics::*;
pub use buffer::*;
pub use postings::*;
pub use term_dict::*;
pub use docno_map::*;
pub use stored::*;
pub use reader::*;
pub use writer::*;
pub use manifest::*;
pub use store::*;
pub use live::*;
pub use tombstone::*;
pub use disk::*;
