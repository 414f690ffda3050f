//! Segment manifest
//!
//! The manifest names the committed Disk segment. Commit order:
//! 1. Write the segment files
//! 2. Write `segments.manifest.tmp` and sync it
//! 3. Rename over `segments.manifest`
//!
//! A crash before step 3 leaves the previous manifest in charge; the files of
//! the unreferenced segment are removed the next time the store is opened.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::reader::SegmentMeta;
use super::types::SegmentId;
use crate::schema::FieldInfo;

/// Manifest entry for a segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Segment metadata
    pub meta: SegmentMeta,
    /// CRC32 of the segment files
    pub checksum: u64,
}

/// The segment manifest tracks the committed Disk segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentManifest {
    /// Manifest version (for format upgrades)
    pub version: u32,
    /// Generation number (incremented on each commit)
    pub generation: u64,
    /// Next segment ID to allocate
    pub next_segment_id: SegmentId,
    /// Current Disk segment, absent until the first commit
    pub current: Option<ManifestEntry>,
    /// Schema learned from writes, as of this commit
    pub fields: HashMap<String, FieldInfo>,
    /// Timestamp of last update (unix millis)
    pub updated_at: i64,
}

impl SegmentManifest {
    /// Current manifest format version
    pub const VERSION: u32 = 1;

    /// Create a new empty manifest
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            generation: 0,
            next_segment_id: SegmentId::new(0),
            current: None,
            fields: HashMap::new(),
            updated_at: 0,
        }
    }

    /// Allocate a new segment ID
    pub fn allocate_segment_id(&mut self) -> SegmentId {
        let id = self.next_segment_id;
        self.next_segment_id = id.next();
        id
    }

    /// Point the manifest at a newly committed segment
    ///
    /// Returns the entry it replaced.
    pub fn commit_segment(
        &mut self,
        entry: ManifestEntry,
        fields: HashMap<String, FieldInfo>,
    ) -> Option<ManifestEntry> {
        if entry.meta.id >= self.next_segment_id {
            self.next_segment_id = entry.meta.id.next();
        }
        self.generation += 1;
        self.updated_at = chrono::Utc::now().timestamp_millis();
        self.fields = fields;
        self.current.replace(entry)
    }

    pub fn current_id(&self) -> Option<SegmentId> {
        self.current.as_ref().map(|e| e.meta.id)
    }

    /// Documents in the current segment, deleted ones included
    pub fn total_doc_count(&self) -> u64 {
        self.current.as_ref().map(|e| e.meta.doc_count as u64).unwrap_or(0)
    }

    pub fn total_live_doc_count(&self) -> u64 {
        self.current
            .as_ref()
            .map(|e| e.meta.live_doc_count as u64)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Serialize the manifest to JSON
    pub fn to_json(&self) -> io::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Serialize the manifest to bincode (more compact)
    pub fn to_bincode(&self) -> io::Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Deserialize manifest from bincode
    pub fn from_bincode(data: &[u8]) -> io::Result<Self> {
        let manifest: Self = bincode::deserialize(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if manifest.version > Self::VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported manifest version {}", manifest.version),
            ));
        }
        Ok(manifest)
    }
}

impl Default for SegmentManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe manifest holder with atomic updates
pub struct ManifestHolder {
    inner: arc_swap::ArcSwap<SegmentManifest>,
}

impl ManifestHolder {
    pub fn new(manifest: SegmentManifest) -> Self {
        Self {
            inner: arc_swap::ArcSwap::from_pointee(manifest),
        }
    }

    /// Get the current manifest
    pub fn load(&self) -> arc_swap::Guard<Arc<SegmentManifest>> {
        self.inner.load()
    }

    /// Get a clone of the current manifest
    pub fn snapshot(&self) -> SegmentManifest {
        (**self.inner.load()).clone()
    }

    /// Atomically replace the manifest
    pub fn store(&self, manifest: SegmentManifest) {
        self.inner.store(Arc::new(manifest));
    }

    pub fn generation(&self) -> u64 {
        self.inner.load().generation
    }
}

impl Default for ManifestHolder {
    fn default() -> Self {
        Self::new(SegmentManifest::new())
    }
}
