//! Tombstone filter
//!
//! A segment that cannot be rewritten in place (Disk, or Frozen while a merge
//! runs) still holds the old copy of every key overwritten or removed since it
//! was built. The filter hides those copies from queries until the next merge
//! drops them for good.
//!
//! A filter is bound to the read handle it was built against. Ordinals are not
//! stable across merges, so using it with any other handle is an internal
//! state violation and fails with [`RtSearchError::ConcurrentState`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use roaring::RoaringBitmap;

use super::reader::SegmentReader;
use super::types::SegmentId;
use crate::error::{Result, RtSearchError};

/// Outcome of looking a key up without changing the filter
#[derive(Debug, Clone, PartialEq)]
pub enum TombstoneProbe {
    /// The key was looked up before; `true` if it hid documents
    Memoized(bool),
    /// Live docnos holding the key (possibly none)
    Found(RoaringBitmap),
}

#[derive(Debug, Clone)]
pub struct TombstoneFilter {
    segment: SegmentId,
    instance: u64,
    max_doc: u32,
    /// Visible ordinals; cloned on write while search snapshots hold it
    visible: Arc<RoaringBitmap>,
    /// key -> whether the key hid anything
    memo: HashMap<String, bool>,
}

impl TombstoneFilter {
    /// A filter with every ordinal of `reader` visible
    pub fn new(reader: &SegmentReader) -> Self {
        let mut visible = RoaringBitmap::new();
        visible.insert_range(0..reader.max_doc());
        Self {
            segment: reader.id(),
            instance: reader.instance(),
            max_doc: reader.max_doc(),
            visible: Arc::new(visible),
            memo: HashMap::new(),
        }
    }

    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Fail unless `reader` is the handle this filter was built against
    pub fn check(&self, reader: &SegmentReader) -> Result<()> {
        if reader.instance() != self.instance {
            return Err(RtSearchError::ConcurrentState(format!(
                "tombstone filter for {} (handle {}) applied to {} (handle {})",
                self.segment,
                self.instance,
                reader.id(),
                reader.instance()
            )));
        }
        Ok(())
    }

    /// Look `key` up in `reader` without touching the filter
    pub fn probe(&self, reader: &SegmentReader, key: &str) -> Result<TombstoneProbe> {
        self.check(reader)?;
        if let Some(&hid) = self.memo.get(key) {
            return Ok(TombstoneProbe::Memoized(hid));
        }
        let mut docnos = reader.docnos_for_key(key)?;
        docnos &= reader.live_docs();
        Ok(TombstoneProbe::Found(docnos))
    }

    /// Record a probe taken against this filter's handle
    ///
    /// Returns whether the key hides anything.
    pub fn apply(&mut self, key: &str, probe: TombstoneProbe) -> bool {
        match probe {
            TombstoneProbe::Memoized(hid) => hid,
            TombstoneProbe::Found(docnos) => {
                let hid = !docnos.is_empty();
                if hid {
                    let visible = Arc::make_mut(&mut self.visible);
                    *visible -= docnos;
                }
                self.memo.insert(key.to_string(), hid);
                hid
            }
        }
    }

    /// Hide every copy of `key` held by `reader`
    pub fn hide_key(&mut self, reader: &SegmentReader, key: &str) -> Result<bool> {
        let probe = self.probe(reader, key)?;
        Ok(self.apply(key, probe))
    }

    /// Current visibility bitmap; later hides do not affect the returned snapshot
    pub fn visible_set(&self) -> Arc<RoaringBitmap> {
        Arc::clone(&self.visible)
    }

    /// Keys that hid at least one document
    pub fn shadowed_keys(&self) -> BTreeSet<String> {
        self.memo
            .iter()
            .filter(|(_, &hid)| hid)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn shadowed_count(&self) -> usize {
        self.memo.values().filter(|&&hid| hid).count()
    }

    /// Ordinals hidden so far
    pub fn hidden_count(&self) -> u64 {
        self.max_doc as u64 - self.visible.len()
    }
}
