//! The durable segment
//!
//! Disk is replaced, never patched: a compaction merges the current Disk
//! handle with the Frozen handle into a new segment (a [`MergeJob`], run
//! without the engine lock), hard-deletes keys shadowed while the merge ran
//! (a [`StagedSegment`]), then commits it by writing its delete bitmap and
//! swapping the manifest.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use roaring::RoaringBitmap;

use super::manifest::{ManifestEntry, ManifestHolder, SegmentManifest};
use super::reader::SegmentReader;
use super::store::SegmentStore;
use super::types::SegmentId;
use super::writer::{MergeSource, SegmentWriter};
use crate::error::Result;
use crate::schema::FieldInfo;

pub struct DiskSegment {
    store: Arc<SegmentStore>,
    manifest: ManifestHolder,
    reader: Arc<SegmentReader>,
}

impl DiskSegment {
    /// Open the committed segment under `dir`, or an empty one
    ///
    /// Segment directories the manifest does not reference are removed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let store = SegmentStore::new(dir)?;
        let manifest = store.load_manifest()?;
        let removed = store.remove_orphans(&manifest)?;

        let reader = match &manifest.current {
            Some(entry) => store.read_segment(entry)?,
            None => SegmentReader::empty(manifest.next_segment_id)?,
        };

        tracing::info!(
            path = %store.base_dir().display(),
            segment = %reader.id(),
            docs = reader.live_doc_count(),
            generation = manifest.generation,
            orphans = removed,
            "Opened disk segment"
        );

        Ok(Self {
            store: Arc::new(store),
            manifest: ManifestHolder::new(manifest),
            reader: Arc::new(reader),
        })
    }

    pub fn reader(&self) -> &Arc<SegmentReader> {
        &self.reader
    }

    pub fn manifest(&self) -> &ManifestHolder {
        &self.manifest
    }

    /// Schema persisted with the last commit
    pub fn persisted_fields(&self) -> HashMap<String, FieldInfo> {
        self.manifest.load().fields.clone()
    }

    /// Capture what a merge of `frozen` into this segment needs
    ///
    /// `mask` restricts which Disk ordinals survive; documents shadowed before
    /// the merge started are left out of it.
    pub fn prepare_merge(
        &self,
        frozen: Arc<SegmentReader>,
        mask: Arc<RoaringBitmap>,
    ) -> MergeJob {
        MergeJob {
            target: self.manifest.load().next_segment_id,
            store: Arc::clone(&self.store),
            disk: Arc::clone(&self.reader),
            mask,
            frozen,
        }
    }

    /// Make a staged segment the durable Disk segment
    ///
    /// The staged handle must have been merged from the current handle.
    pub fn commit(
        &mut self,
        staged: StagedSegment,
        fields: HashMap<String, FieldInfo>,
    ) -> Result<Arc<SegmentReader>> {
        let StagedSegment {
            reader,
            mut entry,
            deletes,
        } = staged;
        let id = entry.meta.id;

        self.store.write_deletes(id, &deletes)?;
        let reader = if deletes.is_empty() {
            reader
        } else {
            reader.with_deletes(&deletes)
        };
        entry.meta.live_doc_count = reader.live_doc_count();

        let mut manifest: SegmentManifest = self.manifest.snapshot();
        let replaced = manifest.commit_segment(entry, fields);
        self.store.save_manifest(&manifest)?;
        self.manifest.store(manifest);

        let previous = self.reader.id();
        self.reader = Arc::new(reader);

        let stale = replaced.map(|e| e.meta.id).unwrap_or(previous);
        if stale != id && !stale.is_ephemeral() {
            if let Err(e) = self.store.remove_segment(stale) {
                tracing::warn!(segment = %stale, error = %e, "Failed to remove replaced segment");
            }
        }

        tracing::info!(
            segment = %id,
            docs = self.reader.live_doc_count(),
            hard_deletes = deletes.len(),
            generation = self.manifest.generation(),
            "Committed disk segment"
        );
        Ok(Arc::clone(&self.reader))
    }
}

/// A merge captured under the engine lock and run without it
pub struct MergeJob {
    target: SegmentId,
    store: Arc<SegmentStore>,
    disk: Arc<SegmentReader>,
    mask: Arc<RoaringBitmap>,
    frozen: Arc<SegmentReader>,
}

impl MergeJob {
    pub fn target(&self) -> SegmentId {
        self.target
    }

    /// Merge and write the new segment's files
    pub fn run(&self) -> Result<StagedSegment> {
        let start = Instant::now();
        let sources = [
            MergeSource::masked(&self.disk, &self.mask),
            MergeSource::new(&self.frozen),
        ];
        let result = SegmentWriter::new(self.target).merge_segments(&sources)?;
        let entry = self.store.write_segment(&result)?;

        tracing::debug!(
            segment = %self.target,
            disk_docs = self.disk.live_doc_count(),
            frozen_docs = self.frozen.live_doc_count(),
            merged_docs = result.reader.max_doc(),
            took_ms = start.elapsed().as_millis() as u64,
            "Merged segments"
        );

        Ok(StagedSegment {
            reader: result.reader,
            entry,
            deletes: RoaringBitmap::new(),
        })
    }
}

/// Merged output that is written but not yet committed
pub struct StagedSegment {
    reader: SegmentReader,
    entry: ManifestEntry,
    deletes: RoaringBitmap,
}

impl StagedSegment {
    pub fn id(&self) -> SegmentId {
        self.entry.meta.id
    }

    /// Physically delete every copy of `key`, effective at commit
    ///
    /// Returns the number of documents deleted.
    pub fn hard_delete(&mut self, key: &str) -> Result<u64> {
        let mut docnos = self.reader.docnos_for_key(key)?;
        docnos -= &self.deletes;
        let count = docnos.len();
        self.deletes |= docnos;
        Ok(count)
    }

    pub fn pending_deletes(&self) -> u64 {
        self.deletes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::segment::{AnalyzedDocument, MutableBuffer};
    use crate::tokenizer::{Analyzer, AnalyzerSet};
    use tempfile::TempDir;

    fn frozen(docs: &[(&str, &str)]) -> Arc<SegmentReader> {
        let analyzers = AnalyzerSet::default();
        let mut buffer = MutableBuffer::new();
        for (key, body) in docs {
            let doc = Document::new(*key).with_text("body", *body);
            buffer.upsert(AnalyzedDocument::analyze(&doc, &analyzers));
        }
        Arc::new(
            SegmentWriter::new(SegmentId::EPHEMERAL)
                .write_from_buffer(&buffer)
                .unwrap(),
        )
    }

    fn full_mask(disk: &DiskSegment) -> Arc<RoaringBitmap> {
        let mut mask = RoaringBitmap::new();
        mask.insert_range(0..disk.reader().max_doc());
        Arc::new(mask)
    }

    fn compact(disk: &mut DiskSegment, docs: &[(&str, &str)], hard_deletes: &[&str]) {
        let job = disk.prepare_merge(frozen(docs), full_mask(disk));
        let mut staged = job.run().unwrap();
        for key in hard_deletes {
            staged.hard_delete(key).unwrap();
        }
        disk.commit(staged, HashMap::new()).unwrap();
    }

    #[test]
    fn test_open_empty() {
        let tmp = TempDir::new().unwrap();
        let disk = DiskSegment::open(tmp.path()).unwrap();
        assert!(disk.reader().is_empty());
        assert_eq!(disk.manifest().generation(), 0);
    }

    #[test]
    fn test_merge_commit_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let mut disk = DiskSegment::open(tmp.path()).unwrap();
        compact(&mut disk, &[("a", "alpha"), ("b", "beta")], &[]);
        compact(&mut disk, &[("c", "gamma")], &[]);
        assert_eq!(disk.reader().live_doc_count(), 3);
        assert_eq!(disk.reader().id(), SegmentId::new(1));
        assert!(!tmp.path().join("segment_0").exists());

        let mut fields = HashMap::new();
        fields.insert("tag".to_string(), FieldInfo::new(Analyzer::Keyword));
        let job = disk.prepare_merge(frozen(&[]), full_mask(&disk));
        disk.commit(job.run().unwrap(), fields).unwrap();
        drop(disk);

        let reopened = DiskSegment::open(tmp.path()).unwrap();
        assert_eq!(reopened.reader().live_doc_count(), 3);
        assert_eq!(reopened.reader().doc_frequency("body:gamma"), 1);
        assert_eq!(reopened.persisted_fields()["tag"].analyzer, Analyzer::Keyword);
    }

    #[test]
    fn test_mask_drops_shadowed_documents() {
        let tmp = TempDir::new().unwrap();
        let mut disk = DiskSegment::open(tmp.path()).unwrap();
        compact(&mut disk, &[("a", "old"), ("b", "keep")], &[]);

        let mut mask = (*full_mask(&disk)).clone();
        mask.remove(0);
        let job = disk.prepare_merge(frozen(&[("a", "new")]), Arc::new(mask));
        disk.commit(job.run().unwrap(), HashMap::new()).unwrap();

        let reader = disk.reader();
        assert_eq!(reader.max_doc(), 2);
        assert_eq!(reader.doc_frequency("body:old"), 0);
        assert_eq!(reader.doc_frequency("body:new"), 1);
    }

    #[test]
    fn test_hard_delete_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let mut disk = DiskSegment::open(tmp.path()).unwrap();
        compact(&mut disk, &[("a", "alpha"), ("b", "beta")], &["a", "missing"]);

        assert_eq!(disk.reader().live_doc_count(), 1);
        assert!(disk.reader().docnos_for_key("a").unwrap().len() == 1);
        assert_eq!(disk.manifest().load().total_live_doc_count(), 1);
        drop(disk);

        let reopened = DiskSegment::open(tmp.path()).unwrap();
        assert_eq!(reopened.reader().live_doc_count(), 1);
        assert_eq!(reopened.reader().max_doc(), 2);

        // The next merge expunges the deleted copy
        let mut disk = reopened;
        compact(&mut disk, &[], &[]);
        assert_eq!(disk.reader().max_doc(), 1);
    }

    #[test]
    fn test_staged_hard_delete_counts_once() {
        let tmp = TempDir::new().unwrap();
        let disk = DiskSegment::open(tmp.path()).unwrap();
        let job = disk.prepare_merge(frozen(&[("a", "x"), ("b", "y")]), full_mask(&disk));
        let mut staged = job.run().unwrap();
        assert_eq!(staged.hard_delete("a").unwrap(), 1);
        assert_eq!(staged.hard_delete("a").unwrap(), 0);
        assert_eq!(staged.pending_deletes(), 1);
    }

    #[test]
    fn test_orphans_removed_on_open() {
        let tmp = TempDir::new().unwrap();
        let mut disk = DiskSegment::open(tmp.path()).unwrap();
        compact(&mut disk, &[("a", "alpha")], &[]);

        // A merge that never committed
        let job = disk.prepare_merge(frozen(&[("b", "beta")]), full_mask(&disk));
        let staged = job.run().unwrap();
        let orphan = staged.id();
        drop(staged);
        drop(disk);
        assert!(tmp.path().join(orphan.to_string()).exists());

        let reopened = DiskSegment::open(tmp.path()).unwrap();
        assert!(!tmp.path().join(orphan.to_string()).exists());
        assert_eq!(reopened.reader().live_doc_count(), 1);
    }
}
