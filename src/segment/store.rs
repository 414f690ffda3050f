use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use roaring::RoaringBitmap;

use crate::segment::docno_map::DocNoMap;
use crate::segment::manifest::{ManifestEntry, SegmentManifest};
use crate::segment::reader::{SegmentReader, SegmentReaderBuilder};
use crate::segment::statistics::SegmentStatistics;
use crate::segment::stored::StoredFields;
use crate::segment::types::{PostingListMeta, SegmentId};
use crate::segment::writer::{segment_checksum, SegmentWriteResult};

const MANIFEST_FILE: &str = "segments.manifest";
const MANIFEST_TMP_FILE: &str = "segments.manifest.tmp";
const SEGMENT_DIR_PREFIX: &str = "segment_";

const POSTINGS_FILE: &str = "postings.bin";
const FST_FILE: &str = "fst.bin";
const TERM_META_FILE: &str = "term_meta.bin";
const DOCNO_MAP_FILE: &str = "docno_map.bin";
const STATS_FILE: &str = "stats.bin";
const STORED_FILE: &str = "stored.bin";
const DELETES_FILE: &str = "deletes.bin";

fn invalid_data(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// Persistent storage for segment files and manifest.
pub struct SegmentStore {
    base_dir: PathBuf,
}

impl SegmentStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> io::Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn segment_dir(&self, id: SegmentId) -> PathBuf {
        self.base_dir.join(id.to_string())
    }

    /// Write every artifact of a merged segment and return its manifest entry
    pub fn write_segment(&self, result: &SegmentWriteResult) -> io::Result<ManifestEntry> {
        let meta = result.reader.meta().clone();
        let dir = self.segment_dir(meta.id);
        // Leftovers of a failed attempt at the same id
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        write_synced(&dir.join(POSTINGS_FILE), &result.postings_data)?;
        write_synced(&dir.join(FST_FILE), &result.fst_data)?;
        write_synced(&dir.join(TERM_META_FILE), &result.term_meta_data)?;
        write_synced(&dir.join(DOCNO_MAP_FILE), &result.docno_map_data)?;
        write_synced(&dir.join(STATS_FILE), &result.stats_data)?;
        write_synced(&dir.join(STORED_FILE), &result.stored_data)?;
        sync_dir(&dir)?;

        tracing::debug!(segment = %meta.id, docs = meta.doc_count, "Wrote segment files");

        Ok(ManifestEntry {
            meta,
            checksum: result.checksum(),
        })
    }

    /// Persist the hard-delete bitmap of a segment
    pub fn write_deletes(&self, id: SegmentId, deletes: &RoaringBitmap) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(deletes.serialized_size());
        deletes.serialize_into(&mut bytes)?;
        let dir = self.segment_dir(id);
        write_synced(&dir.join(DELETES_FILE), &bytes)?;
        sync_dir(&dir)
    }

    /// Load a committed segment, verifying its checksum and applying its deletes
    pub fn read_segment(&self, entry: &ManifestEntry) -> io::Result<SegmentReader> {
        let dir = self.segment_dir(entry.meta.id);
        let postings = fs::read(dir.join(POSTINGS_FILE))?;
        let fst_data = fs::read(dir.join(FST_FILE))?;
        let term_meta_bytes = fs::read(dir.join(TERM_META_FILE))?;
        let docno_map_bytes = fs::read(dir.join(DOCNO_MAP_FILE))?;
        let stats_bytes = fs::read(dir.join(STATS_FILE))?;
        let stored_bytes = fs::read(dir.join(STORED_FILE))?;

        let checksum = segment_checksum([
            &postings[..],
            &fst_data,
            &term_meta_bytes,
            &docno_map_bytes,
            &stats_bytes,
            &stored_bytes,
        ]);
        if checksum != entry.checksum {
            return Err(invalid_data(format!(
                "checksum mismatch for {}: manifest {:#x}, files {:#x}",
                entry.meta.id, entry.checksum, checksum
            )));
        }

        let term_meta: Vec<PostingListMeta> =
            bincode::deserialize(&term_meta_bytes).map_err(invalid_data)?;
        let stats: SegmentStatistics = bincode::deserialize(&stats_bytes).map_err(invalid_data)?;
        let stored = StoredFields::deserialize(&stored_bytes).map_err(invalid_data)?;

        let reader = SegmentReaderBuilder::new()
            .with_meta(entry.meta.clone())
            .with_terms(fst_data, term_meta)
            .with_postings(postings)
            .with_docno_map(DocNoMap::deserialize(&docno_map_bytes)?)
            .with_stats(stats)
            .with_stored(stored)
            .build()?;

        let deletes_path = dir.join(DELETES_FILE);
        if deletes_path.exists() {
            let bytes = fs::read(deletes_path)?;
            let deletes = RoaringBitmap::deserialize_from(&bytes[..])?;
            if !deletes.is_empty() {
                return Ok(reader.with_deletes(&deletes));
            }
        }
        Ok(reader)
    }

    /// Atomically replace the manifest
    pub fn save_manifest(&self, manifest: &SegmentManifest) -> io::Result<()> {
        let bytes = manifest.to_bincode()?;
        let tmp = self.base_dir.join(MANIFEST_TMP_FILE);
        write_synced(&tmp, &bytes)?;
        fs::rename(&tmp, self.base_dir.join(MANIFEST_FILE))?;
        sync_dir(&self.base_dir)
    }

    pub fn load_manifest(&self) -> io::Result<SegmentManifest> {
        let path = self.base_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(SegmentManifest::new());
        }
        let bytes = fs::read(path)?;
        SegmentManifest::from_bincode(&bytes)
    }

    /// Delete the files of a segment that is no longer referenced
    pub fn remove_segment(&self, id: SegmentId) -> io::Result<()> {
        let dir = self.segment_dir(id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Remove segment directories and temp files the manifest does not reference
    ///
    /// Returns the number of segment directories removed.
    pub fn remove_orphans(&self, manifest: &SegmentManifest) -> io::Result<usize> {
        let tmp = self.base_dir.join(MANIFEST_TMP_FILE);
        if tmp.exists() {
            fs::remove_file(tmp)?;
        }

        let current = manifest.current_id();
        let mut removed = 0;
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let id = match name
                .to_str()
                .and_then(|n| n.strip_prefix(SEGMENT_DIR_PREFIX))
                .and_then(|n| n.parse::<u64>().ok())
            {
                Some(id) => SegmentId::new(id),
                None => continue,
            };
            if Some(id) != current {
                tracing::info!(segment = %id, "Removing orphaned segment");
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
