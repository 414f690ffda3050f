//! Segment set guarded by the engine lock

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, RtSearchError};
use crate::metrics::EngineMetrics;
use crate::query::{QueryExecutor, SearchSnapshot, SegmentSnapshot};
use crate::schema::Schema;
use crate::segment::{DiskSegment, LiveSegment, SegmentReader, TombstoneFilter, TombstoneProbe};
use crate::tokenizer::AnalyzerSet;

/// Compaction state machine position
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPhase {
    Idle,
    Rotating,
    Merging,
    ApplyingDeletes,
    Committing,
    ShutDown,
}

impl fmt::Display for CompactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompactionPhase::Idle => "IDLE",
            CompactionPhase::Rotating => "ROTATING",
            CompactionPhase::Merging => "MERGING",
            CompactionPhase::ApplyingDeletes => "APPLYING_DELETES",
            CompactionPhase::Committing => "COMMITTING",
            CompactionPhase::ShutDown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}

/// A rotated Live segment waiting to be merged into Disk
pub(crate) struct FrozenSegment {
    pub reader: Arc<SegmentReader>,
    /// Hides Frozen copies of keys written after rotation
    pub filter: TombstoneFilter,
    /// Disk keys already shadowed at rotation; the merge mask drops them
    pub carried: BTreeSet<String>,
    /// Disk visible set captured at rotation
    pub mask: Arc<RoaringBitmap>,
}

pub(crate) struct EngineState {
    pub live: LiveSegment,
    pub frozen: Option<FrozenSegment>,
    pub disk: DiskSegment,
    pub disk_filter: TombstoneFilter,
    pub schema: Arc<Schema>,
    pub phase: CompactionPhase,
    /// Set by the first internal state violation; the instance is unusable
    pub fatal: Option<String>,
}

impl EngineState {
    /// Fail if the engine is poisoned or shut down
    pub fn ensure_usable(&self) -> Result<()> {
        if let Some(reason) = &self.fatal {
            return Err(RtSearchError::ConcurrentState(reason.clone()));
        }
        if self.phase == CompactionPhase::ShutDown {
            return Err(RtSearchError::ShutDown);
        }
        Ok(())
    }

    /// Poison the engine if `result` carries a fatal error
    pub fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.fatal.is_none() {
                tracing::error!(error = %e, "Engine poisoned by internal state violation");
                self.fatal = Some(e.to_string());
            }
        }
        result
    }

    /// Look `key` up in Disk and Frozen without changing anything
    pub fn probe(&self, key: &str) -> Result<(TombstoneProbe, Option<TombstoneProbe>)> {
        let disk = self.disk_filter.probe(self.disk.reader(), key)?;
        let frozen = match &self.frozen {
            Some(frozen) => Some(frozen.filter.probe(&frozen.reader, key)?),
            None => None,
        };
        Ok((disk, frozen))
    }

    /// Hide the Disk and Frozen copies of `key` found by `probe`
    pub fn shadow(&mut self, key: &str, probes: (TombstoneProbe, Option<TombstoneProbe>)) {
        let (disk, frozen) = probes;
        self.disk_filter.apply(key, disk);
        if let (Some(segment), Some(probe)) = (self.frozen.as_mut(), frozen) {
            segment.filter.apply(key, probe);
        }
    }

    /// True when a compaction would change anything
    pub fn has_pending_work(&self) -> bool {
        !self.live.is_empty() || self.frozen.is_some() || self.disk_filter.shadowed_count() > 0
    }

    /// Flush Live and capture every non-empty segment with its visible set
    ///
    /// Segments are ordered Live, Frozen, Disk.
    pub fn snapshot(&mut self) -> Result<SearchSnapshot> {
        let mut segments = Vec::with_capacity(3);

        let live = self.live.flush_if_dirty()?;
        if !live.is_empty() {
            let visible = Arc::new(live.live_docs().clone());
            segments.push(SegmentSnapshot {
                reader: live,
                visible,
            });
        }

        if let Some(frozen) = &self.frozen {
            frozen.filter.check(&frozen.reader)?;
            if !frozen.reader.is_empty() {
                segments.push(filtered(&frozen.reader, &frozen.filter));
            }
        }

        let disk = self.disk.reader();
        self.disk_filter.check(disk)?;
        if !disk.is_empty() {
            segments.push(filtered(disk, &self.disk_filter));
        }

        Ok(SearchSnapshot {
            segments,
            schema: Arc::clone(&self.schema),
        })
    }
}

/// Delete bits and tombstones applied together
fn filtered(reader: &Arc<SegmentReader>, filter: &TombstoneFilter) -> SegmentSnapshot {
    let mut visible = reader.live_docs().clone();
    visible &= &*filter.visible_set();
    SegmentSnapshot {
        reader: Arc::clone(reader),
        visible: Arc::new(visible),
    }
}

/// Everything the engine facade and the coordinator thread share
pub(crate) struct EngineInner {
    pub config: EngineConfig,
    pub state: Mutex<EngineState>,
    pub analyzers: Arc<AnalyzerSet>,
    pub executor: QueryExecutor,
    pub metrics: EngineMetrics,
    /// Set once shutdown starts; new writes and searches are refused
    pub closing: AtomicBool,
    /// A threshold rotation was requested and not yet handled
    pub rotation_requested: AtomicBool,
}

impl EngineInner {
    /// Open the Disk segment under the configured directory
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let disk = DiskSegment::open(&config.data_dir)?;
        let schema = Schema::from_fields(disk.persisted_fields());
        let disk_filter = TombstoneFilter::new(disk.reader());
        let analyzers = Arc::new(AnalyzerSet::new(&config.tokenizer));
        let executor = QueryExecutor::new(Arc::clone(&analyzers), config.query.clone());
        let metrics = EngineMetrics::new(&config.name)?;
        metrics.set_disk_docs(disk.reader().live_doc_count());

        let state = EngineState {
            live: LiveSegment::new()?,
            frozen: None,
            disk,
            disk_filter,
            schema: Arc::new(schema),
            phase: CompactionPhase::Idle,
            fatal: None,
        };

        Ok(Self {
            config,
            state: Mutex::new(state),
            analyzers,
            executor,
            metrics,
            closing: AtomicBool::new(false),
            rotation_requested: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(CompactionPhase::ApplyingDeletes.to_string(), "APPLYING_DELETES");
        assert_eq!(
            serde_json::to_string(&CompactionPhase::ShutDown).unwrap(),
            "\"shut_down\""
        );
    }

    #[test]
    fn test_guard_poisons_on_fatal_only() {
        let dir = tempfile::tempdir().unwrap();
        let inner = EngineInner::open(EngineConfig::new("t", dir.path())).unwrap();
        let mut state = inner.state.lock();

        let _ = state.guard::<()>(Err(RtSearchError::InvalidQuery("x".to_string())));
        assert!(state.ensure_usable().is_ok());

        let _ = state.guard::<()>(Err(RtSearchError::ConcurrentState("bad".to_string())));
        assert!(matches!(
            state.ensure_usable(),
            Err(RtSearchError::ConcurrentState(_))
        ));
    }

    #[test]
    fn test_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let inner = EngineInner::open(EngineConfig::new("t", dir.path())).unwrap();
        let snapshot = inner.state.lock().snapshot().unwrap();
        assert!(snapshot.is_empty());
    }
}
