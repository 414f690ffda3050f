//! The real-time index engine
//!
//! An [`Engine`] owns three kinds of segment: the writable Live segment, at
//! most one Frozen segment being merged, and the durable Disk segment.
//! Writes land in Live and hide older copies in Frozen and Disk through
//! tombstone filters; a background thread rotates Live into Frozen and
//! merges it into a new Disk segment.

mod coordinator;
mod state;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, RtSearchError};
use crate::metrics::EngineMetrics;
use crate::models::{Document, SearchRequest, SearchResponse};
use crate::schema::Schema;
use crate::segment::{AnalyzedDocument, DocNo, SegmentId};

use coordinator::{spawn_coordinator, Command, Trigger};
pub use coordinator::CycleReport;
pub use state::CompactionPhase;
use state::EngineInner;

/// Point-in-time engine counters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineStats {
    pub name: String,
    pub phase: CompactionPhase,
    pub live_docs: u32,
    pub live_bytes: usize,
    /// Documents in the Frozen segment, if a merge is pending
    pub frozen_docs: Option<u32>,
    pub disk_docs: u32,
    pub disk_segment: SegmentId,
    /// Share of Disk documents hard-deleted but still stored
    pub disk_delete_ratio: f64,
    /// Disk keys hidden by newer writes, awaiting the next merge
    pub pending_deletes: usize,
    pub generation: u64,
}

/// Outcome of a batch write
#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: usize,
    /// Key and error of each rejected entry
    pub failed: Vec<(String, RtSearchError)>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A named real-time index
pub struct Engine {
    inner: Arc<EngineInner>,
    commands: Sender<Command>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Open the index stored under `config.data_dir` and start compaction
    pub fn open(config: EngineConfig) -> Result<Self> {
        let inner = Arc::new(EngineInner::open(config)?);
        let (tx, rx) = channel::unbounded();
        let join = spawn_coordinator(Arc::clone(&inner), rx)?;

        {
            let state = inner.state.lock();
            tracing::info!(
                index = %inner.config.name,
                path = %inner.config.data_dir.display(),
                docs = state.disk.reader().live_doc_count(),
                fields = state.schema.len(),
                "Opened index"
            );
        }

        Ok(Self {
            inner,
            commands: tx,
            coordinator: Mutex::new(Some(join)),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Insert or replace the document with `doc.key`
    ///
    /// The document is visible to the next search that starts after this
    /// call returns.
    pub fn put(&self, doc: Document) -> Result<()> {
        self.ensure_open()?;
        doc.validate()?;

        // Analysis runs outside the lock
        let analyzed = AnalyzedDocument::analyze(&doc, &self.inner.analyzers);

        let mut state = self.inner.state.lock();
        state.ensure_usable()?;
        let probes = state.probe(&doc.key);
        let probes = state.guard(probes)?;

        state.shadow(&doc.key, probes);
        state.live.upsert(analyzed);
        if state.schema.would_change(&doc) {
            Arc::make_mut(&mut state.schema).learn(&doc);
        }

        let live_bytes = state.live.size_bytes();
        self.inner.metrics.set_live(live_bytes, state.live.live_doc_count());
        drop(state);

        self.inner.metrics.puts_total.inc();
        self.request_rotation_if_full(live_bytes);
        Ok(())
    }

    /// Remove the document with `key`; removing an unknown key is a no-op
    pub fn remove(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        if key.trim().is_empty() {
            return Err(RtSearchError::InvalidDocument(
                "No Document key found".to_string(),
            ));
        }

        let mut state = self.inner.state.lock();
        state.ensure_usable()?;
        let probes = state.probe(key);
        let probes = state.guard(probes)?;

        state.shadow(key, probes);
        state.live.delete(key);
        self.inner
            .metrics
            .set_live(state.live.size_bytes(), state.live.live_doc_count());
        drop(state);

        self.inner.metrics.removes_total.inc();
        Ok(())
    }

    /// Put every document, collecting per-document failures
    pub fn put_batch(&self, docs: Vec<Document>) -> BatchResult {
        let mut result = BatchResult::default();
        for doc in docs {
            let key = doc.key.clone();
            match self.put(doc) {
                Ok(()) => result.succeeded += 1,
                Err(e) => result.failed.push((key, e)),
            }
        }
        result
    }

    /// Remove every key, collecting per-key failures
    pub fn remove_batch(&self, keys: &[String]) -> BatchResult {
        let mut result = BatchResult::default();
        for key in keys {
            match self.remove(key) {
                Ok(()) => result.succeeded += 1,
                Err(e) => result.failed.push((key.clone(), e)),
            }
        }
        result
    }

    /// Run each request independently; one failure does not stop the rest
    pub fn search_batch(&self, requests: &[SearchRequest]) -> Vec<Result<SearchResponse>> {
        requests.iter().map(|request| self.search(request)).collect()
    }

    /// Run a query across Live, Frozen and Disk
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let result = self.search_inner(request);
        match &result {
            Ok(_) => self.inner.metrics.record_search(start.elapsed().as_secs_f64()),
            Err(_) => self.inner.metrics.record_search_error(),
        }
        result
    }

    fn search_inner(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.ensure_open()?;
        if request.query.trim().is_empty() {
            return Err(RtSearchError::InvalidQuery("Empty Query".to_string()));
        }

        let snapshot = {
            let mut state = self.inner.state.lock();
            state.ensure_usable()?;
            let snapshot = state.snapshot();
            state.guard(snapshot)?
        };

        // Parsing and execution run without the lock
        let response = self.inner.executor.search(&snapshot, request)?;
        tracing::debug!(
            index = %self.inner.config.name,
            total = response.total,
            hits = response.hits.len(),
            took_ms = response.took_ms,
            "Search completed"
        );
        Ok(response)
    }

    /// Payload of the visible document with `key`
    pub fn get_payload(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let snapshot = {
            let mut state = self.inner.state.lock();
            state.ensure_usable()?;
            let snapshot = state.snapshot();
            state.guard(snapshot)?
        };

        for segment in &snapshot.segments {
            let mut docnos = segment.reader.docnos_for_key(key)?;
            docnos &= &*segment.visible;
            if let Some(docno) = docnos.max() {
                return Ok(segment
                    .reader
                    .payload(DocNo(docno))
                    .map(|payload| payload.to_vec()));
            }
        }
        Ok(None)
    }

    /// Ask for a full compaction without waiting for it
    pub fn optimize(&self) -> Result<()> {
        self.ensure_open()?;
        self.send(Command::Compact {
            trigger: Trigger::Optimize,
            reply: None,
        })
    }

    /// Run a compaction cycle now and wait for its outcome
    ///
    /// Returns None when nothing was pending.
    pub fn compact_now(&self) -> Result<Option<CycleReport>> {
        self.ensure_open()?;
        let (tx, rx) = channel::bounded(1);
        self.send(Command::Compact {
            trigger: Trigger::Forced,
            reply: Some(tx),
        })?;
        match rx.recv() {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) if e.is_fatal() => Err(e),
            Ok(Err(e)) => Err(RtSearchError::Compaction(e.to_string())),
            Err(_) => Err(RtSearchError::ShutDown),
        }
    }

    /// Compact pending writes to Disk and stop the background thread
    ///
    /// Blocks until done. Later calls return immediately.
    pub fn shutdown(&self) -> Result<()> {
        let mut coordinator = self.coordinator.lock();
        let join = match coordinator.take() {
            Some(join) => join,
            None => return Ok(()),
        };
        self.inner.closing.store(true, Ordering::SeqCst);
        tracing::info!(index = %self.inner.config.name, "Shutting down index");

        let (tx, rx) = channel::bounded(1);
        let outcome = match self.commands.send(Command::Shutdown { reply: tx }) {
            Ok(()) => rx.recv().unwrap_or_else(|_| {
                Err(RtSearchError::ConcurrentState(
                    "compaction thread exited before replying".to_string(),
                ))
            }),
            Err(_) => Err(RtSearchError::ConcurrentState(
                "compaction thread is gone".to_string(),
            )),
        };

        if join.join().is_err() {
            return Err(RtSearchError::ConcurrentState(
                "compaction thread panicked".to_string(),
            ));
        }
        outcome
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.inner.state.lock();
        let disk = state.disk.reader();
        EngineStats {
            name: self.inner.config.name.clone(),
            phase: state.phase,
            live_docs: state.live.live_doc_count(),
            live_bytes: state.live.size_bytes(),
            frozen_docs: state.frozen.as_ref().map(|f| f.reader.live_doc_count()),
            disk_docs: disk.live_doc_count(),
            disk_segment: disk.id(),
            disk_delete_ratio: disk.delete_ratio(),
            pending_deletes: state.disk_filter.shadowed_count(),
            generation: state.disk.manifest().generation(),
        }
    }

    /// Fields learned so far
    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.inner.state.lock().schema)
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.inner.metrics
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(RtSearchError::ShutDown);
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| RtSearchError::ShutDown)
    }

    /// Wake the coordinator once Live outgrows the rotate threshold
    fn request_rotation_if_full(&self, live_bytes: usize) {
        if live_bytes < self.inner.config.compaction.rotate_threshold_bytes {
            return;
        }
        if !self.inner.rotation_requested.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Compact {
                trigger: Trigger::Tick,
                reply: None,
            });
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(index = %self.inner.config.name, error = %e, "Shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.inner.config.name)
            .field("data_dir", &self.inner.config.data_dir)
            .finish()
    }
}
