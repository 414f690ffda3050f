//! Background compaction
//!
//! One thread per engine drives `IDLE -> ROTATING -> MERGING ->
//! APPLYING_DELETES -> COMMITTING -> IDLE`. Rotation and commit run under the
//! engine lock; the merge itself does not, so writes and searches proceed
//! while segment files are written.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use super::state::{CompactionPhase, EngineInner, EngineState, FrozenSegment};
use crate::error::{Result, RtSearchError};
use crate::segment::{LiveSegment, MergeJob, SegmentId, StagedSegment, TombstoneFilter};

/// Why a cycle was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// Periodic wake-up or Live size nudge; runs past the rotate threshold
    Tick,
    /// Runs whenever anything is pending
    Forced,
    /// Rewrites Disk even with nothing pending, expunging hard deletes
    Optimize,
}

/// Result of a committed cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub segment: SegmentId,
    pub docs: u32,
    pub hard_deletes: u64,
}

pub(crate) enum Command {
    Compact {
        trigger: Trigger,
        reply: Option<Sender<Result<Option<CycleReport>>>>,
    },
    Shutdown {
        reply: Sender<Result<()>>,
    },
}

pub(crate) fn spawn_coordinator(
    inner: Arc<EngineInner>,
    rx: Receiver<Command>,
) -> std::io::Result<thread::JoinHandle<()>> {
    let name = format!("rtsearch-compactor-{}", inner.config.name);
    thread::Builder::new().name(name).spawn(move || {
        let interval = inner.config.compaction.interval();
        loop {
            match rx.recv_timeout(interval) {
                Ok(Command::Compact { trigger, reply }) => {
                    let result = run_cycle(&inner, trigger);
                    if let Some(reply) = reply {
                        if reply.send(result).is_err() {
                            tracing::debug!(
                                index = %inner.config.name,
                                "Compaction requester went away before the reply"
                            );
                        }
                    }
                }
                Ok(Command::Shutdown { reply }) => {
                    let _ = reply.send(drain(&inner));
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let _ = run_cycle(&inner, Trigger::Tick);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = drain(&inner);
                    break;
                }
            }
        }
        tracing::debug!(index = %inner.config.name, "Compaction thread exited");
    })
}

/// Run one cycle if `trigger` calls for it, recording the outcome
///
/// Returns None when there was nothing to do.
pub(crate) fn run_cycle(inner: &EngineInner, trigger: Trigger) -> Result<Option<CycleReport>> {
    if trigger == Trigger::Tick {
        inner.rotation_requested.store(false, Ordering::SeqCst);
    }

    let start = Instant::now();
    let result = compact(inner, trigger);
    let elapsed = start.elapsed();

    match &result {
        Ok(Some(report)) => {
            inner.metrics.record_compaction(elapsed.as_secs_f64(), true);
            inner.metrics.set_disk_docs(report.docs);
            tracing::info!(
                index = %inner.config.name,
                segment = %report.segment,
                docs = report.docs,
                hard_deletes = report.hard_deletes,
                took_ms = elapsed.as_millis() as u64,
                "Compaction committed"
            );
        }
        Ok(None) => {}
        Err(e) => {
            inner.metrics.record_compaction(elapsed.as_secs_f64(), false);
            tracing::error!(
                index = %inner.config.name,
                error = %e,
                took_ms = elapsed.as_millis() as u64,
                "Compaction failed, frozen segment kept for retry"
            );
        }
    }
    result
}

/// Forced cycles until nothing is pending, then enter SHUTDOWN
///
/// The last pending check and the SHUTDOWN transition share one lock
/// section, so a write admitted before `closing` was set is either compacted
/// or refused.
pub(crate) fn drain(inner: &EngineInner) -> Result<()> {
    let retries = inner.config.compaction.shutdown_retries;
    let mut last_error: Option<RtSearchError> = None;
    let mut attempts = 0;

    let pending = loop {
        {
            let mut state = inner.state.lock();
            let pending = state.has_pending_work();
            let give_up = attempts > retries
                || last_error.as_ref().is_some_and(|e| !e.is_retriable());
            if !pending || give_up {
                state.phase = CompactionPhase::ShutDown;
                break pending;
            }
        }

        attempts += 1;
        match run_cycle(inner, Trigger::Forced) {
            Ok(_) => last_error = None,
            Err(e) => {
                tracing::warn!(
                    index = %inner.config.name,
                    attempt = attempts,
                    error = %e,
                    "Shutdown compaction failed"
                );
                last_error = Some(e);
            }
        }
    };
    tracing::info!(index = %inner.config.name, pending, "Engine shut down");

    match last_error {
        Some(e) if e.is_fatal() => Err(e),
        _ if !pending => Ok(()),
        Some(e) => Err(RtSearchError::Compaction(e.to_string())),
        None => Err(RtSearchError::Compaction(
            "writes pending after final compaction".to_string(),
        )),
    }
}

fn compact(inner: &EngineInner, trigger: Trigger) -> Result<Option<CycleReport>> {
    let job = match rotate(inner, trigger)? {
        Some(job) => job,
        None => return Ok(None),
    };

    let staged = match job.run() {
        Ok(staged) => staged,
        Err(e) => {
            let mut state = inner.state.lock();
            state.phase = CompactionPhase::Idle;
            return state.guard(Err(e));
        }
    };

    commit(inner, staged).map(Some)
}

/// ROTATING: turn Live into Frozen, unless a failed cycle left one behind
///
/// Returns the merge to run, or None when `trigger` finds nothing to do.
pub(crate) fn rotate(inner: &EngineInner, trigger: Trigger) -> Result<Option<MergeJob>> {
    let mut state = inner.state.lock();
    state.ensure_usable()?;

    if state.frozen.is_none() {
        let wanted = match trigger {
            Trigger::Tick => {
                state.live.size_bytes() >= inner.config.compaction.rotate_threshold_bytes
            }
            Trigger::Forced => state.has_pending_work(),
            Trigger::Optimize => {
                state.has_pending_work() || !state.disk.reader().is_empty()
            }
        };
        if !wanted {
            return Ok(None);
        }

        state.phase = CompactionPhase::Rotating;
        let reader = match state.live.flush_if_dirty() {
            Ok(reader) => reader,
            Err(e) => {
                state.phase = CompactionPhase::Idle;
                return Err(e.into());
            }
        };
        let fresh = match LiveSegment::new() {
            Ok(live) => live,
            Err(e) => {
                state.phase = CompactionPhase::Idle;
                return Err(e.into());
            }
        };
        state.live = fresh;
        let frozen = FrozenSegment {
            filter: TombstoneFilter::new(&reader),
            reader,
            carried: state.disk_filter.shadowed_keys(),
            mask: state.disk_filter.visible_set(),
        };
        tracing::debug!(
            index = %inner.config.name,
            frozen_docs = frozen.reader.live_doc_count(),
            carried = frozen.carried.len(),
            "Rotated live segment"
        );
        state.frozen = Some(frozen);
        inner.metrics.set_live(0, 0);
    } else {
        tracing::debug!(index = %inner.config.name, "Retrying merge of frozen segment");
    }

    state.phase = CompactionPhase::Merging;
    let job = state.frozen.as_ref().map(|frozen| {
        state
            .disk
            .prepare_merge(Arc::clone(&frozen.reader), Arc::clone(&frozen.mask))
    });
    match job {
        Some(job) => Ok(Some(job)),
        None => state.guard(Err(RtSearchError::ConcurrentState(
            "frozen segment vanished during rotation".to_string(),
        ))),
    }
}

/// APPLYING_DELETES and COMMITTING, in one lock section
///
/// Keys shadowed during the merge window are hard-deleted from the staged
/// segment before it replaces Disk. On failure Frozen is kept.
pub(crate) fn commit(inner: &EngineInner, staged: StagedSegment) -> Result<CycleReport> {
    let mut state = inner.state.lock();
    let result = apply_and_commit(&mut state, staged);
    state.phase = CompactionPhase::Idle;
    state.guard(result)
}

fn apply_and_commit(state: &mut EngineState, mut staged: StagedSegment) -> Result<CycleReport> {
    state.ensure_usable()?;
    state.phase = CompactionPhase::ApplyingDeletes;

    let frozen = state.frozen.as_ref().ok_or_else(|| {
        RtSearchError::ConcurrentState("no frozen segment to commit".to_string())
    })?;
    let mut keys = frozen.filter.shadowed_keys();
    for key in state.disk_filter.shadowed_keys() {
        if !frozen.carried.contains(&key) {
            keys.insert(key);
        }
    }

    for key in &keys {
        staged.hard_delete(key)?;
    }
    let hard_deletes = staged.pending_deletes();

    state.phase = CompactionPhase::Committing;
    let segment = staged.id();
    let fields = state.schema.fields().clone();
    let reader = state.disk.commit(staged, fields)?;
    state.disk_filter = TombstoneFilter::new(&reader);
    state.frozen = None;

    Ok(CycleReport {
        segment,
        docs: reader.live_doc_count(),
        hard_deletes,
    })
}
