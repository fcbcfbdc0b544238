//! The stage contract and the per-chunk frame loop shared by all stages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::frame::{Frame, FrameContext, FrameRef, FrameStore};
use crate::progress::{FrameEvent, FrameOutcome, StageOutcome};

use super::error::{FrameError, StageError};

/// What a run is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTarget {
    /// The video or image being processed.
    pub target: PathBuf,
    /// Source image for stages that need one.
    pub source: Option<PathBuf>,
}

impl RunTarget {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Outcome of one `process_frames` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub completed: Vec<FrameRef>,
    pub failed: Vec<FrameRef>,
    /// Frames handed back without being attempted.
    pub unprocessed: Vec<FrameRef>,
    /// Set when a frame ran out of resources and the chunk was cut short.
    pub resource_exhausted: bool,
}

impl ChunkReport {
    /// Frames that were attempted, successfully or not.
    pub fn attempted(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// One transformation step of a pipeline.
///
/// `pre_check` and `pre_start` run once per run before anything is
/// dispatched, and any error aborts the run. `process_frame` runs on worker
/// threads and must be safe to call concurrently on different frames.
#[async_trait]
pub trait FrameStage: Send + Sync {
    /// Registry name of the stage.
    fn name(&self) -> &str;

    /// Ensures required assets exist, fetching them if allowed.
    async fn pre_check(&self) -> Result<(), StageError>;

    /// Validates the target without touching it.
    async fn pre_start(&self, target: &RunTarget) -> Result<(), StageError>;

    /// Transforms one frame. The input is borrowed, so it is still intact
    /// when this returns an error.
    fn process_frame(&self, ctx: &FrameContext, frame: &Frame) -> Result<Frame, FrameError>;

    /// Loads, transforms and stores each frame in order, calling
    /// `on_progress` once per frame.
    fn process_frames(
        &self,
        source: Option<&Arc<Path>>,
        store: &dyn FrameStore,
        frames: &[FrameRef],
        on_progress: &mut dyn FnMut(FrameEvent),
    ) -> ChunkReport {
        run_chunk(&[self], source, store, frames, on_progress)
    }

    /// Drops caches that can be rebuilt on demand.
    fn release_transient(&self, _aggressive: bool) {}

    /// Releases the stage's lazily loaded resources. Idempotent.
    fn post_process(&self);
}

/// Runs every frame of a chunk through `stages` in order.
///
/// A stage error fails the frame but later stages still run on the buffer
/// as it was before the failing stage. Resource exhaustion ends the chunk:
/// the frame is failed without being stored and the remaining frames are
/// returned as unprocessed.
pub(crate) fn run_chunk<S: FrameStage + ?Sized>(
    stages: &[&S],
    source: Option<&Arc<Path>>,
    store: &dyn FrameStore,
    frames: &[FrameRef],
    on_progress: &mut dyn FnMut(FrameEvent),
) -> ChunkReport {
    let mut report = ChunkReport::default();

    for (position, frame_ref) in frames.iter().enumerate() {
        let mut events = Vec::with_capacity(stages.len());

        let mut buffer = match store.load(frame_ref) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(frame = %frame_ref, error = %e, "Failed to load frame");
                for stage in stages {
                    events.push(FrameEvent::new(
                        frame_ref.clone(),
                        stage.name(),
                        StageOutcome::Skipped,
                    ));
                }
                emit(events, FrameOutcome::Failed, on_progress);
                report.failed.push(frame_ref.clone());
                continue;
            }
        };

        let ctx = FrameContext::new(frame_ref.clone(), source.cloned());
        let mut failed = false;
        let mut exhausted = false;

        for stage in stages {
            if exhausted {
                events.push(FrameEvent::new(
                    frame_ref.clone(),
                    stage.name(),
                    StageOutcome::Skipped,
                ));
                continue;
            }

            let outcome = match stage.process_frame(&ctx, &buffer) {
                Ok(output) => {
                    buffer = output;
                    StageOutcome::Succeeded
                }
                Err(e) => {
                    warn!(
                        frame = %frame_ref,
                        stage = stage.name(),
                        error = %e,
                        "Stage failed, passing input through"
                    );
                    failed = true;
                    exhausted = e.is_resource_exhaustion();
                    StageOutcome::Failed
                }
            };
            events.push(FrameEvent::new(frame_ref.clone(), stage.name(), outcome));
        }

        if exhausted {
            emit(events, FrameOutcome::Failed, on_progress);
            report.failed.push(frame_ref.clone());
            report.unprocessed = frames[position + 1..].to_vec();
            report.resource_exhausted = true;
            break;
        }

        if let Err(e) = store.store(frame_ref, &buffer) {
            warn!(frame = %frame_ref, error = %e, "Failed to store frame");
            failed = true;
        }

        if failed {
            emit(events, FrameOutcome::Failed, on_progress);
            report.failed.push(frame_ref.clone());
        } else {
            emit(events, FrameOutcome::Completed, on_progress);
            report.completed.push(frame_ref.clone());
        }
    }

    report
}

fn emit(mut events: Vec<FrameEvent>, outcome: FrameOutcome, on_progress: &mut dyn FnMut(FrameEvent)) {
    if let Some(last) = events.pop() {
        events.push(last.finishing(outcome));
    }
    for event in events {
        on_progress(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{marker_of, MemoryFrameStore, MockStage, StageLog};

    #[test]
    fn test_single_stage_processes_every_frame() {
        let log = StageLog::new();
        let stage = MockStage::new("a", log.clone());
        let store = MemoryFrameStore::with_frames(4);
        let frames = store.frame_refs();

        let mut events = Vec::new();
        let report = stage.process_frames(None, &store, &frames, &mut |e| events.push(e));

        assert_eq!(report.completed, frames);
        assert!(report.failed.is_empty());
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.frame_outcome == Some(FrameOutcome::Completed)));
        assert_eq!(log.stages_for(2), vec!["a"]);
        assert_eq!(marker_of(&store.get(2).unwrap()), 1);
    }

    #[test]
    fn test_failure_passes_input_through() {
        let log = StageLog::new();
        let a = MockStage::new("a", log.clone()).failing_on(1);
        let b = MockStage::new("b", log.clone());
        let store = MemoryFrameStore::with_frames(3);
        let frames = store.frame_refs();

        let mut events = Vec::new();
        let report = run_chunk(&[&a, &b], None, &store, &frames, &mut |e| events.push(e));

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failed, vec![frames[1].clone()]);
        assert_eq!(log.stages_for(1), vec!["a", "b"]);
        // b saw the untouched buffer and stamped it once.
        assert_eq!(log.input_marker(1, "b"), Some(0));
        assert_eq!(marker_of(&store.get(1).unwrap()), 1);
        assert_eq!(events.len(), 6);

        let frame_one: Vec<_> = events.iter().filter(|e| e.frame.index() == 1).collect();
        assert_eq!(frame_one[0].outcome, StageOutcome::Failed);
        assert_eq!(frame_one[1].outcome, StageOutcome::Succeeded);
        assert_eq!(frame_one[1].frame_outcome, Some(FrameOutcome::Failed));
    }

    #[test]
    fn test_resource_exhaustion_cuts_chunk() {
        let log = StageLog::new();
        let a = MockStage::new("a", log.clone()).exhausting_on(1);
        let b = MockStage::new("b", log.clone());
        let store = MemoryFrameStore::with_frames(4);
        let frames = store.frame_refs();

        let mut events = Vec::new();
        let report = run_chunk(&[&a, &b], None, &store, &frames, &mut |e| events.push(e));

        assert!(report.resource_exhausted);
        assert_eq!(report.completed, vec![frames[0].clone()]);
        assert_eq!(report.failed, vec![frames[1].clone()]);
        assert_eq!(report.unprocessed, frames[2..].to_vec());
        assert_eq!(log.stages_for(1), vec!["a"]);
        assert!(log.stages_for(2).is_empty());
        // Stored buffer untouched.
        assert_eq!(marker_of(&store.get(1).unwrap()), 0);

        let last = events.last().unwrap();
        assert_eq!(last.stage_name, "b");
        assert_eq!(last.outcome, StageOutcome::Skipped);
        assert_eq!(last.frame_outcome, Some(FrameOutcome::Failed));
    }

    #[test]
    fn test_missing_frame_is_failed_and_skipped() {
        let log = StageLog::new();
        let a = MockStage::new("a", log.clone());
        let store = MemoryFrameStore::with_frames(1);
        let mut frames = store.frame_refs();
        frames.push(FrameRef::new(9, "missing.png"));

        let mut events = Vec::new();
        let report = a.process_frames(None, &store, &frames, &mut |e| events.push(e));

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failed, vec![FrameRef::new(9, "missing.png")]);
        assert_eq!(events[1].outcome, StageOutcome::Skipped);
        assert!(log.stages_for(9).is_empty());
    }
}
