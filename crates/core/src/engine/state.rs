//! Run state: the coordinator's accumulator and the frozen result.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::frame::FrameRef;

use super::chunk::ChunkCompletion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every frame completed.
    Completed,
    /// Some frames failed; the rest completed.
    PartialFailure,
    /// A worker crashed.
    Failed,
    /// A stop was requested before every frame was dispatched.
    Stopped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// Final state of a run. Never changes once returned.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub total_frames: usize,
    pub completed_frames: usize,
    pub failed_frames: usize,
    /// Frames never dispatched because of a stop request.
    pub skipped_frames: usize,
    pub failed_frames_list: Vec<FrameRef>,
    /// Frames attempted per chunk, in dispatch order.
    pub chunk_sizes: Vec<usize>,
    pub cleanup_requests: u64,
    pub backpressure_pauses: u64,
    pub crashed_chunks: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunState {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Mutable counters owned by the coordinating task.
pub(crate) struct RunAccumulator {
    run_id: Uuid,
    total: usize,
    completed: usize,
    failed: Vec<FrameRef>,
    chunk_sizes: Vec<usize>,
    pub(crate) cleanup_requests: u64,
    pub(crate) backpressure_pauses: u64,
    crashed_chunks: u64,
    started_at: DateTime<Utc>,
}

impl RunAccumulator {
    pub(crate) fn new(run_id: Uuid, total: usize) -> Self {
        Self {
            run_id,
            total,
            completed: 0,
            failed: Vec::new(),
            chunk_sizes: Vec::new(),
            cleanup_requests: 0,
            backpressure_pauses: 0,
            crashed_chunks: 0,
            started_at: Utc::now(),
        }
    }

    /// Reserves the slot of a newly dispatched chunk.
    pub(crate) fn dispatched(&mut self, id: u64) {
        let id = id as usize;
        if self.chunk_sizes.len() <= id {
            self.chunk_sizes.resize(id + 1, 0);
        }
    }

    pub(crate) fn absorb(&mut self, completion: &ChunkCompletion) {
        let report = &completion.report;
        self.completed += report.completed.len();
        self.failed.extend(report.failed.iter().cloned());
        if completion.crashed {
            self.crashed_chunks += 1;
        }
        self.set_size(completion.id, report.attempted());
    }

    /// Fails every frame of a chunk whose worker never reported back.
    pub(crate) fn lost(&mut self, id: u64, frames: Vec<FrameRef>) {
        self.crashed_chunks += 1;
        self.set_size(id, frames.len());
        self.failed.extend(frames);
    }

    fn set_size(&mut self, id: u64, size: usize) {
        self.dispatched(id);
        self.chunk_sizes[id as usize] = size;
    }

    pub(crate) fn finish(mut self, skipped: usize) -> RunState {
        self.failed.sort();
        let failed_frames = self.failed.len();

        let status = if self.crashed_chunks > 0 {
            RunStatus::Failed
        } else if skipped > 0 {
            RunStatus::Stopped
        } else if failed_frames > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Completed
        };

        RunState {
            run_id: self.run_id,
            status,
            total_frames: self.total,
            completed_frames: self.completed,
            failed_frames,
            skipped_frames: skipped,
            failed_frames_list: self.failed,
            chunk_sizes: self.chunk_sizes,
            cleanup_requests: self.cleanup_requests,
            backpressure_pauses: self.backpressure_pauses,
            crashed_chunks: self.crashed_chunks,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Cooperative stop request, observed before each chunk is dispatched.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
