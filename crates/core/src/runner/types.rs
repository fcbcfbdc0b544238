//! Batch job types.

use serde::Serialize;
use std::path::PathBuf;

use crate::engine::{RunState, RunStatus};
use crate::frame::FrameRef;
use crate::stage::RunTarget;

/// One video of a batch: its target and its extracted frames.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub target: RunTarget,
    pub frames: Vec<FrameRef>,
}

impl VideoJob {
    pub fn new(target: RunTarget, frames: Vec<FrameRef>) -> Self {
        Self { target, frames }
    }
}

/// Outcome of one batch job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub target: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    /// A job succeeded when its run finished with every frame attempted and
    /// no crashed worker, even if some frames failed.
    pub fn is_success(&self) -> bool {
        matches!(
            self.state.as_ref().map(|s| s.status),
            Some(RunStatus::Completed) | Some(RunStatus::PartialFailure)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    pub(crate) fn push(&mut self, result: JobResult) {
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }
}
