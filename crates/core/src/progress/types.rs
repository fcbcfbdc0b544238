//! Progress event and snapshot types.

use serde::Serialize;

use crate::frame::FrameRef;
use crate::memory::MemorySample;

/// Result of one stage on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed,
    /// The stage never ran, e.g. the frame could not be loaded.
    Skipped,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Final result of a frame across all stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOutcome {
    Completed,
    Failed,
}

/// Emitted once per frame per stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameEvent {
    pub frame: FrameRef,
    pub stage_name: String,
    pub outcome: StageOutcome,
    /// Set on the last event of a frame, once its outcome is known.
    pub frame_outcome: Option<FrameOutcome>,
}

impl FrameEvent {
    pub fn new(frame: FrameRef, stage_name: impl Into<String>, outcome: StageOutcome) -> Self {
        Self {
            frame,
            stage_name: stage_name.into(),
            outcome,
            frame_outcome: None,
        }
    }

    pub fn finishing(mut self, outcome: FrameOutcome) -> Self {
        self.frame_outcome = Some(outcome);
        self
    }

    /// Whether this event closes its frame.
    pub fn is_final(&self) -> bool {
        self.frame_outcome.is_some()
    }
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
    pub stage_events: u64,
    pub elapsed_secs: f64,
    /// Frames per second finished over the sliding window.
    pub throughput_fps: f64,
    pub current_memory: Option<MemorySample>,
}

impl ProgressSnapshot {
    /// Frames finished either way.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.finished() as f64 / self.total as f64 * 100.0
    }
}

impl std::fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} frames ({} failed) | {:.1} fps | {:.1}s",
            self.finished(),
            self.total,
            self.failed,
            self.throughput_fps,
            self.elapsed_secs
        )?;
        if let Some(memory) = &self.current_memory {
            write!(f, " | mem {:.0}%", memory.system_fraction_used * 100.0)?;
            if let Some(accelerator) = memory.accelerator_fraction_used {
                write!(f, " | accel {:.0}%", accelerator * 100.0)?;
            }
        }
        Ok(())
    }
}
