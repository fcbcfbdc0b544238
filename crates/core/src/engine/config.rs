//! Configuration for the work distribution engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest pause the engine will insert under sustained high pressure.
pub const MAX_BACKPRESSURE_PAUSE_SECONDS: f64 = 3600.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of chunks processed at once.
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,

    /// Preferred frames per chunk.
    #[serde(default = "default_batch_hint")]
    pub batch_hint: usize,

    /// Chunks grow up to `worker_limit * max_chunk_multiplier` frames.
    #[serde(default = "default_max_chunk_multiplier")]
    pub max_chunk_multiplier: usize,

    /// Pause inserted before dispatching again under sustained high pressure.
    #[serde(default = "default_backpressure_pause_seconds")]
    pub backpressure_pause_seconds: f64,
}

fn default_worker_limit() -> usize {
    4
}

fn default_batch_hint() -> usize {
    5
}

fn default_max_chunk_multiplier() -> usize {
    2
}

fn default_backpressure_pause_seconds() -> f64 {
    3.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
            batch_hint: default_batch_hint(),
            max_chunk_multiplier: default_max_chunk_multiplier(),
            backpressure_pause_seconds: default_backpressure_pause_seconds(),
        }
    }
}

impl EngineConfig {
    pub fn with_worker_limit(mut self, worker_limit: usize) -> Self {
        self.worker_limit = worker_limit;
        self
    }

    pub fn with_batch_hint(mut self, batch_hint: usize) -> Self {
        self.batch_hint = batch_hint;
        self
    }

    pub fn with_max_chunk_multiplier(mut self, multiplier: usize) -> Self {
        self.max_chunk_multiplier = multiplier;
        self
    }

    pub fn with_backpressure_pause(mut self, seconds: f64) -> Self {
        self.backpressure_pause_seconds = seconds;
        self
    }

    /// The configured pause, capped at [`MAX_BACKPRESSURE_PAUSE_SECONDS`].
    /// Negative or non-finite values give no pause.
    pub fn backpressure_pause(&self) -> Duration {
        let seconds = self.backpressure_pause_seconds;
        if seconds.is_nan() || seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(seconds.min(MAX_BACKPRESSURE_PAUSE_SECONDS))
            .unwrap_or(Duration::ZERO)
    }
}
