//! Error types for the runner.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;
use crate::stage::StageError;

/// Fatal errors. Frame failures are never reported here.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A stage's assets are missing; nothing was dispatched.
    #[error("Pre-check failed: {0}")]
    PreCheck(#[source] StageError),

    /// The target was rejected by a stage; nothing was dispatched.
    #[error("Pre-start validation failed: {0}")]
    PreStart(#[source] StageError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Whether the run was aborted before any frame was dispatched.
    pub fn is_fatal_before_dispatch(&self) -> bool {
        matches!(self, Self::PreCheck(_) | Self::PreStart(_))
    }
}
