//! Error types for the engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid limits: worker_limit={worker_limit}, batch_hint={batch_hint} (both must be positive)")]
    InvalidLimits {
        worker_limit: usize,
        batch_hint: usize,
    },
}
