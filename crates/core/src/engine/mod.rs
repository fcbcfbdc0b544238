//! Work distribution engine.
//!
//! Frames are cut into chunks lazily, one chunk per idle worker. After each
//! chunk the memory monitor is sampled once and the size of the next chunk
//! is decided from that single reading.

mod chunk;
mod config;
mod dispatch;
mod error;
mod state;

pub use chunk::{Chunk, ChunkCompletion, ChunkSizer};
pub use config::{EngineConfig, MAX_BACKPRESSURE_PAUSE_SECONDS};
pub use dispatch::{RunOptions, WorkEngine};
pub use error::EngineError;
pub use state::{RunState, RunStatus, StopFlag};
