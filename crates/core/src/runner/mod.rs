//! Runs a pipeline over one video, one image or a batch of videos.

mod error;
mod pipeline_runner;
mod types;

pub use error::RunnerError;
pub use pipeline_runner::PipelineRunner;
pub use types::{BatchSummary, JobResult, VideoJob};
