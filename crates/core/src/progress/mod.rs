//! Progress reporting for pipeline runs.

mod config;
mod reporter;
mod types;

pub use config::ProgressConfig;
pub use reporter::ProgressReporter;
pub use types::{FrameEvent, FrameOutcome, ProgressSnapshot, StageOutcome};
