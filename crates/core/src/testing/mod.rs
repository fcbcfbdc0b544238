//! Testing utilities and mock implementations.
//!
//! This module provides mocks for every external seam of a run, allowing
//! engine and runner tests without models, real frames or real memory
//! pressure.
//!
//! # Example
//!
//! ```rust,ignore
//! use frameflow_core::testing::{MemoryFrameStore, MockStage, ScriptedMemorySource, StageLog};
//!
//! let log = StageLog::new();
//! let stage = MockStage::new("a", log.clone()).failing_on(7);
//! let store = MemoryFrameStore::with_frames(10);
//! let memory = ScriptedMemorySource::new(vec![0.5, 0.9, 0.9]);
//!
//! // Build a pipeline and an engine around them...
//! assert_eq!(log.stages_for(7), vec!["a"]);
//! ```

mod memory_source;
mod memory_store;
mod mock_stage;

pub use memory_source::{RecordingReclaimer, ScriptedMemorySource};
pub use memory_store::MemoryFrameStore;
pub use mock_stage::{marker_of, MockStage, StageCall, StageLog};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use crate::context::RuntimeContext;
    use crate::memory::{MemoryConfig, MemoryMonitor};
    use crate::progress::{ProgressConfig, ProgressReporter};

    use super::ScriptedMemorySource;

    /// A context whose monitor replays `trace`.
    pub fn context_with_trace(trace: Vec<f64>, memory: MemoryConfig) -> RuntimeContext {
        let monitor = MemoryMonitor::new(memory, Box::new(ScriptedMemorySource::new(trace)), None);
        RuntimeContext::new(
            Arc::new(monitor),
            Arc::new(ProgressReporter::new(&ProgressConfig::default())),
        )
    }

    /// A context at steady normal pressure.
    pub fn quiet_context() -> RuntimeContext {
        context_with_trace(vec![0.5], MemoryConfig::default())
    }
}
