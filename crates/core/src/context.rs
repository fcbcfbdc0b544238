//! Explicit runtime state shared by the engine and the runner.

use std::sync::Arc;

use crate::config::Config;
use crate::engine::StopFlag;
use crate::memory::MemoryMonitor;
use crate::progress::ProgressReporter;

/// One memory monitor, one progress reporter and one stop flag per
/// process or test. Cloning shares all three.
#[derive(Clone)]
pub struct RuntimeContext {
    pub monitor: Arc<MemoryMonitor>,
    pub progress: Arc<ProgressReporter>,
    pub stop: StopFlag,
}

impl RuntimeContext {
    pub fn new(monitor: Arc<MemoryMonitor>, progress: Arc<ProgressReporter>) -> Self {
        Self {
            monitor,
            progress,
            stop: StopFlag::new(),
        }
    }

    /// Builds a context reading host memory as configured.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(MemoryMonitor::from_config(config.memory.clone())),
            Arc::new(ProgressReporter::new(&config.progress)),
        )
    }
}
