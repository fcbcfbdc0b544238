pub mod config;
pub mod context;
pub mod engine;
pub mod frame;
pub mod memory;
pub mod metrics;
pub mod progress;
pub mod runner;
pub mod stage;
pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use context::RuntimeContext;
pub use engine::{
    EngineConfig, EngineError, RunOptions, RunState, RunStatus, StopFlag, WorkEngine,
};
pub use frame::{frames_in_dir, DiskFrameStore, Frame, FrameContext, FrameRef, FrameStore};
pub use memory::{MemoryConfig, MemoryMonitor, MemorySample, Pressure, Reclaimer};
pub use progress::{FrameEvent, ProgressReporter, ProgressSnapshot};
pub use runner::{BatchSummary, PipelineRunner, RunnerError, VideoJob};
pub use stage::{
    FrameError, FrameStage, Pipeline, PipelinePreset, RegistryError, RunTarget, StageError,
    StageRegistry,
};
