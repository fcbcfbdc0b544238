use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::memory::MemoryConfig;
use crate::progress::ProgressConfig;
use crate::stage::AssetConfig;

/// Root configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub assets: AssetConfig,
}

impl Config {
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_assets(mut self, assets: AssetConfig) -> Self {
        self.assets = assets;
        self
    }
}
