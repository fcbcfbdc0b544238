//! Configuration for stage assets.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where stage models live and whether missing ones may be fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Download missing models from their declared URL.
    #[serde(default = "default_download")]
    pub download: bool,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_download() -> bool {
    true
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            download: default_download(),
        }
    }
}

impl AssetConfig {
    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }
}
