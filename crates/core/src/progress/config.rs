//! Configuration for progress reporting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Width of the sliding window used for the throughput estimate.
    #[serde(default = "default_throughput_window_secs")]
    pub throughput_window_secs: u64,

    /// Interval between progress log lines.
    #[serde(default = "default_log_interval_secs")]
    pub log_interval_secs: u64,
}

fn default_throughput_window_secs() -> u64 {
    10
}

fn default_log_interval_secs() -> u64 {
    10
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            throughput_window_secs: default_throughput_window_secs(),
            log_interval_secs: default_log_interval_secs(),
        }
    }
}

impl ProgressConfig {
    pub fn with_throughput_window(mut self, secs: u64) -> Self {
        self.throughput_window_secs = secs;
        self
    }

    pub fn with_log_interval(mut self, secs: u64) -> Self {
        self.log_interval_secs = secs;
        self
    }

    pub fn throughput_window(&self) -> Duration {
        Duration::from_secs(self.throughput_window_secs.max(1))
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval_secs.max(1))
    }
}
