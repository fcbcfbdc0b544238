//! Configuration for the memory monitor.

use serde::{Deserialize, Serialize};

/// Memory thresholds and cleanup policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Fraction of system memory at or above which pressure is no longer low.
    #[serde(default = "default_threshold_normal")]
    pub threshold_normal: f64,

    /// Fraction of system memory at or above which pressure is high.
    #[serde(default = "default_threshold_high")]
    pub threshold_high: f64,

    /// Fraction of accelerator memory at or above which pressure is high.
    #[serde(default = "default_accelerator_threshold_high")]
    pub accelerator_threshold_high: f64,

    /// Whether cleanup issued for sustained high pressure is aggressive.
    #[serde(default = "default_true")]
    pub aggressive_cleanup_on_high_pressure: bool,

    /// Accelerator memory probe to use.
    #[serde(default)]
    pub accelerator: AcceleratorKind,
}

/// Accelerator probe selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceleratorKind {
    /// No accelerator; samples carry no accelerator fraction.
    #[default]
    None,
    /// Query NVIDIA devices through `nvidia-smi`.
    NvidiaSmi,
}

fn default_threshold_normal() -> f64 {
    0.70
}

fn default_threshold_high() -> f64 {
    0.85
}

fn default_accelerator_threshold_high() -> f64 {
    0.90
}

fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            threshold_normal: default_threshold_normal(),
            threshold_high: default_threshold_high(),
            accelerator_threshold_high: default_accelerator_threshold_high(),
            aggressive_cleanup_on_high_pressure: true,
            accelerator: AcceleratorKind::None,
        }
    }
}

impl MemoryConfig {
    /// Sets the normal and high system thresholds.
    pub fn with_thresholds(mut self, normal: f64, high: f64) -> Self {
        self.threshold_normal = normal;
        self.threshold_high = high;
        self
    }

    /// Sets whether sustained-pressure cleanup is aggressive.
    pub fn with_aggressive_cleanup(mut self, enabled: bool) -> Self {
        self.aggressive_cleanup_on_high_pressure = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.threshold_normal, 0.70);
        assert_eq!(config.threshold_high, 0.85);
        assert_eq!(config.accelerator_threshold_high, 0.90);
        assert!(config.aggressive_cleanup_on_high_pressure);
        assert_eq!(config.accelerator, AcceleratorKind::None);
    }

    #[test]
    fn test_deserialize_accelerator() {
        let toml = r#"
            threshold_high = 0.8
            accelerator = "nvidia_smi"
        "#;
        let config: MemoryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.threshold_high, 0.8);
        assert_eq!(config.threshold_normal, 0.70);
        assert_eq!(config.accelerator, AcceleratorKind::NvidiaSmi);
    }
}
