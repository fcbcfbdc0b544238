//! Memory sample and pressure types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reading of memory utilization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Fraction of system memory in use, in `[0, 1]`.
    pub system_fraction_used: f64,
    /// Fraction of accelerator memory in use, when an accelerator is probed.
    pub accelerator_fraction_used: Option<f64>,
    /// When the sample was taken.
    pub taken_at: DateTime<Utc>,
}

impl MemorySample {
    /// Creates a sample taken now. Fractions are clamped to `[0, 1]`.
    pub fn new(system_fraction_used: f64, accelerator_fraction_used: Option<f64>) -> Self {
        Self {
            system_fraction_used: clamp_fraction(system_fraction_used),
            accelerator_fraction_used: accelerator_fraction_used.map(clamp_fraction),
            taken_at: Utc::now(),
        }
    }
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Classification of memory utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pressure {
    Low,
    Normal,
    High,
}

impl Pressure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}
