//! Memory readings from the host and from accelerators.

use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use sysinfo::System;
use tracing::debug;

/// Source of system memory utilization.
pub trait MemorySource: Send + Sync {
    /// Fraction of system memory currently in use.
    fn system_fraction_used(&self) -> f64;
}

/// Accelerator memory probe.
pub trait AcceleratorProbe: Send + Sync {
    /// Name of the probe, used in logs.
    fn name(&self) -> &str;

    /// Fraction of accelerator memory in use, or `None` if it cannot be read.
    fn fraction_used(&self) -> Option<f64>;

    /// Releases cached accelerator allocations held by this process.
    ///
    /// Probes that only observe the device have nothing to release.
    fn release_cache(&self, _aggressive: bool) {}
}

/// System memory read through `sysinfo`.
pub struct SysinfoMemorySource {
    system: Mutex<System>,
}

impl SysinfoMemorySource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for SysinfoMemorySource {
    fn system_fraction_used(&self) -> f64 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        system.used_memory() as f64 / total as f64
    }
}

/// Accelerator probe that shells out to `nvidia-smi` and reports the first
/// device's memory utilization.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    binary: PathBuf,
}

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("nvidia-smi"),
        }
    }

    /// Uses a specific `nvidia-smi` binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl AcceleratorProbe for NvidiaSmiProbe {
    fn name(&self) -> &str {
        "nvidia-smi"
    }

    fn fraction_used(&self) -> Option<f64> {
        let output = Command::new(&self.binary)
            .args([
                "--query-gpu=memory.used,memory.total",
                "--format=csv,noheader,nounits",
            ])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!("nvidia-smi exited with {}", output.status);
                None
            }
            Err(e) => {
                debug!("nvidia-smi unavailable: {}", e);
                None
            }
        }
    }
}

/// Parses `memory.used, memory.total` CSV output and returns the first
/// device's used fraction.
pub fn parse_nvidia_smi(output: &str) -> Option<f64> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split(',').map(str::trim);
    let used: f64 = fields.next()?.parse().ok()?;
    let total: f64 = fields.next()?.parse().ok()?;
    if total <= 0.0 {
        return None;
    }
    Some(used / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nvidia_smi_first_device() {
        let output = "7680, 15360\n1024, 16384\n";
        assert_eq!(parse_nvidia_smi(output), Some(0.5));
    }

    #[test]
    fn test_parse_nvidia_smi_rejects_garbage() {
        assert_eq!(parse_nvidia_smi(""), None);
        assert_eq!(parse_nvidia_smi("N/A, N/A"), None);
        assert_eq!(parse_nvidia_smi("100, 0"), None);
        assert_eq!(parse_nvidia_smi("100"), None);
    }

    #[test]
    fn test_missing_nvidia_smi_binary() {
        let probe = NvidiaSmiProbe::with_binary("/nonexistent/nvidia-smi");
        assert_eq!(probe.fraction_used(), None);
    }

    #[test]
    fn test_sysinfo_fraction_in_range() {
        let source = SysinfoMemorySource::new();
        let fraction = source.system_fraction_used();
        assert!((0.0..=1.0).contains(&fraction));
    }
}
