//! Memory-pressure monitoring.
//!
//! The [`MemoryMonitor`] samples host (and optionally accelerator) memory,
//! classifies the latest sample into a [`Pressure`] level, and is the single
//! entry point for cleanup requests issued by the work engine at chunk
//! boundaries.

mod config;
mod monitor;
mod source;
mod types;

pub use config::{AcceleratorKind, MemoryConfig};
pub use monitor::{CleanupStats, MemoryMonitor, Reclaimer, ReclaimerGuard};
pub use source::{
    parse_nvidia_smi, AcceleratorProbe, MemorySource, NvidiaSmiProbe, SysinfoMemorySource,
};
pub use types::{MemorySample, Pressure};
