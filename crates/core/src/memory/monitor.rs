//! The memory monitor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::metrics;

use super::config::{AcceleratorKind, MemoryConfig};
use super::source::{AcceleratorProbe, MemorySource, NvidiaSmiProbe, SysinfoMemorySource};
use super::types::{MemorySample, Pressure};

/// Something that can give memory back when asked.
///
/// Reclaimers are invoked by [`MemoryMonitor::request_cleanup`]; they must
/// only drop caches and transient buffers, never state needed for
/// correctness.
pub trait Reclaimer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Releases transient memory. `aggressive` asks for everything that can
    /// be rebuilt later, including working-set trimming where supported.
    fn reclaim(&self, aggressive: bool);
}

/// Counters of cleanup requests served by a monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub requests: u64,
    pub aggressive: u64,
}

/// Samples memory utilization and serves cleanup requests.
pub struct MemoryMonitor {
    config: MemoryConfig,
    source: Box<dyn MemorySource>,
    accelerator: Option<Box<dyn AcceleratorProbe>>,
    latest: RwLock<Option<MemorySample>>,
    reclaimers: Mutex<Vec<(u64, Arc<dyn Reclaimer>)>>,
    next_reclaimer_id: AtomicU64,
    cleanup_requests: AtomicU64,
    aggressive_cleanups: AtomicU64,
}

impl MemoryMonitor {
    /// Creates a monitor over explicit sources.
    pub fn new(
        config: MemoryConfig,
        source: Box<dyn MemorySource>,
        accelerator: Option<Box<dyn AcceleratorProbe>>,
    ) -> Self {
        Self {
            config,
            source,
            accelerator,
            latest: RwLock::new(None),
            reclaimers: Mutex::new(Vec::new()),
            next_reclaimer_id: AtomicU64::new(0),
            cleanup_requests: AtomicU64::new(0),
            aggressive_cleanups: AtomicU64::new(0),
        }
    }

    /// Creates a monitor reading host memory through `sysinfo` and the
    /// accelerator probe selected in `config`.
    pub fn from_config(config: MemoryConfig) -> Self {
        let accelerator: Option<Box<dyn AcceleratorProbe>> = match config.accelerator {
            AcceleratorKind::None => None,
            AcceleratorKind::NvidiaSmi => Some(Box::new(NvidiaSmiProbe::new())),
        };
        Self::new(config, Box::new(SysinfoMemorySource::new()), accelerator)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Reads current utilization and makes it the latest sample.
    pub fn sample(&self) -> MemorySample {
        let system = self.source.system_fraction_used();
        let accelerator = self.accelerator.as_ref().and_then(|a| a.fraction_used());
        let sample = MemorySample::new(system, accelerator);

        let level = self.classify(&sample);
        metrics::MEMORY_PRESSURE
            .with_label_values(&[level.as_str()])
            .inc();
        debug!(
            system = sample.system_fraction_used,
            accelerator = ?sample.accelerator_fraction_used,
            pressure = level.as_str(),
            "Memory sampled"
        );

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(sample);
        sample
    }

    /// Same as [`sample`], run on the blocking pool. Readers may refresh
    /// host statistics or spawn `nvidia-smi`, which must not stall an async
    /// worker thread.
    ///
    /// Returns `None` if the reading task died; the previous sample stays
    /// the latest one.
    ///
    /// [`sample`]: MemoryMonitor::sample
    pub async fn sample_async(self: &Arc<Self>) -> Option<MemorySample> {
        let monitor = Arc::clone(self);
        match tokio::task::spawn_blocking(move || monitor.sample()).await {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("Memory sampling task failed: {}", e);
                None
            }
        }
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<MemorySample> {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pressure level of the latest sample.
    ///
    /// Never samples on its own: repeated calls between two [`sample`]
    /// calls return the same level. Before the first sample the level is
    /// [`Pressure::Normal`].
    ///
    /// [`sample`]: MemoryMonitor::sample
    pub fn pressure(&self) -> Pressure {
        self.latest()
            .map(|sample| self.classify(&sample))
            .unwrap_or(Pressure::Normal)
    }

    /// Classifies a sample against the configured thresholds.
    pub fn classify(&self, sample: &MemorySample) -> Pressure {
        let accelerator = sample.accelerator_fraction_used;

        let high = sample.system_fraction_used >= self.config.threshold_high
            || accelerator.is_some_and(|a| a >= self.config.accelerator_threshold_high);
        if high {
            return Pressure::High;
        }

        let low = sample.system_fraction_used < self.config.threshold_normal
            && accelerator.map_or(true, |a| a < self.config.threshold_normal);
        if low {
            Pressure::Low
        } else {
            Pressure::Normal
        }
    }

    /// How many workers should be active out of `worker_limit` at the
    /// latest pressure level. Halved under high pressure, never below one.
    pub fn suggested_concurrency(&self, worker_limit: usize) -> usize {
        let worker_limit = worker_limit.max(1);
        match self.pressure() {
            Pressure::High => (worker_limit / 2).max(1),
            Pressure::Low | Pressure::Normal => worker_limit,
        }
    }

    /// Asks every registered reclaimer and the accelerator probe to give
    /// memory back. Best effort; returns once all of them have been asked.
    pub fn request_cleanup(&self, aggressive: bool) {
        self.cleanup_requests.fetch_add(1, Ordering::Relaxed);
        if aggressive {
            self.aggressive_cleanups.fetch_add(1, Ordering::Relaxed);
        }
        let mode = if aggressive { "aggressive" } else { "standard" };
        metrics::CLEANUP_REQUESTS.with_label_values(&[mode]).inc();

        let reclaimers: Vec<Arc<dyn Reclaimer>> = self
            .reclaimers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, r)| Arc::clone(r))
            .collect();

        info!(
            mode,
            reclaimers = reclaimers.len(),
            "Requesting memory cleanup"
        );

        for reclaimer in &reclaimers {
            debug!("Reclaiming memory from {}", reclaimer.name());
            reclaimer.reclaim(aggressive);
        }

        if let Some(accelerator) = &self.accelerator {
            accelerator.release_cache(aggressive);
        }
    }

    /// Registers a reclaimer until the returned guard is dropped.
    pub fn register_reclaimer(self: &Arc<Self>, reclaimer: Arc<dyn Reclaimer>) -> ReclaimerGuard {
        let id = self.next_reclaimer_id.fetch_add(1, Ordering::Relaxed);
        self.reclaimers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, reclaimer));

        ReclaimerGuard {
            monitor: Arc::clone(self),
            id,
        }
    }

    /// Number of currently registered reclaimers.
    pub fn reclaimer_count(&self) -> usize {
        self.reclaimers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn cleanup_stats(&self) -> CleanupStats {
        CleanupStats {
            requests: self.cleanup_requests.load(Ordering::Relaxed),
            aggressive: self.aggressive_cleanups.load(Ordering::Relaxed),
        }
    }

    fn unregister(&self, id: u64) {
        self.reclaimers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}

/// Keeps a reclaimer registered with a [`MemoryMonitor`] while alive.
pub struct ReclaimerGuard {
    monitor: Arc<MemoryMonitor>,
    id: u64,
}

impl Drop for ReclaimerGuard {
    fn drop(&mut self) {
        self.monitor.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingReclaimer, ScriptedMemorySource};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Takes a while to read and records whether the async runtime kept
    /// making progress meanwhile.
    struct SlowSource {
        ticks: Arc<AtomicU64>,
        runtime_progressed: Arc<AtomicBool>,
    }

    impl MemorySource for SlowSource {
        fn system_fraction_used(&self) -> f64 {
            let before = self.ticks.load(Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            let after = self.ticks.load(Ordering::SeqCst);
            self.runtime_progressed.store(after > before, Ordering::SeqCst);
            0.5
        }
    }

    struct FixedAccelerator(Option<f64>);

    impl AcceleratorProbe for FixedAccelerator {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fraction_used(&self) -> Option<f64> {
            self.0
        }
    }

    fn monitor(trace: Vec<f64>) -> MemoryMonitor {
        MemoryMonitor::new(
            MemoryConfig::default(),
            Box::new(ScriptedMemorySource::new(trace)),
            None,
        )
    }

    #[test]
    fn test_classification_thresholds() {
        let monitor = monitor(vec![0.69, 0.70, 0.849, 0.85, 0.99]);
        let levels: Vec<Pressure> = (0..5)
            .map(|_| {
                monitor.sample();
                monitor.pressure()
            })
            .collect();

        assert_eq!(
            levels,
            vec![
                Pressure::Low,
                Pressure::Normal,
                Pressure::Normal,
                Pressure::High,
                Pressure::High
            ]
        );
    }

    #[test]
    fn test_pressure_does_not_resample() {
        let monitor = monitor(vec![0.95, 0.10]);
        assert_eq!(monitor.pressure(), Pressure::Normal);

        monitor.sample();
        assert_eq!(monitor.pressure(), Pressure::High);
        assert_eq!(monitor.pressure(), Pressure::High);
        assert_eq!(monitor.pressure(), Pressure::High);

        monitor.sample();
        assert_eq!(monitor.pressure(), Pressure::Low);
    }

    #[test]
    fn test_suggested_concurrency() {
        let monitor = monitor(vec![0.5, 0.9]);
        assert_eq!(monitor.suggested_concurrency(8), 8);

        monitor.sample();
        assert_eq!(monitor.suggested_concurrency(8), 8);

        monitor.sample();
        assert_eq!(monitor.suggested_concurrency(8), 4);
        assert_eq!(monitor.suggested_concurrency(1), 1);
    }

    #[test]
    fn test_accelerator_drives_high_pressure() {
        let monitor = MemoryMonitor::new(
            MemoryConfig::default(),
            Box::new(ScriptedMemorySource::constant(0.2)),
            Some(Box::new(FixedAccelerator(Some(0.92)))),
        );
        let sample = monitor.sample();
        assert_eq!(sample.accelerator_fraction_used, Some(0.92));
        assert_eq!(monitor.pressure(), Pressure::High);
    }

    #[test]
    fn test_accelerator_blocks_low_pressure() {
        let monitor = MemoryMonitor::new(
            MemoryConfig::default(),
            Box::new(ScriptedMemorySource::constant(0.2)),
            Some(Box::new(FixedAccelerator(Some(0.75)))),
        );
        monitor.sample();
        assert_eq!(monitor.pressure(), Pressure::Normal);
    }

    #[test]
    fn test_unreadable_accelerator_is_absent() {
        let monitor = MemoryMonitor::new(
            MemoryConfig::default(),
            Box::new(ScriptedMemorySource::constant(0.2)),
            Some(Box::new(FixedAccelerator(None))),
        );
        let sample = monitor.sample();
        assert!(sample.accelerator_fraction_used.is_none());
        assert_eq!(monitor.pressure(), Pressure::Low);
    }

    #[test]
    fn test_cleanup_reaches_registered_reclaimers() {
        let monitor = Arc::new(monitor(vec![0.5]));
        let reclaimer = Arc::new(RecordingReclaimer::new("buffers"));

        let guard = monitor.register_reclaimer(reclaimer.clone());
        assert_eq!(monitor.reclaimer_count(), 1);

        monitor.request_cleanup(false);
        monitor.request_cleanup(true);
        assert_eq!(reclaimer.calls(), 2);
        assert_eq!(reclaimer.aggressive_calls(), 1);
        assert_eq!(
            monitor.cleanup_stats(),
            CleanupStats {
                requests: 2,
                aggressive: 1
            }
        );

        drop(guard);
        assert_eq!(monitor.reclaimer_count(), 0);
        monitor.request_cleanup(true);
        assert_eq!(reclaimer.calls(), 2);
    }
    #[tokio::test]
    async fn test_sample_async_does_not_block_runtime() {
        let ticks = Arc::new(AtomicU64::new(0));
        let runtime_progressed = Arc::new(AtomicBool::new(false));
        let monitor = Arc::new(MemoryMonitor::new(
            MemoryConfig::default(),
            Box::new(SlowSource {
                ticks: Arc::clone(&ticks),
                runtime_progressed: Arc::clone(&runtime_progressed),
            }),
            None,
        ));

        let heartbeat = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };
        tokio::task::yield_now().await;

        let sample = monitor.sample_async().await;
        heartbeat.abort();

        assert_eq!(sample.map(|s| s.system_fraction_used), Some(0.5));
        assert_eq!(monitor.latest(), sample);
        assert!(runtime_progressed.load(Ordering::SeqCst));
    }
}
