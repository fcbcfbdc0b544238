//! Aggregates per-frame events into a live snapshot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

use crate::memory::MemorySample;
use crate::metrics;

use super::config::ProgressConfig;
use super::types::{FrameEvent, FrameOutcome, ProgressSnapshot, StageOutcome};

#[derive(Debug, Clone, Copy)]
struct Clock {
    started: Instant,
    finished: Option<Instant>,
}

/// Progress counters for the active run.
///
/// Writers are the completion callbacks, readers are displays calling
/// [`snapshot`](ProgressReporter::snapshot). Counters are atomics; the
/// throughput window and memory snapshot sit behind locks that are only
/// held for the update itself.
pub struct ProgressReporter {
    window: Duration,
    total: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    stage_events: AtomicU64,
    clock: RwLock<Clock>,
    recent: Mutex<VecDeque<Instant>>,
    memory: RwLock<Option<MemorySample>>,
}

impl ProgressReporter {
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            window: config.throughput_window(),
            total: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            stage_events: AtomicU64::new(0),
            clock: RwLock::new(Clock {
                started: Instant::now(),
                finished: None,
            }),
            recent: Mutex::new(VecDeque::new()),
            memory: RwLock::new(None),
        }
    }

    /// Resets all counters for a run of `total` frames.
    pub fn begin(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.stage_events.store(0, Ordering::Relaxed);
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.clock.write().unwrap_or_else(PoisonError::into_inner) = Clock {
            started: Instant::now(),
            finished: None,
        };
    }

    /// Records one stage completion for one frame.
    pub fn report(&self, event: &FrameEvent) {
        self.stage_events.fetch_add(1, Ordering::Relaxed);
        metrics::STAGE_EVENTS
            .with_label_values(&[event.stage_name.as_str(), event.outcome.as_str()])
            .inc();

        match event.frame_outcome {
            Some(FrameOutcome::Completed) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                metrics::FRAMES_TOTAL.with_label_values(&["completed"]).inc();
                self.mark_finished(1);
            }
            Some(FrameOutcome::Failed) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                metrics::FRAMES_TOTAL.with_label_values(&["failed"]).inc();
                self.mark_finished(1);
            }
            None => {}
        }

        if event.outcome == StageOutcome::Failed {
            tracing::debug!(
                frame = %event.frame,
                stage = %event.stage_name,
                "Stage failed for frame"
            );
        }
    }

    /// Counts frames that failed without emitting events, such as frames of
    /// a chunk whose worker crashed.
    pub fn record_lost(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.failed.fetch_add(count, Ordering::Relaxed);
        metrics::FRAMES_TOTAL
            .with_label_values(&["failed"])
            .inc_by(count);
        self.mark_finished(count);
    }

    /// Publishes the latest memory reading.
    pub fn set_memory(&self, sample: MemorySample) {
        *self.memory.write().unwrap_or_else(PoisonError::into_inner) = Some(sample);
    }

    /// Stops the elapsed clock.
    pub fn finish(&self) {
        let mut clock = self.clock.write().unwrap_or_else(PoisonError::into_inner);
        if clock.finished.is_none() {
            clock.finished = Some(Instant::now());
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let clock = *self.clock.read().unwrap_or_else(PoisonError::into_inner);
        let now = clock.finished.unwrap_or_else(Instant::now);
        let elapsed = now.saturating_duration_since(clock.started);

        let in_window = {
            let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
            evict_before(&mut recent, now, self.window);
            recent.len()
        };
        let span = elapsed.min(self.window).as_secs_f64();
        let throughput_fps = if span > 0.0 {
            in_window as f64 / span
        } else {
            0.0
        };

        ProgressSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            stage_events: self.stage_events.load(Ordering::Relaxed),
            elapsed_secs: elapsed.as_secs_f64(),
            throughput_fps,
            current_memory: *self.memory.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Logs a snapshot every `every` until `shutdown` fires, then logs a
    /// final line.
    pub fn spawn_logger(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: mpsc::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = self.snapshot();
                        info!("[{:.1}%] {}", snapshot.percent(), snapshot);
                    }
                    _ = shutdown.recv() => {
                        let snapshot = self.snapshot();
                        info!("Final: {}", snapshot);
                        break;
                    }
                }
            }
        })
    }

    fn mark_finished(&self, count: u64) {
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..count {
            recent.push_back(now);
        }
        evict_before(&mut recent, now, self.window);
    }
}

fn evict_before(recent: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = recent.front() {
        if now.saturating_duration_since(*front) > window {
            recent.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameRef;
    use std::path::PathBuf;

    fn frame(index: usize) -> FrameRef {
        FrameRef::new(index, PathBuf::from(format!("{:04}.png", index)))
    }

    fn events_for(index: usize, outcome: FrameOutcome) -> Vec<FrameEvent> {
        vec![
            FrameEvent::new(frame(index), "a", StageOutcome::Succeeded),
            FrameEvent::new(frame(index), "b", StageOutcome::Succeeded).finishing(outcome),
        ]
    }

    #[test]
    fn test_counts_frames_once_across_stages() {
        let reporter = ProgressReporter::new(&ProgressConfig::default());
        reporter.begin(3);

        for event in events_for(0, FrameOutcome::Completed)
            .iter()
            .chain(events_for(1, FrameOutcome::Completed).iter())
            .chain(events_for(2, FrameOutcome::Failed).iter())
        {
            reporter.report(event);
        }

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.stage_events, 6);
        assert_eq!(snapshot.finished(), 3);
        assert!((snapshot.percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_begin_resets_counters() {
        let reporter = ProgressReporter::new(&ProgressConfig::default());
        reporter.begin(1);
        reporter.record_lost(1);
        assert_eq!(reporter.snapshot().failed, 1);

        reporter.begin(5);
        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.total, 5);
        assert_eq!(snapshot.stage_events, 0);
    }

    #[test]
    fn test_snapshot_carries_memory() {
        let reporter = ProgressReporter::new(&ProgressConfig::default());
        assert!(reporter.snapshot().current_memory.is_none());

        reporter.set_memory(MemorySample::new(0.42, None));
        let snapshot = reporter.snapshot();
        assert_eq!(
            snapshot.current_memory.map(|m| m.system_fraction_used),
            Some(0.42)
        );
        assert!(snapshot.to_string().contains("mem 42%"));
    }

    #[test]
    fn test_finish_freezes_elapsed() {
        let reporter = ProgressReporter::new(&ProgressConfig::default());
        reporter.begin(1);
        reporter.finish();
        let first = reporter.snapshot().elapsed_secs;
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(reporter.snapshot().elapsed_secs, first);
    }

    #[test]
    fn test_empty_run_percent() {
        let reporter = ProgressReporter::new(&ProgressConfig::default());
        reporter.begin(0);
        assert_eq!(reporter.snapshot().percent(), 0.0);
    }

    #[tokio::test]
    async fn test_logger_stops_on_shutdown() {
        let reporter = Arc::new(ProgressReporter::new(&ProgressConfig::default()));
        let (tx, rx) = mpsc::channel(1);
        let handle = reporter.clone().spawn_logger(Duration::from_millis(10), rx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).await.unwrap();
        handle.await.unwrap();
    }
}
