//! The coordinator: lazy chunking, bounded workers and memory-driven
//! adaptation.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::RuntimeContext;
use crate::frame::{FrameRef, FrameStore};
use crate::memory::Pressure;
use crate::metrics;
use crate::progress::{FrameEvent, FrameOutcome, ProgressReporter};
use crate::stage::{ChunkReport, Pipeline};

use super::chunk::{Chunk, ChunkCompletion, ChunkSizer};
use super::config::EngineConfig;
use super::error::EngineError;
use super::state::{RunAccumulator, RunState};

/// Per-run parameters.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub worker_limit: usize,
    pub batch_hint: usize,
    /// Source image passed to every stage.
    pub source: Option<Arc<Path>>,
}

impl RunOptions {
    pub fn new(worker_limit: usize, batch_hint: usize) -> Self {
        Self {
            worker_limit,
            batch_hint,
            source: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.worker_limit, config.batch_hint)
    }

    pub fn with_source(mut self, source: impl AsRef<Path>) -> Self {
        self.source = Some(Arc::from(source.as_ref()));
        self
    }
}

/// Splits frames into chunks and runs them on a bounded pool of blocking
/// workers.
pub struct WorkEngine {
    ctx: RuntimeContext,
    store: Arc<dyn FrameStore>,
    config: EngineConfig,
}

impl WorkEngine {
    pub fn new(ctx: RuntimeContext, store: Arc<dyn FrameStore>, config: EngineConfig) -> Self {
        Self { ctx, store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Runs `pipeline` over `frames` and returns once every dispatched
    /// chunk has reported back.
    ///
    /// Frame failures never surface as errors; they are counted in the
    /// returned state. Failed frames are not retried.
    pub async fn run(
        &self,
        pipeline: Arc<Pipeline>,
        frames: Vec<FrameRef>,
        options: RunOptions,
    ) -> Result<RunState, EngineError> {
        if options.worker_limit == 0 || options.batch_hint == 0 {
            return Err(EngineError::InvalidLimits {
                worker_limit: options.worker_limit,
                batch_hint: options.batch_hint,
            });
        }

        let monitor = &self.ctx.monitor;
        let progress = &self.ctx.progress;
        let aggressive_on_high = monitor.config().aggressive_cleanup_on_high_pressure;

        let run_id = Uuid::new_v4();
        let total = frames.len();
        let mut acc = RunAccumulator::new(run_id, total);
        let mut sizer = ChunkSizer::new(
            total,
            options.worker_limit,
            options.batch_hint,
            self.config.max_chunk_multiplier,
        );
        let mut pending: VecDeque<FrameRef> = frames.into();

        progress.begin(total as u64);
        info!(
            %run_id,
            frames = total,
            stages = ?pipeline.names(),
            worker_limit = options.worker_limit,
            chunk_size = sizer.current(),
            "Starting run"
        );

        let slots = Arc::new(Semaphore::new(options.worker_limit));
        let mut active_limit = options.worker_limit;
        let mut workers: JoinSet<ChunkCompletion> = JoinSet::new();
        // Frames of each chunk still in flight, so a lost worker can be accounted for.
        let mut in_flight: BTreeMap<u64, Vec<FrameRef>> = BTreeMap::new();
        let mut next_chunk_id: u64 = 0;
        let mut consecutive_high = 0u32;

        loop {
            while !pending.is_empty() && workers.len() < active_limit {
                if self.ctx.stop.is_stopped() {
                    break;
                }
                let permit = match Arc::clone(&slots).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let size = sizer.current().min(pending.len());
                let chunk = Chunk {
                    id: next_chunk_id,
                    frames: pending.drain(..size).collect(),
                };
                next_chunk_id += 1;

                acc.dispatched(chunk.id);
                in_flight.insert(chunk.id, chunk.frames.clone());
                metrics::CHUNK_SIZE.observe(size as f64);
                debug!(chunk = chunk.id, size, pending = pending.len(), "Dispatching chunk");

                let pipeline = Arc::clone(&pipeline);
                let store = Arc::clone(&self.store);
                let progress = Arc::clone(progress);
                let source = options.source.clone();
                workers.spawn_blocking(move || {
                    let completion =
                        run_worker(chunk, &pipeline, store.as_ref(), source.as_ref(), &progress);
                    drop(permit);
                    completion
                });
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };

            let completion = match joined {
                Ok(completion) => completion,
                Err(e) => {
                    error!(%run_id, "Worker task lost: {}", e);
                    continue;
                }
            };
            in_flight.remove(&completion.id);
            acc.absorb(&completion);

            let result = if completion.crashed {
                "crashed"
            } else if completion.report.resource_exhausted {
                "exhausted"
            } else {
                "completed"
            };
            metrics::CHUNKS_TOTAL.with_label_values(&[result]).inc();
            debug!(
                chunk = completion.id,
                completed = completion.report.completed.len(),
                failed = completion.report.failed.len(),
                elapsed_ms = completion.elapsed.as_millis() as u64,
                "Chunk finished"
            );

            let sample = monitor.sample_async().await;
            if let Some(sample) = sample {
                progress.set_memory(sample);
            }
            let pressure = monitor.pressure();
            active_limit = monitor.suggested_concurrency(options.worker_limit);
            consecutive_high = if pressure == Pressure::High {
                consecutive_high + 1
            } else {
                0
            };

            if completion.report.resource_exhausted {
                let returned = completion.report.unprocessed.len();
                for frame in completion.report.unprocessed.into_iter().rev() {
                    pending.push_front(frame);
                }
                let next = sizer.halve();
                warn!(
                    chunk = completion.id,
                    returned,
                    next_chunk_size = next,
                    "Chunk ran out of resources, shrinking chunks"
                );
                monitor.request_cleanup(true);
                acc.cleanup_requests += 1;
                continue;
            }

            let next = sizer.adjust(pressure);
            debug!(pressure = pressure.as_str(), next_chunk_size = next, "Adjusted chunk size");

            if consecutive_high >= 2 {
                let pause = self.config.backpressure_pause();
                info!(
                    pause_secs = pause.as_secs_f64(),
                    system = ?sample.map(|s| s.system_fraction_used),
                    "Sustained high memory pressure, pausing dispatch"
                );
                metrics::BACKPRESSURE_PAUSES.inc();
                acc.backpressure_pauses += 1;
                tokio::time::sleep(pause).await;

                monitor.request_cleanup(aggressive_on_high);
                acc.cleanup_requests += 1;
                consecutive_high = 0;
            }
        }

        for (id, frames) in in_flight {
            error!(%run_id, chunk = id, frames = frames.len(), "Marking frames of lost chunk as failed");
            progress.record_lost(frames.len() as u64);
            acc.lost(id, frames);
        }

        let skipped = pending.len();
        if skipped > 0 {
            info!(%run_id, skipped, "Stop requested, frames left undispatched");
        }

        progress.finish();
        let state = acc.finish(skipped);
        info!(
            %run_id,
            status = state.status.as_str(),
            completed = state.completed_frames,
            failed = state.failed_frames,
            skipped = state.skipped_frames,
            chunks = state.chunk_sizes.len(),
            "Run finished"
        );
        Ok(state)
    }
}

/// Runs one chunk on a blocking thread. A panic inside a stage is
/// contained here: frames already finished keep their outcome and the
/// rest of the chunk is failed.
fn run_worker(
    chunk: Chunk,
    pipeline: &Pipeline,
    store: &dyn FrameStore,
    source: Option<&Arc<Path>>,
    progress: &ProgressReporter,
) -> ChunkCompletion {
    let started = Instant::now();
    let mut finished: Vec<(FrameRef, FrameOutcome)> = Vec::new();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pipeline.process_frames(source, store, &chunk.frames, &mut |event: FrameEvent| {
            if let Some(outcome) = event.frame_outcome {
                finished.push((event.frame.clone(), outcome));
            }
            progress.report(&event);
        })
    }));

    match result {
        Ok(report) => ChunkCompletion {
            id: chunk.id,
            report,
            crashed: false,
            elapsed: started.elapsed(),
        },
        Err(payload) => {
            error!(chunk = chunk.id, "Worker crashed: {}", panic_message(payload.as_ref()));

            let mut report = ChunkReport::default();
            for (frame, outcome) in finished {
                match outcome {
                    FrameOutcome::Completed => report.completed.push(frame),
                    FrameOutcome::Failed => report.failed.push(frame),
                }
            }
            let lost: Vec<FrameRef> = chunk
                .frames
                .into_iter()
                .filter(|f| !report.completed.contains(f) && !report.failed.contains(f))
                .collect();
            progress.record_lost(lost.len() as u64);
            report.failed.extend(lost);

            ChunkCompletion {
                id: chunk.id,
                report,
                crashed: true,
                elapsed: started.elapsed(),
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
