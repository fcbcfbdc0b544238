//! The pipeline runner.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::engine::{RunOptions, RunState, WorkEngine};
use crate::frame::FrameRef;
use crate::metrics;
use crate::stage::{Pipeline, RunTarget};

use super::error::RunnerError;
use super::types::{BatchSummary, JobResult, VideoJob};

/// Wires a pipeline, its frames and the engine together.
pub struct PipelineRunner {
    engine: WorkEngine,
    log_interval: Option<Duration>,
}

impl PipelineRunner {
    pub fn new(engine: WorkEngine) -> Self {
        Self {
            engine,
            log_interval: None,
        }
    }

    /// Logs a progress line every `interval` while a run is active.
    pub fn with_progress_logging(mut self, interval: Duration) -> Self {
        self.log_interval = Some(interval);
        self
    }

    pub fn engine(&self) -> &WorkEngine {
        &self.engine
    }

    /// Processes the extracted frames of one video.
    ///
    /// Asset and target checks run first; if either fails nothing is
    /// dispatched. The pipeline's resources are released once the engine
    /// returns, whatever the outcome.
    pub async fn run_video(
        &self,
        pipeline: Arc<Pipeline>,
        target: &RunTarget,
        frames: Vec<FrameRef>,
    ) -> Result<RunState, RunnerError> {
        pipeline.pre_check().await.map_err(|e| {
            error!("Pre-check failed for {}: {}", target.target.display(), e);
            RunnerError::PreCheck(e)
        })?;
        pipeline.pre_start(target).await.map_err(|e| {
            error!("Target rejected: {}", e);
            RunnerError::PreStart(e)
        })?;

        let ctx = self.engine.context();
        let _reclaimer = ctx.monitor.register_reclaimer(pipeline.clone());

        let mut options = RunOptions::from_config(self.engine.config());
        if let Some(source) = &target.source {
            options = options.with_source(source);
        }

        let logger = self.log_interval.map(|interval| {
            let (tx, rx) = mpsc::channel(1);
            let handle = Arc::clone(&ctx.progress).spawn_logger(interval, rx);
            (tx, handle)
        });

        info!(
            "Processing {} ({} frames) with [{}]",
            target.target.display(),
            frames.len(),
            pipeline.names().join(" -> ")
        );
        let started = Instant::now();
        let result = self.engine.run(Arc::clone(&pipeline), frames, options).await;

        if let Some((tx, handle)) = logger {
            let _ = tx.send(()).await;
            if let Err(e) = handle.await {
                warn!("Progress logger ended abnormally: {}", e);
            }
        }

        pipeline.post_process();

        let state = result?;
        metrics::RUN_DURATION
            .with_label_values(&[state.status.as_str()])
            .observe(started.elapsed().as_secs_f64());
        Ok(state)
    }

    /// Processes a single still image: copies `target` to `output` and runs
    /// the pipeline on the copy.
    pub async fn run_image(
        &self,
        pipeline: Arc<Pipeline>,
        target: &RunTarget,
        output: &Path,
    ) -> Result<RunState, RunnerError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| RunnerError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::copy(&target.target, output)
            .await
            .map_err(|source| RunnerError::Io {
                path: target.target.clone(),
                source,
            })?;

        self.run_video(pipeline, target, vec![FrameRef::new(0, output)])
            .await
    }

    /// Processes several videos one after another, continuing past failed
    /// jobs. Stops starting new jobs once a stop has been requested.
    pub async fn run_batch(&self, pipeline: Arc<Pipeline>, jobs: Vec<VideoJob>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let total = jobs.len();

        for (position, job) in jobs.into_iter().enumerate() {
            if self.engine.context().stop.is_stopped() {
                warn!("Stop requested, {} job(s) not started", total - position);
                summary.push(JobResult {
                    target: job.target.target.clone(),
                    state: None,
                    error: Some("stopped before start".to_string()),
                });
                continue;
            }

            info!("Batch job {}/{}: {}", position + 1, total, job.target.target.display());
            let result = match self
                .run_video(Arc::clone(&pipeline), &job.target, job.frames)
                .await
            {
                Ok(state) => JobResult {
                    target: job.target.target,
                    state: Some(state),
                    error: None,
                },
                Err(e) => {
                    warn!("Batch job failed: {}", e);
                    JobResult {
                        target: job.target.target,
                        state: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            summary.push(result);
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            summary.succeeded, summary.failed
        );
        summary
    }
}
