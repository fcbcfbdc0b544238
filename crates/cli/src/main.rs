use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use frameflow_core::{
    frames_in_dir, load_config, metrics, validate_config, Config, DiskFrameStore, FrameStore,
    PipelinePreset, PipelineRunner, RunTarget, RuntimeContext, StageRegistry, WorkEngine,
};
use frameflow_core::stage::{PassthroughLoader, StageBuildContext};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config file used when none is given and it exists
const DEFAULT_CONFIG: &str = "frameflow.toml";

#[derive(Parser)]
#[command(name = "frameflow")]
#[command(about = "Memory-aware parallel frame pipeline", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "FRAMEFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pipeline presets and registered stages
    Presets,

    /// Check (and fetch if allowed) the models of a pipeline
    Check {
        /// Preset name or comma-separated stage list
        #[arg(short, long, default_value = "full")]
        preset: String,
    },

    /// Print one memory sample
    Memory,

    /// Run a pipeline over a directory of extracted frames with passthrough
    /// models
    Run {
        /// Directory of extracted frames
        #[arg(short, long)]
        frames: PathBuf,

        /// Video or image the frames were extracted from
        #[arg(short, long)]
        target: PathBuf,

        /// Source face image
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Preset name or comma-separated stage list
        #[arg(short, long, default_value = "full")]
        preset: String,

        /// Override engine.worker_limit
        #[arg(long)]
        workers: Option<usize>,

        /// Override engine.batch_hint
        #[arg(long)]
        batch: Option<usize>,

        /// Print the final run state as JSON
        #[arg(long)]
        json: bool,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Presets => {
            for preset in PipelinePreset::NAMED {
                println!("{:<14} {}", preset.as_str(), preset.stage_names().join(" -> "));
            }
            println!();
            println!("stages: {}", StageRegistry::with_builtin().names().join(", "));
        }
        Commands::Check { preset } => {
            let pipeline = build_pipeline(&config, &preset)?;
            pipeline
                .pre_check()
                .await
                .context("Asset check failed")?;
            info!("All models present for [{}]", pipeline.names().join(", "));
        }
        Commands::Memory => {
            let ctx = RuntimeContext::from_config(&config);
            let sample = ctx
                .monitor
                .sample_async()
                .await
                .context("Memory sampling failed")?;
            println!("{}", serde_json::to_string_pretty(&sample)?);
            println!("pressure: {}", ctx.monitor.pressure().as_str());
        }
        Commands::Run {
            frames,
            target,
            source,
            preset,
            workers,
            batch,
            json,
            metrics: print_metrics,
        } => {
            if let Some(workers) = workers {
                config.engine.worker_limit = workers;
            }
            if let Some(batch) = batch {
                config.engine.batch_hint = batch;
            }
            validate_config(&config).context("Configuration validation failed")?;

            let frame_refs = frames_in_dir(&frames)
                .with_context(|| format!("Failed to list frames in {:?}", frames))?;
            if frame_refs.is_empty() {
                bail!("No frames found in {:?}", frames);
            }

            let pipeline = Arc::new(build_pipeline(&config, &preset)?);
            let ctx = RuntimeContext::from_config(&config);
            let engine = WorkEngine::new(
                ctx.clone(),
                Arc::new(DiskFrameStore::new()) as Arc<dyn FrameStore>,
                config.engine.clone(),
            );
            let runner =
                PipelineRunner::new(engine).with_progress_logging(config.progress.log_interval());

            let mut run_target = RunTarget::new(target);
            if let Some(source) = source {
                run_target = run_target.with_source(source);
            }

            let stop = ctx.stop.clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing in-flight chunks");
                    stop.stop();
                }
            });

            let state = runner
                .run_video(pipeline, &run_target, frame_refs)
                .await
                .context("Run aborted")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                info!(
                    "{}: {} completed, {} failed, {} skipped",
                    state.status.as_str(),
                    state.completed_frames,
                    state.failed_frames,
                    state.skipped_frames
                );
            }

            if print_metrics {
                print!("{}", render_metrics()?);
            }
        }
    }

    Ok(())
}

/// Loads the given config file, or `frameflow.toml` if present, or defaults.
fn resolve_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => {
            info!("frameflow {}: no config file, using defaults", VERSION);
            return Ok(Config::default());
        }
    };

    info!("Loading configuration from {:?}", path);
    let config =
        load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))?;
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn build_pipeline(config: &Config, preset: &str) -> Result<frameflow_core::Pipeline> {
    let preset: PipelinePreset = preset.parse().context("Invalid preset")?;
    let ctx = StageBuildContext::new(config.assets.clone(), Arc::new(PassthroughLoader));
    StageRegistry::with_builtin()
        .build_preset(&preset, &ctx)
        .with_context(|| format!("Failed to build pipeline {}", preset))
}

fn render_metrics() -> Result<String> {
    use prometheus::{Encoder, Registry, TextEncoder};

    let registry = Registry::new();
    for metric in metrics::all_metrics() {
        registry
            .register(metric)
            .context("Failed to register metric")?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    Ok(String::from_utf8(buffer)?)
}
