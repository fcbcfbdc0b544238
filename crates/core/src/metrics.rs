//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Frames and stages (outcomes per frame and per stage)
//! - Engine (chunk sizes, chunk results, backpressure)
//! - Memory (pressure readings, cleanup requests)
//! - Runs (duration by status)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Frames
// =============================================================================

/// Frames finished, by outcome.
pub static FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("frameflow_frames_total", "Total frames finished"),
        &["outcome"], // "completed", "failed"
    )
    .unwrap()
});

/// Stage completions, by stage and outcome.
pub static STAGE_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "frameflow_stage_events_total",
            "Total stage completions per frame",
        ),
        &["stage", "outcome"], // outcome: "succeeded", "failed", "skipped"
    )
    .unwrap()
});

// =============================================================================
// Engine
// =============================================================================

/// Frames per dispatched chunk.
pub static CHUNK_SIZE: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("frameflow_chunk_size", "Frames per dispatched chunk")
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
    )
    .unwrap()
});

/// Chunks finished, by result.
pub static CHUNKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("frameflow_chunks_total", "Total chunks finished"),
        &["result"], // "completed", "exhausted", "crashed"
    )
    .unwrap()
});

/// Dispatch pauses caused by sustained high memory pressure.
pub static BACKPRESSURE_PAUSES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "frameflow_backpressure_pauses_total",
        "Total dispatch pauses under sustained memory pressure",
    )
    .unwrap()
});

// =============================================================================
// Memory
// =============================================================================

/// Memory samples, by pressure level.
pub static MEMORY_PRESSURE: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "frameflow_memory_pressure_total",
            "Memory samples by pressure level",
        ),
        &["level"], // "low", "normal", "high"
    )
    .unwrap()
});

/// Cleanup requests, by mode.
pub static CLEANUP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "frameflow_cleanup_requests_total",
            "Total memory cleanup requests",
        ),
        &["mode"], // "standard", "aggressive"
    )
    .unwrap()
});

// =============================================================================
// Runs
// =============================================================================

/// Run duration in seconds, by final status.
pub static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("frameflow_run_duration_seconds", "Duration of video runs")
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Frames
        Box::new(FRAMES_TOTAL.clone()),
        Box::new(STAGE_EVENTS.clone()),
        // Engine
        Box::new(CHUNK_SIZE.clone()),
        Box::new(CHUNKS_TOTAL.clone()),
        Box::new(BACKPRESSURE_PAUSES.clone()),
        // Memory
        Box::new(MEMORY_PRESSURE.clone()),
        Box::new(CLEANUP_REQUESTS.clone()),
        // Runs
        Box::new(RUN_DURATION.clone()),
    ]
}
