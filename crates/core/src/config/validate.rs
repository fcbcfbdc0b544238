use super::{types::Config, ConfigError};
use crate::engine::MAX_BACKPRESSURE_PAUSE_SECONDS;

/// Validate configuration
/// Currently validates:
/// - worker_limit, batch_hint and max_chunk_multiplier are positive
/// - memory thresholds lie strictly inside (0, 1), normal below high
/// - backpressure pause is finite, not negative and at most an hour
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let engine = &config.engine;
    if engine.worker_limit == 0 {
        return Err(invalid("engine.worker_limit must be positive"));
    }
    if engine.batch_hint == 0 {
        return Err(invalid("engine.batch_hint must be positive"));
    }
    if engine.max_chunk_multiplier == 0 {
        return Err(invalid("engine.max_chunk_multiplier must be positive"));
    }
    if !engine.backpressure_pause_seconds.is_finite() || engine.backpressure_pause_seconds < 0.0 {
        return Err(invalid(
            "engine.backpressure_pause_seconds must be a non-negative number",
        ));
    }
    if engine.backpressure_pause_seconds > MAX_BACKPRESSURE_PAUSE_SECONDS {
        return Err(ConfigError::ValidationError(format!(
            "engine.backpressure_pause_seconds must be at most {}, got {}",
            MAX_BACKPRESSURE_PAUSE_SECONDS, engine.backpressure_pause_seconds
        )));
    }

    let memory = &config.memory;
    for (name, value) in [
        ("memory.threshold_normal", memory.threshold_normal),
        ("memory.threshold_high", memory.threshold_high),
        (
            "memory.accelerator_threshold_high",
            memory.accelerator_threshold_high,
        ),
    ] {
        if !(value > 0.0 && value < 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between 0 and 1 (exclusive), got {}",
                name, value
            )));
        }
    }
    if memory.threshold_normal >= memory.threshold_high {
        return Err(invalid(
            "memory.threshold_normal must be below memory.threshold_high",
        ));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
