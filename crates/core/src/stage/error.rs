//! Error types for pipeline stages.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised before any frame is dispatched.
#[derive(Debug, Error)]
pub enum StageError {
    /// A required asset is missing and could not be fetched.
    #[error("Stage {stage}: asset unavailable: {reason}")]
    AssetUnavailable { stage: String, reason: String },

    /// The target cannot be handled by this stage.
    #[error("Stage {stage}: unsupported target {path}: {reason}")]
    UnsupportedTarget {
        stage: String,
        path: PathBuf,
        reason: String,
    },

    /// The stage's model could not be loaded.
    #[error("Stage {stage}: failed to load model: {reason}")]
    ModelLoad { stage: String, reason: String },
}

impl StageError {
    pub fn asset_unavailable(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AssetUnavailable {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_target(
        stage: impl Into<String>,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedTarget {
            stage: stage.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn model_load(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Name of the stage that raised the error.
    pub fn stage(&self) -> &str {
        match self {
            Self::AssetUnavailable { stage, .. }
            | Self::UnsupportedTarget { stage, .. }
            | Self::ModelLoad { stage, .. } => stage,
        }
    }
}

/// Per-frame errors. Always contained to the frame that raised them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The transformation failed for this frame.
    #[error("Transformation failed: {reason}")]
    Transform { reason: String },

    /// The transformation ran out of memory or another bounded resource.
    #[error("Resource exhausted: {reason}")]
    ResourceExhausted { reason: String },
}

impl FrameError {
    pub fn transform(reason: impl Into<String>) -> Self {
        Self::Transform {
            reason: reason.into(),
        }
    }

    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            reason: reason.into(),
        }
    }

    /// Whether the engine should shrink chunks and reclaim memory.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}

/// Errors building a pipeline from stage names.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown stage: {name}")]
    UnknownStage { name: String },

    #[error("Pipeline has no stages")]
    EmptyPipeline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_exhaustion_classification() {
        assert!(FrameError::resource_exhausted("out of memory").is_resource_exhaustion());
        assert!(!FrameError::transform("no face").is_resource_exhaustion());
    }

    #[test]
    fn test_stage_error_names_stage() {
        let err = StageError::asset_unavailable("face_swapper", "404");
        assert_eq!(err.stage(), "face_swapper");
        assert_eq!(
            err.to_string(),
            "Stage face_swapper: asset unavailable: 404"
        );
    }
}
