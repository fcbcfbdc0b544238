//! Ordered composition of stages.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::frame::{FrameRef, FrameStore};
use crate::memory::Reclaimer;
use crate::progress::FrameEvent;

use super::error::{RegistryError, StageError};
use super::traits::{run_chunk, ChunkReport, FrameStage, RunTarget};

/// A non-empty, ordered list of stages applied to every frame.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn FrameStage>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.names())
            .finish()
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn FrameStage>>) -> Result<Self, RegistryError> {
        if stages.is_empty() {
            return Err(RegistryError::EmptyPipeline);
        }
        Ok(Self { stages })
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Arc<dyn FrameStage>] {
        &self.stages
    }

    /// Runs every stage's asset check in order, stopping at the first error.
    pub async fn pre_check(&self) -> Result<(), StageError> {
        for stage in &self.stages {
            debug!("Pre-checking stage {}", stage.name());
            stage.pre_check().await?;
        }
        Ok(())
    }

    /// Validates the target against every stage in order.
    pub async fn pre_start(&self, target: &RunTarget) -> Result<(), StageError> {
        for stage in &self.stages {
            stage.pre_start(target).await?;
        }
        Ok(())
    }

    /// Applies the full pipeline to each frame of a chunk.
    pub fn process_frames(
        &self,
        source: Option<&Arc<Path>>,
        store: &dyn FrameStore,
        frames: &[FrameRef],
        on_progress: &mut dyn FnMut(FrameEvent),
    ) -> ChunkReport {
        let stages: Vec<&dyn FrameStage> = self.stages.iter().map(|s| s.as_ref()).collect();
        run_chunk(stages.as_slice(), source, store, frames, on_progress)
    }

    pub fn post_process(&self) {
        for stage in &self.stages {
            stage.post_process();
        }
        info!("Released resources of {} stage(s)", self.stages.len());
    }
}

impl Reclaimer for Pipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn reclaim(&self, aggressive: bool) {
        for stage in &self.stages {
            stage.release_transient(aggressive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryFrameStore, MockStage, StageLog};

    fn pipeline(log: &StageLog, a: MockStage) -> Pipeline {
        let stages: Vec<Arc<dyn FrameStage>> =
            vec![Arc::new(a), Arc::new(MockStage::new("b", log.clone()))];
        Pipeline::new(stages).unwrap()
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        assert!(matches!(
            Pipeline::new(Vec::new()),
            Err(RegistryError::EmptyPipeline)
        ));
    }

    #[test]
    fn test_stage_order_per_frame() {
        let log = StageLog::new();
        let pipeline = pipeline(&log, MockStage::new("a", log.clone()));
        let store = MemoryFrameStore::with_frames(3);
        let frames = store.frame_refs();

        let report = pipeline.process_frames(None, &store, &frames, &mut |_| {});
        assert_eq!(report.completed.len(), 3);
        for frame in &frames {
            assert_eq!(log.stages_for(frame.index()), vec!["a", "b"]);
        }
        assert_eq!(pipeline.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_pre_check_stops_at_first_failure() {
        let log = StageLog::new();
        let pipeline = pipeline(&log, MockStage::new("a", log.clone()).failing_pre_check());

        let err = pipeline.pre_check().await.unwrap_err();
        assert_eq!(err.stage(), "a");
    }

    #[tokio::test]
    async fn test_pre_start_reports_stage() {
        let log = StageLog::new();
        let pipeline = pipeline(&log, MockStage::new("a", log.clone()).failing_pre_start());

        let err = pipeline
            .pre_start(&RunTarget::new("clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::UnsupportedTarget { .. }));
    }

    #[test]
    fn test_reclaim_reaches_stages() {
        let log = StageLog::new();
        let a = Arc::new(MockStage::new("a", log.clone()));
        let pipeline = Pipeline::new(vec![a.clone() as Arc<dyn FrameStage>]).unwrap();

        pipeline.reclaim(true);
        assert_eq!(a.release_calls(), 1);
    }
}
