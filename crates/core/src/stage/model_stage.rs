//! Stages backed by an externally loaded model.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::frame::{Frame, FrameContext, MediaKind};

use super::assets::{ensure_asset, ModelAsset};
use super::config::AssetConfig;
use super::error::{FrameError, StageError};
use super::traits::{FrameStage, RunTarget};

/// Which targets a model stage accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRule {
    ImageOrVideo,
    /// Also requires the run's source to be an image.
    ImageOrVideoWithImageSource,
}

/// A loaded model applying the actual transformation.
pub trait FrameModel: Send + Sync {
    fn apply(&self, ctx: &FrameContext, frame: &Frame) -> Result<Frame, FrameError>;

    /// Drops cached allocations, e.g. accelerator memory pools.
    fn release_cache(&self, _aggressive: bool) {}
}

/// Turns a model file into a [`FrameModel`].
pub trait ModelLoader: Send + Sync {
    fn load(&self, stage: &str, path: &Path) -> Result<Arc<dyn FrameModel>, StageError>;
}

/// A stage whose transformation is a lazily loaded model shared by all
/// workers.
pub struct ModelStage {
    name: String,
    asset: ModelAsset,
    rule: TargetRule,
    assets: AssetConfig,
    loader: Arc<dyn ModelLoader>,
    handle: Mutex<Option<Arc<dyn FrameModel>>>,
    loads: AtomicU64,
}

impl ModelStage {
    pub fn new(
        name: impl Into<String>,
        asset: ModelAsset,
        rule: TargetRule,
        assets: AssetConfig,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        Self {
            name: name.into(),
            asset,
            rule,
            assets,
            loader,
            handle: Mutex::new(None),
            loads: AtomicU64::new(0),
        }
    }

    pub fn asset(&self) -> &ModelAsset {
        &self.asset
    }

    pub fn rule(&self) -> TargetRule {
        self.rule
    }

    /// How many times the model has been loaded.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn is_loaded(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns the shared handle, loading it under the lock on first use.
    fn model(&self) -> Result<Arc<dyn FrameModel>, StageError> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = handle.as_ref() {
            return Ok(Arc::clone(model));
        }

        let path = self.asset.path_in(&self.assets);
        info!("Loading model for stage {} from {}", self.name, path.display());
        let model = self.loader.load(&self.name, &path)?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        *handle = Some(Arc::clone(&model));
        Ok(model)
    }
}

#[async_trait]
impl FrameStage for ModelStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre_check(&self) -> Result<(), StageError> {
        ensure_asset(&self.name, &self.asset, &self.assets).await?;
        Ok(())
    }

    async fn pre_start(&self, target: &RunTarget) -> Result<(), StageError> {
        if MediaKind::of(&target.target).is_none() {
            return Err(StageError::unsupported_target(
                &self.name,
                &target.target,
                "target must be an image or a video",
            ));
        }

        if self.rule == TargetRule::ImageOrVideoWithImageSource {
            match &target.source {
                Some(source) if MediaKind::is_image(source) => {}
                Some(source) => {
                    return Err(StageError::unsupported_target(
                        &self.name,
                        source,
                        "source must be an image",
                    ))
                }
                None => {
                    return Err(StageError::unsupported_target(
                        &self.name,
                        &target.target,
                        "a source image is required",
                    ))
                }
            }
        }

        Ok(())
    }

    fn process_frame(&self, ctx: &FrameContext, frame: &Frame) -> Result<Frame, FrameError> {
        let model = self
            .model()
            .map_err(|e| FrameError::transform(e.to_string()))?;
        model.apply(ctx, frame)
    }

    fn release_transient(&self, aggressive: bool) {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = handle.as_ref() {
            model.release_cache(aggressive);
        }
    }

    fn post_process(&self) {
        let released = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!("Released model for stage {}", self.name);
        }
    }
}

/// Loader whose models return frames unchanged. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughLoader;

struct PassthroughModel;

impl FrameModel for PassthroughModel {
    fn apply(&self, _ctx: &FrameContext, frame: &Frame) -> Result<Frame, FrameError> {
        Ok(frame.clone())
    }
}

impl ModelLoader for PassthroughLoader {
    fn load(&self, _stage: &str, _path: &Path) -> Result<Arc<dyn FrameModel>, StageError> {
        Ok(Arc::new(PassthroughModel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameRef;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
        fail: bool,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, stage: &str, _path: &Path) -> Result<Arc<dyn FrameModel>, StageError> {
            if self.fail {
                return Err(StageError::model_load(stage, "corrupt weights"));
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Arc::new(PassthroughModel))
        }
    }

    fn stage(rule: TargetRule, loader: Arc<dyn ModelLoader>) -> ModelStage {
        ModelStage::new(
            "test_stage",
            ModelAsset::new("test.onnx"),
            rule,
            AssetConfig::default(),
            loader,
        )
    }

    fn ctx() -> FrameContext {
        FrameContext::new(FrameRef::new(0, "0000.png"), None)
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let loader = Arc::new(CountingLoader::default());
        let stage = stage(TargetRule::ImageOrVideo, loader.clone());
        let frame = Frame::new(2, 2);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| stage.process_frame(&ctx(), &frame).unwrap());
            }
        });

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(stage.load_count(), 1);
    }

    #[test]
    fn test_post_process_is_idempotent() {
        let loader = Arc::new(CountingLoader::default());
        let stage = stage(TargetRule::ImageOrVideo, loader.clone());
        stage.process_frame(&ctx(), &Frame::new(1, 1)).unwrap();
        assert!(stage.is_loaded());

        stage.post_process();
        assert!(!stage.is_loaded());
        stage.post_process();
        assert!(!stage.is_loaded());
        assert_eq!(stage.load_count(), 1);

        // Next use reloads.
        stage.process_frame(&ctx(), &Frame::new(1, 1)).unwrap();
        assert_eq!(stage.load_count(), 2);
    }

    #[test]
    fn test_load_failure_is_frame_error() {
        let loader = Arc::new(CountingLoader {
            fail: true,
            ..Default::default()
        });
        let stage = stage(TargetRule::ImageOrVideo, loader);

        let err = stage.process_frame(&ctx(), &Frame::new(1, 1)).unwrap_err();
        assert!(!err.is_resource_exhaustion());
        assert!(!stage.is_loaded());
    }

    #[tokio::test]
    async fn test_pre_start_target_rules() {
        let plain = stage(TargetRule::ImageOrVideo, Arc::new(PassthroughLoader));
        assert!(plain.pre_start(&RunTarget::new("clip.MP4")).await.is_ok());
        assert!(plain.pre_start(&RunTarget::new("photo.png")).await.is_ok());
        assert!(plain.pre_start(&RunTarget::new("notes.txt")).await.is_err());

        let swap = stage(
            TargetRule::ImageOrVideoWithImageSource,
            Arc::new(PassthroughLoader),
        );
        assert!(swap.pre_start(&RunTarget::new("clip.mp4")).await.is_err());
        assert!(swap
            .pre_start(&RunTarget::new("clip.mp4").with_source("face.mp4"))
            .await
            .is_err());
        assert!(swap
            .pre_start(&RunTarget::new("clip.mp4").with_source("face.jpg"))
            .await
            .is_ok());
    }
}
