//! Typed registry of named stages and pipeline presets.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::assets::ModelAsset;
use super::config::AssetConfig;
use super::error::RegistryError;
use super::model_stage::{ModelLoader, ModelStage, TargetRule};
use super::pipeline::Pipeline;
use super::traits::FrameStage;

pub const FACE_SWAPPER: &str = "face_swapper";
pub const FACE_ENHANCER: &str = "face_enhancer";
pub const PRE_FACE_ENHANCER: &str = "pre_face_enhancer";
pub const POST_FACE_ENHANCER: &str = "post_face_enhancer";

const SWAPPER_URL: &str = "https://huggingface.co/CountFloyd/deepfake/resolve/main/inswapper_128.onnx";
const ENHANCER_URL: &str =
    "https://github.com/TencentARC/GFPGAN/releases/download/v1.3.4/GFPGANv1.4.pth";

/// What factories get to build a stage.
#[derive(Clone)]
pub struct StageBuildContext {
    pub assets: AssetConfig,
    pub loader: Arc<dyn ModelLoader>,
}

impl StageBuildContext {
    pub fn new(assets: AssetConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self { assets, loader }
    }
}

type StageFactory = Box<dyn Fn(&StageBuildContext) -> Arc<dyn FrameStage> + Send + Sync>;

/// Maps stage names to factories.
pub struct StageRegistry {
    factories: BTreeMap<String, StageFactory>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl StageRegistry {
    /// A registry with no stages.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with the face swapper and the three enhancers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_model(
            FACE_SWAPPER,
            ModelAsset::new("inswapper_128.onnx").with_url(SWAPPER_URL),
            TargetRule::ImageOrVideoWithImageSource,
        );
        for name in [FACE_ENHANCER, PRE_FACE_ENHANCER, POST_FACE_ENHANCER] {
            registry.register_model(
                name,
                ModelAsset::new("GFPGANv1.4.pth").with_url(ENHANCER_URL),
                TargetRule::ImageOrVideo,
            );
        }
        registry
    }

    /// Registers a factory, replacing any previous one of the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&StageBuildContext) -> Arc<dyn FrameStage> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    fn register_model(&mut self, name: &'static str, asset: ModelAsset, rule: TargetRule) {
        self.register(name, move |ctx| {
            Arc::new(ModelStage::new(
                name,
                asset.clone(),
                rule,
                ctx.assets.clone(),
                Arc::clone(&ctx.loader),
            ))
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds a pipeline from stage names, in the given order.
    pub fn build<S: AsRef<str>>(
        &self,
        names: &[S],
        ctx: &StageBuildContext,
    ) -> Result<Pipeline, RegistryError> {
        let stages = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.factories
                    .get(name)
                    .map(|factory| factory(ctx))
                    .ok_or_else(|| RegistryError::UnknownStage {
                        name: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Pipeline::new(stages)
    }

    pub fn build_preset(
        &self,
        preset: &PipelinePreset,
        ctx: &StageBuildContext,
    ) -> Result<Pipeline, RegistryError> {
        self.build(&preset.stage_names(), ctx)
    }
}

/// Named stage lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelinePreset {
    /// pre_face_enhancer, face_swapper, post_face_enhancer
    Full,
    /// face_swapper, face_enhancer
    Basic,
    /// pre_face_enhancer, face_swapper
    PreOnly,
    /// face_swapper, post_face_enhancer
    PostOnly,
    SwapOnly,
    EnhanceOnly,
    Custom(Vec<String>),
}

impl PipelinePreset {
    pub const NAMED: [PipelinePreset; 6] = [
        Self::Full,
        Self::Basic,
        Self::PreOnly,
        Self::PostOnly,
        Self::SwapOnly,
        Self::EnhanceOnly,
    ];

    pub fn stage_names(&self) -> Vec<String> {
        let names: &[&str] = match self {
            Self::Full => &[PRE_FACE_ENHANCER, FACE_SWAPPER, POST_FACE_ENHANCER],
            Self::Basic => &[FACE_SWAPPER, FACE_ENHANCER],
            Self::PreOnly => &[PRE_FACE_ENHANCER, FACE_SWAPPER],
            Self::PostOnly => &[FACE_SWAPPER, POST_FACE_ENHANCER],
            Self::SwapOnly => &[FACE_SWAPPER],
            Self::EnhanceOnly => &[FACE_ENHANCER],
            Self::Custom(names) => return names.clone(),
        };
        names.iter().map(|s| s.to_string()).collect()
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Full => "full",
            Self::Basic => "basic",
            Self::PreOnly => "pre_only",
            Self::PostOnly => "post_only",
            Self::SwapOnly => "swap_only",
            Self::EnhanceOnly => "enhance_only",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for PipelinePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(names) => write!(f, "custom({})", names.join(",")),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for PipelinePreset {
    type Err = RegistryError;

    /// Parses a preset name, or a comma-separated list of stage names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let preset = match s {
            "full" => Self::Full,
            "basic" => Self::Basic,
            "pre_only" => Self::PreOnly,
            "post_only" => Self::PostOnly,
            "swap_only" => Self::SwapOnly,
            "enhance_only" => Self::EnhanceOnly,
            _ => {
                let names: Vec<String> = s
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(RegistryError::EmptyPipeline);
                }
                Self::Custom(names)
            }
        };
        Ok(preset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::PassthroughLoader;
    use crate::testing::{MockStage, StageLog};

    fn ctx() -> StageBuildContext {
        StageBuildContext::new(AssetConfig::default(), Arc::new(PassthroughLoader))
    }

    #[test]
    fn test_builtin_names() {
        let registry = StageRegistry::with_builtin();
        assert_eq!(
            registry.names(),
            vec![
                "face_enhancer",
                "face_swapper",
                "post_face_enhancer",
                "pre_face_enhancer"
            ]
        );
    }

    #[test]
    fn test_build_preserves_order() {
        let registry = StageRegistry::with_builtin();
        let pipeline = registry.build_preset(&PipelinePreset::Full, &ctx()).unwrap();
        assert_eq!(
            pipeline.names(),
            vec!["pre_face_enhancer", "face_swapper", "post_face_enhancer"]
        );
    }

    #[test]
    fn test_unknown_stage() {
        let registry = StageRegistry::with_builtin();
        let err = registry
            .build(&["face_swapper", "face_melter"], &ctx())
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownStage { name } if name == "face_melter"));
    }

    #[test]
    fn test_empty_name_list() {
        let registry = StageRegistry::with_builtin();
        let names: [&str; 0] = [];
        assert!(matches!(
            registry.build(&names, &ctx()),
            Err(RegistryError::EmptyPipeline)
        ));
    }

    #[test]
    fn test_custom_registration() {
        let log = StageLog::new();
        let mut registry = StageRegistry::empty();
        registry.register("mock", move |_| Arc::new(MockStage::new("mock", log.clone())));

        let pipeline = registry.build(&["mock", "mock"], &ctx()).unwrap();
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("full".parse::<PipelinePreset>().unwrap(), PipelinePreset::Full);
        assert_eq!(
            "pre_only".parse::<PipelinePreset>().unwrap().stage_names(),
            vec!["pre_face_enhancer", "face_swapper"]
        );
        assert_eq!(
            " pre_face_enhancer, face_swapper ".parse::<PipelinePreset>().unwrap(),
            PipelinePreset::Custom(vec![
                "pre_face_enhancer".to_string(),
                "face_swapper".to_string()
            ])
        );
        assert!(matches!(
            " , ".parse::<PipelinePreset>(),
            Err(RegistryError::EmptyPipeline)
        ));
    }

    #[test]
    fn test_named_presets_build() {
        let registry = StageRegistry::with_builtin();
        for preset in PipelinePreset::NAMED {
            assert!(registry.build_preset(&preset, &ctx()).is_ok(), "{}", preset);
        }
    }
}
