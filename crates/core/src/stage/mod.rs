//! Pipeline stages: the stage contract, model-backed stages and the
//! registry that builds pipelines by name.

mod assets;
mod config;
mod error;
mod model_stage;
mod pipeline;
mod registry;
mod traits;

pub use assets::{ensure_asset, sha256_file, ModelAsset};
pub use config::AssetConfig;
pub use error::{FrameError, RegistryError, StageError};
pub use model_stage::{FrameModel, ModelLoader, ModelStage, PassthroughLoader, TargetRule};
pub use pipeline::Pipeline;
pub use registry::{
    PipelinePreset, StageBuildContext, StageRegistry, FACE_ENHANCER, FACE_SWAPPER,
    POST_FACE_ENHANCER, PRE_FACE_ENHANCER,
};
pub use traits::{ChunkReport, FrameStage, RunTarget};
