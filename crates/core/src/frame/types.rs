//! Core frame types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A decoded frame. Stages always receive and return RGB8 buffers.
pub type Frame = image::RgbImage;

/// Identifier of one extracted frame: its position in the video and the
/// file holding its pixels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameRef {
    index: usize,
    path: PathBuf,
}

impl FrameRef {
    /// Creates a frame reference.
    pub fn new(index: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
        }
    }

    /// Position of the frame in the source video.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Path of the frame file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.index, self.path.display())
    }
}

/// Context handed to a stage alongside each frame buffer.
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// The frame being transformed.
    pub frame: FrameRef,
    /// Source image for stages that need one (the face to swap in).
    pub source: Option<Arc<Path>>,
}

impl FrameContext {
    pub fn new(frame: FrameRef, source: Option<Arc<Path>>) -> Self {
        Self { frame, source }
    }
}

/// Coarse classification of a target file by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

impl MediaKind {
    /// Classifies a path by its extension, case-insensitively.
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn is_image(path: &Path) -> bool {
        Self::of(path) == Some(Self::Image)
    }
}
