//! Error types for frame storage.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`FrameStore`](super::FrameStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The frame file does not exist.
    #[error("Frame not found: {path}")]
    NotFound { path: PathBuf },

    /// The frame file could not be decoded.
    #[error("Failed to decode frame {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// The frame buffer could not be encoded back to disk.
    #[error("Failed to encode frame {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    /// I/O error while listing or copying frames.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
