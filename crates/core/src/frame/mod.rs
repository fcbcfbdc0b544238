//! Frame identifiers, decoded buffers, and the frame-storage seam.
//!
//! Frames are extracted from a video by an external demuxer and live on disk
//! as still images. The core only ever sees them through [`FrameRef`]
//! identifiers and loads/stores their pixels through a [`FrameStore`].

mod error;
mod store;
mod types;

pub use error::StorageError;
pub use store::{frames_in_dir, DiskFrameStore, FrameStore};
pub use types::{Frame, FrameContext, FrameRef, MediaKind};
