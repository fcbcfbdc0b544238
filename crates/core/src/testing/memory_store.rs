//! In-memory frame storage for testing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::frame::{Frame, FrameRef, FrameStore, StorageError};

/// Frame store backed by a map. Frames are 2x2 black RGB buffers unless
/// inserted otherwise.
#[derive(Debug, Default)]
pub struct MemoryFrameStore {
    frames: Mutex<BTreeMap<PathBuf, Frame>>,
}

impl MemoryFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `count` blank frames with indices `0..count`.
    pub fn with_frames(count: usize) -> Self {
        let store = Self::new();
        for index in 0..count {
            store.insert(&Self::frame_ref(index), Frame::new(2, 2));
        }
        store
    }

    /// The reference used for frame `index`.
    pub fn frame_ref(index: usize) -> FrameRef {
        FrameRef::new(index, format!("frame_{:04}.png", index))
    }

    pub fn insert(&self, frame: &FrameRef, buffer: Frame) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(frame.path().to_path_buf(), buffer);
    }

    /// References of all stored frames, in index order.
    pub fn frame_refs(&self) -> Vec<FrameRef> {
        (0..self.len()).map(Self::frame_ref).collect()
    }

    pub fn get(&self, index: usize) -> Option<Frame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(Self::frame_ref(index).path())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameStore for MemoryFrameStore {
    fn load(&self, frame: &FrameRef) -> Result<Frame, StorageError> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(frame.path())
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                path: frame.path().to_path_buf(),
            })
    }

    fn store(&self, frame: &FrameRef, buffer: &Frame) -> Result<(), StorageError> {
        self.insert(frame, buffer.clone());
        Ok(())
    }
}
