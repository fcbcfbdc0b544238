//! Frame storage: loading decoded buffers from extracted frame files and
//! writing transformed buffers back in place.

use std::path::Path;

use super::error::StorageError;
use super::types::{Frame, FrameRef, MediaKind};

/// Storage collaborator that turns a [`FrameRef`] into pixels and back.
pub trait FrameStore: Send + Sync {
    /// Loads and decodes the frame.
    fn load(&self, frame: &FrameRef) -> Result<Frame, StorageError>;

    /// Encodes `buffer` and writes it to the frame's location.
    fn store(&self, frame: &FrameRef, buffer: &Frame) -> Result<(), StorageError>;
}

/// Frame store backed by image files on disk. The output format follows the
/// frame file's extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFrameStore;

impl DiskFrameStore {
    pub fn new() -> Self {
        Self
    }
}

impl FrameStore for DiskFrameStore {
    fn load(&self, frame: &FrameRef) -> Result<Frame, StorageError> {
        let path = frame.path();
        if !path.exists() {
            return Err(StorageError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let image = image::open(path).map_err(|e| StorageError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(image.to_rgb8())
    }

    fn store(&self, frame: &FrameRef, buffer: &Frame) -> Result<(), StorageError> {
        buffer.save(frame.path()).map_err(|e| StorageError::Encode {
            path: frame.path().to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Lists the extracted frames in `dir`, sorted by file name.
///
/// Only image files are returned. Indices follow the sorted order, which
/// matches the numbering an extractor such as ffmpeg writes (`%04d.png`).
pub fn frames_in_dir(dir: &Path) -> Result<Vec<FrameRef>, StorageError> {
    let entries = std::fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && MediaKind::is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| FrameRef::new(index, path))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    #[test]
    fn test_frames_in_dir_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["0002.png", "0000.png", "0001.jpg", "audio.wav", "list.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let frames = frames_in_dir(dir.path()).unwrap();
        let names: Vec<String> = frames
            .iter()
            .map(|f| f.path().file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["0000.png", "0001.jpg", "0002.png"]);
        assert_eq!(frames[2].index(), 2);
    }

    #[test]
    fn test_frames_in_missing_dir() {
        let result = frames_in_dir(Path::new("/nonexistent/frames"));
        assert!(matches!(result, Err(StorageError::Io { .. })));
    }

    #[test]
    fn test_disk_store_round_trip_in_place() {
        let dir = TempDir::new().unwrap();
        let frame = FrameRef::new(0, dir.path().join("0000.png"));
        let mut buffer = Frame::new(4, 3);
        buffer.put_pixel(1, 1, Rgb([10, 20, 30]));

        let store = DiskFrameStore::new();
        store.store(&frame, &buffer).unwrap();
        let loaded = store.load(&frame).unwrap();

        assert_eq!(loaded.dimensions(), (4, 3));
        assert_eq!(loaded.get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_disk_store_missing_frame() {
        let store = DiskFrameStore::new();
        let result = store.load(&FrameRef::new(0, "/nonexistent/0000.png"));
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn test_disk_store_undecodable_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0000.png");
        std::fs::write(&path, b"not a png").unwrap();

        let result = DiskFrameStore::new().load(&FrameRef::new(0, path));
        assert!(matches!(result, Err(StorageError::Decode { .. })));
    }
}
