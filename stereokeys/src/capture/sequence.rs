//! Recorded frames replayed from disk.

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::{debug, info};

use super::{CameraFeed, CaptureError};
use crate::frame::{CameraId, Frame};

/// Frames for one camera, replayed in file-name order and looped at the end
/// like a reopened video file.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    camera: CameraId,
    origin: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

fn is_image(path: &Path) -> bool {
    path.is_file() && ImageFormat::from_path(path).is_ok()
}

fn is_pattern(source: &str) -> bool {
    source.contains(['*', '?', '['])
}

impl ImageSequence {
    /// Open a directory of images, a single image, or a glob pattern.
    pub fn open(camera: CameraId, source: &str) -> Result<Self, CaptureError> {
        let origin = PathBuf::from(source);
        let open_error = |reason: String| CaptureError::Open {
            camera,
            path: origin.clone(),
            reason,
        };

        let mut files: Vec<PathBuf> = if is_pattern(source) {
            glob::glob(source)
                .map_err(|e| open_error(e.to_string()))?
                .filter_map(Result::ok)
                .filter(|p| is_image(p))
                .collect()
        } else if origin.is_dir() {
            fs::read_dir(&origin)
                .map_err(|e| open_error(e.to_string()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .collect()
        } else if origin.is_file() {
            vec![origin.clone()]
        } else {
            return Err(open_error("no such file or directory".to_string()));
        };
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::Empty {
                camera,
                path: origin,
            });
        }
        info!(camera = %camera, source, frames = files.len(), "Image sequence opened");
        Ok(Self {
            camera,
            origin,
            files,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Load the next frame, wrapping to the first after the last.
    pub fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.next >= self.files.len() {
            debug!(camera = %self.camera, "Image sequence looped");
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;
        let image = image::open(path).map_err(|source| CaptureError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(image.to_rgb8())
    }
}

impl CameraFeed for ImageSequence {
    fn camera(&self) -> CameraId {
        self.camera
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        ImageSequence::next_frame(self)
    }

    fn describe(&self) -> String {
        format!("files {}", self.origin.display())
    }
}
