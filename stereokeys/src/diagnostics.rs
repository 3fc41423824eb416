//! Visual diagnostics: annotated frames and periodic PNG dumps.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut};
use thiserror::Error;
use tracing::debug;

use crate::detector::Circle;
use crate::frame::{CameraId, Frame};

/// Outline colour of detected circles.
pub const CIRCLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Colour of the bottom point used for triangulation.
pub const BOTTOM_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("failed to create dump directory {}: {}", .path.display(), .source)]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Copy of `frame` with each circle outlined and its bottom point marked.
pub fn annotate(frame: &Frame, circles: &[Circle]) -> RgbImage {
    let mut out = frame.clone();
    for circle in circles {
        let center = (circle.x.round() as i32, circle.y.round() as i32);
        draw_hollow_circle_mut(&mut out, center, circle.r.round() as i32, CIRCLE_COLOR);
        let (bx, by) = circle.bottom();
        draw_cross_mut(&mut out, BOTTOM_COLOR, bx.round() as i32, by.round() as i32);
    }
    out
}

/// Writes annotated frames and detector masks every `every` ticks.
///
/// File names are `<tick>_<camera>.png` and `<tick>_<camera>_mask.png`.
#[derive(Debug, Clone)]
pub struct FrameDumper {
    dir: PathBuf,
    every: u32,
}

impl FrameDumper {
    /// `None` when dumping is disabled (`every == 0`).
    pub fn new(dir: impl Into<PathBuf>, every: u32) -> Result<Option<Self>, DumpError> {
        if every == 0 {
            return Ok(None);
        }
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| DumpError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Some(Self { dir, every }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn should_dump(&self, tick: u64) -> bool {
        tick % u64::from(self.every) == 0
    }

    /// Dump one camera's view of a tick. Returns the written paths.
    pub fn dump(
        &self,
        tick: u64,
        camera: CameraId,
        frame: &Frame,
        circles: &[Circle],
        mask: &GrayImage,
    ) -> Result<Vec<PathBuf>, DumpError> {
        let frame_path = self.dir.join(format!("{:08}_{}.png", tick, camera.name()));
        let mask_path = self.dir.join(format!("{:08}_{}_mask.png", tick, camera.name()));

        annotate(frame, circles)
            .save(&frame_path)
            .map_err(|source| DumpError::Write {
                path: frame_path.clone(),
                source,
            })?;
        mask.save(&mask_path).map_err(|source| DumpError::Write {
            path: mask_path.clone(),
            source,
        })?;

        debug!(tick, camera = %camera, dir = %self.dir.display(), "dumped diagnostics");
        Ok(vec![frame_path, mask_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_annotate_draws_outline() {
        let frame = RgbImage::new(40, 40);
        let out = annotate(&frame, &[Circle::new(20.0, 20.0, 8.0)]);
        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(*out.get_pixel(28, 20), CIRCLE_COLOR);
        assert_eq!(*out.get_pixel(20, 28), BOTTOM_COLOR);
        assert_eq!(*frame.get_pixel(28, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_without_circles_is_copy() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        assert_eq!(annotate(&frame, &[]), frame);
    }

    #[test]
    fn test_disabled_dumper() {
        let dir = TempDir::new().unwrap();
        assert!(FrameDumper::new(dir.path(), 0).unwrap().is_none());
    }

    #[test]
    fn test_dump_writes_pngs() {
        let dir = TempDir::new().unwrap();
        let dumper = FrameDumper::new(dir.path().join("dumps"), 5).unwrap().unwrap();
        assert!(dumper.should_dump(0));
        assert!(!dumper.should_dump(3));
        assert!(dumper.should_dump(10));

        let frame = RgbImage::new(16, 16);
        let mask = GrayImage::new(16, 16);
        let paths = dumper
            .dump(10, CameraId::Front, &frame, &[Circle::new(8.0, 8.0, 3.0)], &mask)
            .unwrap();
        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert!(path.exists());
        }
        assert!(paths[0].ends_with("00000010_front.png"));
    }
}
