//! Frame acquisition.
//!
//! A [`FrameSource`] yields one [`FramePair`] per tick. Sources are opened
//! once at startup and validated with [`self_test`] before the control loop
//! starts; a source that cannot produce correctly sized frames is fatal.
//!
//! A configured source value picks the per-camera feed:
//!
//! ```text
//!   "0", "2"                 ─► DeviceCamera (/dev/video0, /dev/video2)
//!   dir, file, glob pattern  ─► ImageSequence (replayed in name order, looped)
//! ```
//!
//! Two feeds advanced together make a [`CameraPairSource`]. Other sources:
//!
//! - [`MemoryFrameSource`]: frames held in memory.
//! - [`crate::transport::UdpFrameReceiver`]: frame pairs from a remote
//!   capture host.

#[cfg(feature = "v4l2")]
mod device;
mod sequence;

#[cfg(feature = "v4l2")]
pub use device::DeviceCamera;
pub use sequence::ImageSequence;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::frame::{CameraId, Frame, FramePair};
use crate::transport::TransportError;

/// Frames grabbed by [`self_test`]; only the last is checked, giving the
/// device time to settle.
pub const SELF_TEST_FRAMES: usize = 3;

/// Frame acquisition failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open {camera} source {}: {}", .path.display(), .reason)]
    Open {
        camera: CameraId,
        path: PathBuf,
        reason: String,
    },

    #[error("{camera} source {} contains no frames", .path.display())]
    Empty { camera: CameraId, path: PathBuf },

    #[error("failed to read frame {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to use {camera} camera device {index}: {source}")]
    Device {
        camera: CameraId,
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("{camera} camera delivers unsupported pixel format {format}")]
    Format { camera: CameraId, format: String },

    #[error("failed to decode {camera} camera frame: {reason}")]
    Decode { camera: CameraId, reason: String },

    #[error("{camera} frame is {}x{}, expected {}x{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    Resolution {
        camera: CameraId,
        actual: (u32, u32),
        expected: (u32, u32),
    },

    #[error("no frame pair within {0:?}")]
    Timeout(Duration),

    #[error("frame source exhausted")]
    Exhausted,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Produces synchronized frame pairs.
pub trait FrameSource: Send {
    /// Block until the next pair is available.
    fn grab(&mut self) -> Result<FramePair, CaptureError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn grab(&mut self) -> Result<FramePair, CaptureError> {
        (**self).grab()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Frames from one camera.
pub trait CameraFeed: Send {
    fn camera(&self) -> CameraId;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    fn describe(&self) -> String;
}

/// What a configured source value refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Camera device index.
    Device(usize),
    /// Directory, image file or glob pattern.
    Files(String),
}

impl SourceSpec {
    /// A value made only of digits is a device index; anything else is a
    /// path or pattern.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.parse::<usize>() {
            Ok(index) if trimmed.bytes().all(|b| b.is_ascii_digit()) => SourceSpec::Device(index),
            _ => SourceSpec::Files(value.to_string()),
        }
    }
}

/// Open the feed for one camera.
pub fn open_feed(camera: CameraId, value: &str, width: u32, height: u32) -> Result<Box<dyn CameraFeed>, CaptureError> {
    match SourceSpec::parse(value) {
        SourceSpec::Files(source) => Ok(Box::new(ImageSequence::open(camera, &source)?)),
        SourceSpec::Device(index) => open_device(camera, index, width, height),
    }
}

#[cfg(feature = "v4l2")]
fn open_device(camera: CameraId, index: usize, width: u32, height: u32) -> Result<Box<dyn CameraFeed>, CaptureError> {
    Ok(Box::new(DeviceCamera::open(camera, index, width, height)?))
}

#[cfg(not(feature = "v4l2"))]
fn open_device(camera: CameraId, index: usize, _width: u32, _height: u32) -> Result<Box<dyn CameraFeed>, CaptureError> {
    Err(CaptureError::Open {
        camera,
        path: PathBuf::from(index.to_string()),
        reason: "camera devices need the `v4l2` feature".to_string(),
    })
}

/// Top and front feeds grabbed together.
pub struct CameraPairSource {
    top: Box<dyn CameraFeed>,
    front: Box<dyn CameraFeed>,
}

impl CameraPairSource {
    pub fn new(top: Box<dyn CameraFeed>, front: Box<dyn CameraFeed>) -> Self {
        Self { top, front }
    }

    /// Open both cameras from their configured source values.
    pub fn open(top: &str, front: &str, width: u32, height: u32) -> Result<Self, CaptureError> {
        Ok(Self::new(
            open_feed(CameraId::Top, top, width, height)?,
            open_feed(CameraId::Front, front, width, height)?,
        ))
    }
}

impl FrameSource for CameraPairSource {
    fn grab(&mut self) -> Result<FramePair, CaptureError> {
        let top = self.top.next_frame()?;
        let front = self.front.next_frame()?;
        Ok(FramePair::new(top, front))
    }

    fn describe(&self) -> String {
        format!("top: {}, front: {}", self.top.describe(), self.front.describe())
    }
}

impl std::fmt::Debug for CameraPairSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraPairSource")
            .field("top", &self.top.describe())
            .field("front", &self.front.describe())
            .finish()
    }
}

/// Check a pair against the session resolution.
pub fn check_resolution(pair: &FramePair, width: u32, height: u32) -> Result<(), CaptureError> {
    match pair.mismatched_camera(width, height) {
        Some(camera) => Err(CaptureError::Resolution {
            camera,
            actual: pair.get(camera).dimensions(),
            expected: (width, height),
        }),
        None => Ok(()),
    }
}

/// Grab [`SELF_TEST_FRAMES`] pairs and require the last to match the
/// session resolution.
pub fn self_test(source: &mut dyn FrameSource, width: u32, height: u32) -> Result<(), CaptureError> {
    let mut last = None;
    for attempt in 1..=SELF_TEST_FRAMES {
        last = Some(source.grab()?);
        debug!(source = %source.describe(), attempt, "Self-test frame grabbed");
    }
    if let Some(pair) = last {
        check_resolution(&pair, width, height)?;
    }
    info!(source = %source.describe(), width, height, "Capture self-test passed");
    Ok(())
}

/// Frame pairs held in memory.
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    pairs: Vec<FramePair>,
    next: usize,
    looping: bool,
}

impl MemoryFrameSource {
    /// Replays `pairs` forever.
    pub fn looping(pairs: Vec<FramePair>) -> Self {
        Self {
            pairs,
            next: 0,
            looping: true,
        }
    }

    /// Replays `pairs` once, then reports [`CaptureError::Exhausted`].
    pub fn once(pairs: Vec<FramePair>) -> Self {
        Self {
            pairs,
            next: 0,
            looping: false,
        }
    }
}

impl FrameSource for MemoryFrameSource {
    fn grab(&mut self) -> Result<FramePair, CaptureError> {
        if self.pairs.is_empty() {
            return Err(CaptureError::Exhausted);
        }
        if self.next >= self.pairs.len() {
            if !self.looping {
                return Err(CaptureError::Exhausted);
            }
            self.next = 0;
        }
        let pair = self.pairs[self.next].clone();
        self.next += 1;
        Ok(pair)
    }

    fn describe(&self) -> String {
        format!("memory ({} pairs)", self.pairs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn pair(w: u32, h: u32) -> FramePair {
        FramePair::new(RgbImage::new(w, h), RgbImage::new(w, h))
    }

    #[test]
    fn test_self_test_passes_on_matching_frames() {
        let mut source = MemoryFrameSource::looping(vec![pair(64, 48)]);
        assert!(self_test(&mut source, 64, 48).is_ok());
    }

    #[test]
    fn test_self_test_checks_last_frame_only() {
        let mut source = MemoryFrameSource::once(vec![pair(10, 10), pair(10, 10), pair(64, 48)]);
        assert!(self_test(&mut source, 64, 48).is_ok());
    }

    #[test]
    fn test_self_test_rejects_wrong_resolution() {
        let mut source = MemoryFrameSource::looping(vec![pair(320, 240)]);
        let err = self_test(&mut source, 640, 480).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Resolution {
                camera: CameraId::Top,
                actual: (320, 240),
                expected: (640, 480),
            }
        ));
        assert!(err.to_string().contains("320x240"));
    }

    #[test]
    fn test_self_test_propagates_grab_failure() {
        let mut source = MemoryFrameSource::once(vec![pair(64, 48)]);
        assert!(matches!(
            self_test(&mut source, 64, 48),
            Err(CaptureError::Exhausted)
        ));
    }

    #[test]
    fn test_memory_source_loops() {
        let mut source = MemoryFrameSource::looping(vec![pair(1, 1), pair(2, 2)]);
        let widths: Vec<u32> = (0..5).map(|_| source.grab().unwrap().top.width()).collect();
        assert_eq!(widths, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn test_empty_memory_source() {
        let mut source = MemoryFrameSource::looping(Vec::new());
        assert!(matches!(source.grab(), Err(CaptureError::Exhausted)));
    }

    #[test]
    fn test_source_spec_parse() {
        assert_eq!(SourceSpec::parse("0"), SourceSpec::Device(0));
        assert_eq!(SourceSpec::parse(" 2 "), SourceSpec::Device(2));
        assert_eq!(SourceSpec::parse("+1"), SourceSpec::Files("+1".to_string()));
        assert_eq!(
            SourceSpec::parse("frames/top"),
            SourceSpec::Files("frames/top".to_string())
        );
        assert_eq!(SourceSpec::parse("0*.png"), SourceSpec::Files("0*.png".to_string()));
    }

    #[cfg(not(feature = "v4l2"))]
    #[test]
    fn test_device_index_without_camera_support() {
        let err = open_feed(CameraId::Front, "1", 640, 480).err().expect("opening a device index should fail");
        assert!(matches!(err, CaptureError::Open { camera: CameraId::Front, .. }));
        assert!(err.to_string().contains("v4l2"));
    }

    #[test]
    fn test_pair_source_from_directories() {
        let top = tempfile::TempDir::new().unwrap();
        let front = tempfile::TempDir::new().unwrap();
        image::RgbImage::from_pixel(8, 6, image::Rgb([5, 0, 0]))
            .save(top.path().join("0.png"))
            .unwrap();
        image::RgbImage::from_pixel(8, 6, image::Rgb([6, 0, 0]))
            .save(front.path().join("0.png"))
            .unwrap();

        let mut source = CameraPairSource::open(
            top.path().to_str().unwrap(),
            front.path().to_str().unwrap(),
            8,
            6,
        )
        .unwrap();
        let pair = source.grab().unwrap();
        assert_eq!(pair.top.get_pixel(0, 0)[0], 5);
        assert_eq!(pair.front.get_pixel(0, 0)[0], 6);
        assert!(source.describe().starts_with("top: files"));
        assert!(self_test(&mut source, 8, 6).is_ok());
    }

    #[test]
    fn test_boxed_source() {
        let mut source: Box<dyn FrameSource> = Box::new(MemoryFrameSource::looping(vec![pair(3, 2)]));
        assert_eq!(source.grab().unwrap().front.dimensions(), (3, 2));
        assert!(source.describe().contains("memory"));
    }
}
