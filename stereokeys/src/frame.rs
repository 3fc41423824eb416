//! Frame types shared by capture, detection and transport.
//!
//! A frame is a fixed-size grid of 8-bit RGB samples. Both cameras produce
//! one frame per tick; the pair travels together so that detection never
//! mixes captures from different ticks.

use image::RgbImage;

/// One camera frame.
pub type Frame = RgbImage;

/// Identifies which camera produced a frame.
///
/// The numeric value is the `capture_id` carried by frame records on the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraId {
    /// Top-down camera, tilted about the horizontal axis.
    Top = 0,
    /// Frontal camera, facing straight forward.
    Front = 1,
}

impl CameraId {
    /// Wire value for this camera.
    pub fn capture_id(self) -> u8 {
        self as u8
    }

    /// Parse a wire `capture_id`.
    pub fn from_capture_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CameraId::Top),
            1 => Some(CameraId::Front),
            _ => None,
        }
    }

    /// Lower-case name, used in log fields and config sections.
    pub fn name(self) -> &'static str {
        match self {
            CameraId::Top => "top",
            CameraId::Front => "front",
        }
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Frames captured from both cameras during the same tick.
#[derive(Debug, Clone)]
pub struct FramePair {
    pub top: Frame,
    pub front: Frame,
}

impl FramePair {
    pub fn new(top: Frame, front: Frame) -> Self {
        Self { top, front }
    }

    /// Frame for the given camera.
    pub fn get(&self, camera: CameraId) -> &Frame {
        match camera {
            CameraId::Top => &self.top,
            CameraId::Front => &self.front,
        }
    }

    /// Returns the camera whose frame is not `width` x `height`, if any.
    pub fn mismatched_camera(&self, width: u32, height: u32) -> Option<CameraId> {
        [CameraId::Top, CameraId::Front]
            .into_iter()
            .find(|&camera| self.get(camera).dimensions() != (width, height))
    }
}
