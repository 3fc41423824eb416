//! Startup failures.

use thiserror::Error;

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::diagnostics::DumpError;
use crate::geometry::GeometryError;
use crate::keyboard::KeyMapError;
use crate::transport::TransportError;

/// Conditions that keep the control loop from starting.
///
/// Once the loop runs, failures are handled per tick and never surface as
/// errors.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("camera setup failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("camera geometry rejected: {0}")]
    Geometry(#[from] GeometryError),

    #[error("key map unavailable: {0}")]
    KeyMap(#[from] KeyMapError),

    #[error("network setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("diagnostics setup failed: {0}")]
    Diagnostics(#[from] DumpError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CameraId;

    #[test]
    fn test_capture_error_wraps() {
        let err: StartupError = CaptureError::Resolution {
            camera: CameraId::Front,
            actual: (320, 240),
            expected: (640, 480),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "camera setup failed: front frame is 320x240, expected 640x480"
        );
    }
}
