//! Detect command - run the finger detector on a single image.
//!
//! Prints the merged circles and, optionally, writes the detector mask and an
//! annotated copy of the input. Handy for tuning HSV ranges against saved
//! frames before running a session.

use std::path::PathBuf;

use stereokeys::config::ConfigFile;
use stereokeys::detector::FingerDetector;
use stereokeys::diagnostics::annotate;
use stereokeys::frame::CameraId;
use tracing::debug;

use crate::error::CliError;

/// Arguments for the detect command.
pub struct DetectArgs {
    pub image: PathBuf,
    pub camera: CameraId,
    /// Where to write the single-channel detector mask.
    pub mask: Option<PathBuf>,
    /// Where to write the input with circles drawn on it.
    pub annotate: Option<PathBuf>,
}

/// Run the detect command with the detector parameters from `config`.
pub fn run(args: DetectArgs, config: &ConfigFile) -> Result<(), CliError> {
    let frame = image::open(&args.image)
        .map_err(|source| CliError::Image {
            path: args.image.clone(),
            source,
        })?
        .to_rgb8();

    let detector = FingerDetector::new(args.camera, config.detector(args.camera).clone());
    let detection = detector.detect(&frame);
    debug!(camera = %args.camera, circles = detection.circles.len(), "Detection finished");

    println!(
        "{} camera: {} ({}x{})",
        args.camera,
        args.image.display(),
        frame.width(),
        frame.height()
    );
    if detection.circles.is_empty() {
        println!("  No fingertip found");
    }
    for (index, circle) in detection.circles.iter().enumerate() {
        let (bx, by) = circle.bottom();
        println!(
            "  #{}: center ({:.1}, {:.1}) radius {:.1}, contact ({:.1}, {:.1})",
            index, circle.x, circle.y, circle.r, bx, by
        );
    }

    if let Some(path) = &args.mask {
        detection.mask.save(path).map_err(|source| CliError::Image {
            path: path.clone(),
            source,
        })?;
        println!("Mask written to {}", path.display());
    }
    if let Some(path) = &args.annotate {
        annotate(&frame, &detection.circles)
            .save(path)
            .map_err(|source| CliError::Image {
                path: path.clone(),
                source,
            })?;
        println!("Annotated frame written to {}", path.display());
    }

    Ok(())
}
