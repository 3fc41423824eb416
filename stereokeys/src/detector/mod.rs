//! Fingertip detection for one camera view.
//!
//! Each frame goes through a fixed filter chain ending in a circle
//! transform. The surviving circles are the fingertip candidates for that
//! camera in that tick.
//!
//! # Pipeline
//!
//! ```text
//!   RGB frame
//!     │ bilateral filter          (edge-preserving smoothing)
//!     │ opening × pre_morphology  (drop small colour noise)
//!     │ HSV window ⨯ hue          (single-channel nail mask)
//!     │ opening × nail_morphology
//!     │ median blur (odd kernel)
//!     ▼
//!   mask ──► Hough circles ──► merge_circles ──► ascending-by-x circles
//! ```
//!
//! Parameters are held per detector and replaced only between ticks via
//! [`FingerDetector::apply`]; a detection always runs with one consistent
//! parameter set.

mod circle;
mod filters;
mod hough;
mod hsv;

pub use circle::{merge_circles, Circle};
pub use filters::{bilateral_filter, open_gray, open_rgb, BilateralParams, MAX_BILATERAL_DIAMETER};
pub use hough::{hough_circles, HoughParams};
pub use hsv::{hue_cross, Hsv, HsvRange};

use image::GrayImage;
use imageproc::filter::median_filter;
use thiserror::Error;
use tracing::{trace, warn};

use crate::frame::{CameraId, Frame};

/// Largest opening iteration count, for either morphology step.
pub const MAX_MORPHOLOGY_ITERATIONS: u32 = 64;

/// Largest median kernel size.
pub const MAX_MEDIAN_KSIZE: u32 = 63;

/// A detector parameter the filters cannot run with.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{key} = {value}: {reason}")]
pub struct ParamError {
    /// Parameter name as written in the config file.
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

fn param_error(key: &'static str, value: impl ToString, reason: impl Into<String>) -> ParamError {
    ParamError {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn require_finite(key: &'static str, value: f64) -> Result<(), ParamError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(param_error(key, value, "must be a finite number"))
    }
}

/// Tunable parameters for one camera's detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParams {
    pub bilateral: BilateralParams,
    /// Opening iterations applied to the smoothed colour frame.
    pub pre_morphology_iterations: u32,
    pub hsv: HsvRange,
    /// Opening iterations applied to the single-channel mask.
    pub nail_morphology_iterations: u32,
    /// Median kernel size; forced odd.
    pub median_ksize: u32,
    pub hough: HoughParams,
}

impl DetectorParams {
    /// Defaults tuned for the top camera.
    pub fn top_default() -> Self {
        Self {
            bilateral: BilateralParams {
                diameter: 16,
                sigma_color: 72.0,
                sigma_space: 16.0,
            },
            pre_morphology_iterations: 5,
            hsv: HsvRange {
                h_min: 315.87,
                h_max: 356.36,
                s_min: 0.2992,
                s_max: 0.7049,
                v_min: 120.0,
                v_max: 255.0,
            },
            nail_morphology_iterations: 5,
            median_ksize: 13,
            hough: HoughParams {
                dp: 1.0,
                min_dist: 8.0,
                param1: 100.0,
                param2: 8.0,
                min_radius: 4,
                max_radius: 12,
            },
        }
    }

    /// Defaults tuned for the front camera. Only the colour window differs
    /// from the top camera.
    pub fn front_default() -> Self {
        Self {
            hsv: HsvRange {
                h_min: 356.33,
                h_max: 390.0,
                s_min: 0.1105,
                s_max: 0.3118,
                v_min: 199.0,
                v_max: 255.0,
            },
            ..Self::top_default()
        }
    }

    /// Defaults for the given camera.
    pub fn default_for(camera: CameraId) -> Self {
        match camera {
            CameraId::Top => Self::top_default(),
            CameraId::Front => Self::front_default(),
        }
    }

    /// Check that every parameter is usable on `width`x`height` frames.
    ///
    /// Values [`sanitized`](Self::sanitized) quietly corrects (an even median
    /// kernel, `dp` between 0 and 1) are accepted; values that would make a
    /// filter run without end or exhaust memory are not.
    pub fn check(&self, width: u32, height: u32) -> Result<(), ParamError> {
        let b = &self.bilateral;
        require_finite("bilateral_sigma_color", b.sigma_color)?;
        require_finite("bilateral_sigma_space", b.sigma_space)?;
        if b.diameter > MAX_BILATERAL_DIAMETER {
            return Err(param_error(
                "bilateral_d",
                b.diameter,
                format!("must be at most {}", MAX_BILATERAL_DIAMETER),
            ));
        }
        if b.diameter <= 0 && b.sigma_space * 3.0 > f64::from(MAX_BILATERAL_DIAMETER) {
            return Err(param_error(
                "bilateral_sigma_space",
                b.sigma_space,
                format!(
                    "derives a diameter above {} when bilateral_d is not positive",
                    MAX_BILATERAL_DIAMETER
                ),
            ));
        }

        for (key, iterations) in [
            ("pre_morphology", self.pre_morphology_iterations),
            ("nail_morphology", self.nail_morphology_iterations),
        ] {
            if iterations > MAX_MORPHOLOGY_ITERATIONS {
                return Err(param_error(
                    key,
                    iterations,
                    format!("must be at most {}", MAX_MORPHOLOGY_ITERATIONS),
                ));
            }
        }
        if self.median_ksize > MAX_MEDIAN_KSIZE {
            return Err(param_error(
                "median_ksize",
                self.median_ksize,
                format!("must be at most {}", MAX_MEDIAN_KSIZE),
            ));
        }

        let hsv = &self.hsv;
        for (key, value) in [
            ("h_min", hsv.h_min),
            ("h_max", hsv.h_max),
            ("s_min", hsv.s_min),
            ("s_max", hsv.s_max),
            ("v_min", hsv.v_min),
            ("v_max", hsv.v_max),
        ] {
            require_finite(key, f64::from(value))?;
        }

        let h = &self.hough;
        require_finite("dp", h.dp)?;
        if h.dp <= 0.0 {
            return Err(param_error("dp", h.dp, "must be positive"));
        }
        require_finite("min_dist", h.min_dist)?;
        require_finite("param1", h.param1)?;
        require_finite("param2", h.param2)?;

        let longest = width.max(height);
        if h.max_radius > longest {
            return Err(param_error(
                "max_radius",
                h.max_radius,
                format!("must not exceed the larger frame dimension ({})", longest),
            ));
        }
        if h.max_radius != 0 && h.min_radius > h.max_radius {
            return Err(param_error(
                "min_radius",
                h.min_radius,
                format!("must not exceed max_radius ({})", h.max_radius),
            ));
        }
        if h.min_radius > longest {
            return Err(param_error(
                "min_radius",
                h.min_radius,
                format!("must not exceed the larger frame dimension ({})", longest),
            ));
        }
        Ok(())
    }

    /// Correct values the filters cannot use, warning for each change.
    ///
    /// `dp` and `min_dist` below 1 are raised to 1 and an even median kernel
    /// grows by one. Kernel sizes and iteration counts above their limits
    /// are lowered to the limit. Canny and accumulator thresholds pass
    /// through as-is.
    pub fn sanitized(mut self, camera: CameraId) -> Self {
        if self.bilateral.diameter > MAX_BILATERAL_DIAMETER {
            warn!(
                camera = %camera,
                diameter = self.bilateral.diameter,
                "Bilateral diameter too large, clamping"
            );
            self.bilateral.diameter = MAX_BILATERAL_DIAMETER;
        }
        for iterations in [
            &mut self.pre_morphology_iterations,
            &mut self.nail_morphology_iterations,
        ] {
            if *iterations > MAX_MORPHOLOGY_ITERATIONS {
                warn!(camera = %camera, iterations = *iterations, "Opening iterations too large, clamping");
                *iterations = MAX_MORPHOLOGY_ITERATIONS;
            }
        }
        if self.median_ksize > MAX_MEDIAN_KSIZE {
            warn!(
                camera = %camera,
                ksize = self.median_ksize,
                "Median kernel size too large, clamping"
            );
            self.median_ksize = MAX_MEDIAN_KSIZE;
        }
        if self.median_ksize % 2 == 0 {
            warn!(
                camera = %camera,
                ksize = self.median_ksize,
                "Median kernel size must be odd, incrementing"
            );
            self.median_ksize += 1;
        }
        if self.hough.dp.is_nan() || self.hough.dp < 1.0 {
            warn!(camera = %camera, dp = self.hough.dp, "Circle dp below 1, clamping");
            self.hough.dp = 1.0;
        }
        if self.hough.min_dist.is_nan() || self.hough.min_dist < 1.0 {
            warn!(
                camera = %camera,
                min_dist = self.hough.min_dist,
                "Circle min_dist below 1, clamping"
            );
            self.hough.min_dist = 1.0;
        }
        self
    }
}

/// Result of one detection pass.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Merged circles, ascending by `x`. Empty when no fingertip is visible.
    pub circles: Vec<Circle>,
    /// Clean single-channel frame the circles were found in.
    pub mask: GrayImage,
}

/// Detector for one camera.
///
/// `detect` takes `&self`, so both cameras' detectors can run concurrently
/// without sharing mutable state.
#[derive(Debug, Clone)]
pub struct FingerDetector {
    camera: CameraId,
    params: DetectorParams,
}

impl FingerDetector {
    pub fn new(camera: CameraId, params: DetectorParams) -> Self {
        Self {
            camera,
            params: params.sanitized(camera),
        }
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Replace the parameter set. Must only be called between ticks.
    pub fn apply(&mut self, params: DetectorParams) {
        self.params = params.sanitized(self.camera);
    }

    /// Run the full pipeline on one frame.
    pub fn detect(&self, frame: &Frame) -> Detection {
        let p = &self.params;

        let smoothed = bilateral_filter(frame, &p.bilateral);
        let opened = open_rgb(&smoothed, p.pre_morphology_iterations);
        let crossed = hue_cross(&opened, &p.hsv);
        let cleaned = open_gray(&crossed, p.nail_morphology_iterations);

        let radius = p.median_ksize / 2;
        let mask = if radius > 0 {
            median_filter(&cleaned, radius, radius)
        } else {
            cleaned
        };

        let raw = hough_circles(&mask, &p.hough);
        let raw_count = raw.len();
        let circles = merge_circles(raw);
        trace!(
            camera = %self.camera,
            raw = raw_count,
            merged = circles.len(),
            "Fingertip candidates"
        );

        Detection { circles, mask }
    }
}
