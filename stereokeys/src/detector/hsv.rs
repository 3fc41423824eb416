//! HSV colour-range filtering.
//!
//! Hue is measured in degrees `[0, 360)`, saturation in `[0, 1]` and value in
//! `[0, 255]`. A hue window whose upper bound exceeds 360 wraps through red:
//!
//! ```text
//!   h_min = 350, h_max = 370
//!
//!   0 ──[valid)──── 10 ─────────────── 350 ──[valid)── 360
//! ```

use image::{GrayImage, Luma, RgbImage};

/// Hue range covered by the cross value, matching the tuning range of the
/// hue bounds.
const HUE_CROSS_SPAN: f32 = 720.0;

/// A pixel in HSV space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

impl Hsv {
    /// Convert an 8-bit RGB sample.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let diff = max - min;

        let s = if max > 0.0 { diff / max } else { 0.0 };
        let h = if diff == 0.0 {
            0.0
        } else if max == r {
            60.0 * (g - b) / diff
        } else if max == g {
            120.0 + 60.0 * (b - r) / diff
        } else {
            240.0 + 60.0 * (r - g) / diff
        };
        let h = if h < 0.0 { h + 360.0 } else { h };

        Self { h, s, v: max }
    }
}

/// Inclusive HSV acceptance window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HsvRange {
    pub h_min: f32,
    pub h_max: f32,
    pub s_min: f32,
    pub s_max: f32,
    pub v_min: f32,
    pub v_max: f32,
}

impl HsvRange {
    /// Whether the hue window wraps past 360 degrees.
    pub fn wraps(&self) -> bool {
        self.h_max > 360.0
    }

    /// Hue test with wraparound: `[h_min, 360) ∪ [0, h_max - 360)` when the
    /// window wraps, `[h_min, h_max]` otherwise.
    pub fn hue_passes(&self, h: f32) -> bool {
        if self.wraps() {
            (h >= self.h_min && h < 360.0) || (h >= 0.0 && h < self.h_max - 360.0)
        } else {
            h >= self.h_min && h <= self.h_max
        }
    }

    pub fn contains(&self, pixel: Hsv) -> bool {
        self.hue_passes(pixel.h)
            && pixel.s >= self.s_min
            && pixel.s <= self.s_max
            && pixel.v >= self.v_min
            && pixel.v <= self.v_max
    }

    /// Grey level written for a passing pixel: its hue, unwrapped into the
    /// window, scaled onto `[1, 255]`.
    fn cross_value(&self, h: f32) -> u8 {
        let unwrapped = if self.wraps() && h < self.h_min {
            h + 360.0
        } else {
            h
        };
        (unwrapped / HUE_CROSS_SPAN * 255.0).round().clamp(1.0, 255.0) as u8
    }
}

/// Binary HSV mask crossed with the hue channel.
///
/// Pixels outside `range` become 0; pixels inside carry their hue as a
/// non-zero grey level.
pub fn hue_cross(src: &RgbImage, range: &HsvRange) -> GrayImage {
    let mut out = GrayImage::new(src.width(), src.height());
    for (x, y, pixel) in src.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let hsv = Hsv::from_rgb(r, g, b);
        if range.contains(hsv) {
            out.put_pixel(x, y, Luma([range.cross_value(hsv.h)]));
        }
    }
    out
}
