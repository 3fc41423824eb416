//! Image filters used by the finger detector.
//!
//! The bilateral filter and the per-channel colour opening are implemented
//! here. The single-channel opening and the median blur come from
//! `imageproc`.

use image::{GrayImage, RgbImage};
use imageproc::morphology::{grayscale_open, Mask};
use rayon::prelude::*;

/// Largest bilateral neighbourhood diameter, also applied when the
/// diameter is derived from `sigma_space`.
pub const MAX_BILATERAL_DIAMETER: i32 = 64;

/// Edge-preserving smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilateralParams {
    /// Neighbourhood diameter in pixels. Non-positive values derive the
    /// diameter from `sigma_space`.
    pub diameter: i32,
    pub sigma_color: f64,
    pub sigma_space: f64,
}

/// Reflect an out-of-range coordinate back into `[0, len)` without
/// repeating the border sample (`gfedcb|abcdefgh|gfedcba`).
fn reflect101(mut i: i64, len: i64) -> usize {
    if len <= 1 {
        return 0;
    }
    while i < 0 || i >= len {
        i = if i < 0 { -i } else { 2 * len - 2 - i };
    }
    i as usize
}

/// Bilateral filter over a 3-channel image.
///
/// Colour distance is the sum of absolute channel differences; spatial
/// weights cover a disc of radius `diameter / 2`. Rows are filtered in
/// parallel.
pub fn bilateral_filter(src: &RgbImage, params: &BilateralParams) -> RgbImage {
    let (width, height) = src.dimensions();
    if width == 0 || height == 0 {
        return src.clone();
    }

    let sigma_color = if params.sigma_color > 0.0 {
        params.sigma_color
    } else {
        1.0
    };
    let sigma_space = if params.sigma_space > 0.0 {
        params.sigma_space
    } else {
        1.0
    };
    let radius = if params.diameter <= 0 {
        (sigma_space * 1.5).round() as i64
    } else {
        params.diameter as i64 / 2
    }
    .clamp(1, i64::from(MAX_BILATERAL_DIAMETER / 2));

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let color_weight: Vec<f32> = (0..3 * 256)
        .map(|i| ((i * i) as f64 * color_coeff).exp() as f32)
        .collect();

    let mut kernel: Vec<(i64, i64, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist_sq = (dx * dx + dy * dy) as f64;
            if dist_sq.sqrt() > radius as f64 {
                continue;
            }
            kernel.push((dx, dy, (dist_sq * space_coeff).exp() as f32));
        }
    }

    let (w, h) = (width as i64, height as i64);
    let stride = width as usize * 3;
    let input = src.as_raw();

    let mut out = RgbImage::new(width, height);
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for x in 0..width as usize {
            let centre = &input[y * stride + x * 3..y * stride + x * 3 + 3];
            let mut sum = [0f32; 3];
            let mut weight_sum = 0f32;

            for &(dx, dy, space_weight) in &kernel {
                let sx = reflect101(x as i64 + dx, w);
                let sy = reflect101(y as i64 + dy, h);
                let offset = sy * stride + sx * 3;
                let sample = &input[offset..offset + 3];

                let diff: usize = (0..3)
                    .map(|c| (sample[c] as i32 - centre[c] as i32).unsigned_abs() as usize)
                    .sum();
                let weight = space_weight * color_weight[diff];

                for c in 0..3 {
                    sum[c] += sample[c] as f32 * weight;
                }
                weight_sum += weight;
            }

            for c in 0..3 {
                row[x * 3 + c] = (sum[c] / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

#[derive(Debug, Clone, Copy)]
enum MorphOp {
    Erode,
    Dilate,
}

impl MorphOp {
    fn pick(self, a: u8, b: u8) -> u8 {
        match self {
            MorphOp::Erode => a.min(b),
            MorphOp::Dilate => a.max(b),
        }
    }
}

/// One 3x3 min/max pass, done as a horizontal then vertical sweep.
/// Samples outside the image are ignored.
fn morph_pass(data: &[u8], width: usize, height: usize, channels: usize, op: MorphOp) -> Vec<u8> {
    let stride = width * channels;
    let mut horizontal = data.to_vec();
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let idx = y * stride + x * channels + c;
                let mut v = data[idx];
                if x > 0 {
                    v = op.pick(v, data[idx - channels]);
                }
                if x + 1 < width {
                    v = op.pick(v, data[idx + channels]);
                }
                horizontal[idx] = v;
            }
        }
    }

    let mut out = horizontal.clone();
    for y in 0..height {
        for i in 0..stride {
            let idx = y * stride + i;
            let mut v = horizontal[idx];
            if y > 0 {
                v = op.pick(v, horizontal[idx - stride]);
            }
            if y + 1 < height {
                v = op.pick(v, horizontal[idx + stride]);
            }
            out[idx] = v;
        }
    }
    out
}

/// Per-channel opening of a colour image with a 3x3 rectangle:
/// `iterations` erosions followed by `iterations` dilations.
pub fn open_rgb(src: &RgbImage, iterations: u32) -> RgbImage {
    if iterations == 0 {
        return src.clone();
    }
    let (width, height) = (src.width() as usize, src.height() as usize);

    let mut data = src.as_raw().clone();
    for _ in 0..iterations {
        data = morph_pass(&data, width, height, 3, MorphOp::Erode);
    }
    for _ in 0..iterations {
        data = morph_pass(&data, width, height, 3, MorphOp::Dilate);
    }

    let mut out = src.clone();
    out.copy_from_slice(&data);
    out
}

/// Grey-level opening equivalent to `iterations` 3x3 erosions followed by
/// as many dilations. Values are kept, not thresholded.
pub fn open_gray(src: &GrayImage, iterations: u32) -> GrayImage {
    if iterations == 0 {
        return src.clone();
    }
    // Repeated 3x3 passes compose into one square of radius `iterations`.
    let radius = iterations.min(u32::from(u8::MAX)) as u8;
    grayscale_open(src, &Mask::square(radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 5), 3);
        assert_eq!(reflect101(-7, 1), 0);
    }

    #[test]
    fn test_bilateral_keeps_flat_image() {
        let img = RgbImage::from_pixel(12, 9, Rgb([40, 80, 120]));
        let params = BilateralParams {
            diameter: 5,
            sigma_color: 30.0,
            sigma_space: 5.0,
        };
        let out = bilateral_filter(&img, &params);
        assert_eq!(out, img);
    }

    #[test]
    fn test_bilateral_preserves_strong_edge() {
        let img = RgbImage::from_fn(10, 4, |x, _| {
            if x < 5 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let params = BilateralParams {
            diameter: 5,
            sigma_color: 10.0,
            sigma_space: 5.0,
        };
        let out = bilateral_filter(&img, &params);
        assert!(out.get_pixel(4, 2)[0] < 10);
        assert!(out.get_pixel(5, 2)[0] > 245);
    }

    #[test]
    fn test_bilateral_smooths_small_noise() {
        let mut img = RgbImage::from_pixel(9, 9, Rgb([100, 100, 100]));
        img.put_pixel(4, 4, Rgb([110, 110, 110]));
        let params = BilateralParams {
            diameter: 5,
            sigma_color: 50.0,
            sigma_space: 5.0,
        };
        let out = bilateral_filter(&img, &params);
        assert!(out.get_pixel(4, 4)[0] < 110);
    }

    #[test]
    fn test_open_removes_isolated_pixel() {
        let mut img = GrayImage::new(7, 7);
        img.put_pixel(3, 3, Luma([255]));
        let out = open_gray(&img, 1);
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_open_keeps_large_blob() {
        let img = GrayImage::from_fn(9, 9, |x, y| {
            if (2..7).contains(&x) && (2..7).contains(&y) {
                Luma([200])
            } else {
                Luma([0])
            }
        });
        let out = open_gray(&img, 1);
        assert_eq!(out, img);
    }

    #[test]
    fn test_open_zero_iterations_is_identity() {
        let mut img = GrayImage::new(3, 3);
        img.put_pixel(1, 1, Luma([9]));
        assert_eq!(open_gray(&img, 0), img);
    }

    #[test]
    fn test_open_rgb_per_channel() {
        let mut img = RgbImage::from_pixel(7, 7, Rgb([50, 50, 50]));
        img.put_pixel(3, 3, Rgb([255, 50, 50]));
        let out = open_rgb(&img, 1);
        assert_eq!(*out.get_pixel(3, 3), Rgb([50, 50, 50]));
    }

    #[test]
    fn test_open_gray_keeps_levels() {
        let img = GrayImage::from_fn(9, 9, |x, y| {
            if (2..7).contains(&x) && (2..7).contains(&y) {
                Luma([137])
            } else {
                Luma([0])
            }
        });
        let out = open_gray(&img, 1);
        assert_eq!(out.get_pixel(4, 4)[0], 137);
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 137));
    }

    #[test]
    fn test_open_gray_matches_repeated_3x3_passes() {
        let img = GrayImage::from_fn(15, 11, |x, y| Luma([((x * 37 + y * 91) % 251) as u8]));
        let (w, h) = (15, 11);
        let mut data = img.as_raw().clone();
        for op in [MorphOp::Erode, MorphOp::Erode, MorphOp::Dilate, MorphOp::Dilate] {
            data = morph_pass(&data, w, h, 1, op);
        }
        assert_eq!(open_gray(&img, 2).into_raw(), data);
    }

    #[test]
    fn test_bilateral_huge_diameter_is_bounded() {
        let img = RgbImage::from_pixel(6, 5, Rgb([40, 80, 120]));
        let params = BilateralParams {
            diameter: i32::MAX,
            sigma_color: 30.0,
            sigma_space: 5.0,
        };
        assert_eq!(bilateral_filter(&img, &params), img);
    }
}
