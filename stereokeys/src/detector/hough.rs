//! Gradient Hough circle transform.
//!
//! ```text
//!   grey frame ──► Canny edges ──► vote along ±gradient ──► local maxima
//!                                   (r = min..=max)             │
//!                                                               ▼
//!   circles ◄── radius histogram per centre ◄── min_dist filter
//! ```
//!
//! Each edge pixel votes for centres lying along its gradient direction at
//! every radius in range. Accumulator peaks above the vote threshold become
//! centre candidates, strongest first; each surviving centre takes the
//! radius supported by the most edge pixels.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use tracing::trace;

use super::circle::Circle;

/// Circle detector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    /// Inverse accumulator resolution (1 = same as the image).
    pub dp: f64,
    /// Minimum distance between detected centres, in pixels.
    pub min_dist: f64,
    /// Upper Canny threshold; the lower threshold is half of it.
    pub param1: f64,
    /// Accumulator vote threshold for centres and minimum edge support for
    /// radii.
    pub param2: f64,
    pub min_radius: u32,
    /// Zero means unbounded (the larger image dimension).
    pub max_radius: u32,
}

struct EdgePoint {
    x: f64,
    y: f64,
}

/// Detect circles in a single-channel image.
///
/// Returned circles are ordered by accumulator strength, strongest first.
pub fn hough_circles(image: &GrayImage, params: &HoughParams) -> Vec<Circle> {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let dp = params.dp.max(1.0);
    let min_radius = params.min_radius.max(1);
    // No circle centred in the image has a radius past its diagonal.
    let diagonal = f64::from(width).hypot(f64::from(height)).ceil() as u32;
    let max_radius = if params.max_radius == 0 {
        width.max(height)
    } else {
        params.max_radius.min(diagonal)
    };
    if max_radius < min_radius {
        trace!(min_radius, max_radius, "Empty radius range");
        return Vec::new();
    }

    let high = params.param1.max(1.0) as f32;
    let edges = canny(image, high / 2.0, high);
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);

    let acc_w = (width as f64 / dp).ceil() as usize;
    let acc_h = (height as f64 / dp).ceil() as usize;
    let mut accumulator = vec![0u32; acc_w * acc_h];
    let mut points = Vec::new();

    for (x, y, edge) in edges.enumerate_pixels() {
        if edge[0] == 0 {
            continue;
        }
        let vx = gx.get_pixel(x, y)[0] as f64;
        let vy = gy.get_pixel(x, y)[0] as f64;
        let magnitude = (vx * vx + vy * vy).sqrt();
        if magnitude == 0.0 {
            continue;
        }
        let (dx, dy) = (vx / magnitude, vy / magnitude);
        points.push(EdgePoint {
            x: x as f64,
            y: y as f64,
        });

        for sign in [1.0, -1.0] {
            let mut last_cell = None;
            for r in min_radius..=max_radius {
                let cx = x as f64 + sign * dx * r as f64;
                let cy = y as f64 + sign * dy * r as f64;
                if cx < 0.0 || cy < 0.0 {
                    break;
                }
                let (ax, ay) = ((cx / dp) as usize, (cy / dp) as usize);
                if ax >= acc_w || ay >= acc_h {
                    break;
                }
                let cell = ay * acc_w + ax;
                if last_cell != Some(cell) {
                    accumulator[cell] += 1;
                    last_cell = Some(cell);
                }
            }
        }
    }

    let threshold = params.param2.max(0.0);
    let at = |ax: isize, ay: isize| -> u32 {
        if ax < 0 || ay < 0 || ax as usize >= acc_w || ay as usize >= acc_h {
            0
        } else {
            accumulator[ay as usize * acc_w + ax as usize]
        }
    };

    let mut centres: Vec<(u32, usize, usize)> = Vec::new();
    for ay in 0..acc_h {
        for ax in 0..acc_w {
            let votes = accumulator[ay * acc_w + ax];
            if (votes as f64) <= threshold {
                continue;
            }
            let (ix, iy) = (ax as isize, ay as isize);
            if votes > at(ix - 1, iy)
                && votes >= at(ix + 1, iy)
                && votes > at(ix, iy - 1)
                && votes >= at(ix, iy + 1)
            {
                centres.push((votes, ax, ay));
            }
        }
    }
    centres.sort_by(|a, b| b.0.cmp(&a.0));
    trace!(edge_points = points.len(), centres = centres.len(), "Hough accumulator scanned");

    let min_dist_sq = params.min_dist.max(0.0).powi(2);
    let mut circles: Vec<Circle> = Vec::new();

    for (_, ax, ay) in centres {
        let cx = (ax as f64 + 0.5) * dp;
        let cy = (ay as f64 + 0.5) * dp;

        let too_close = circles.iter().any(|c| {
            let (ddx, ddy) = (c.x as f64 - cx, c.y as f64 - cy);
            ddx * ddx + ddy * ddy < min_dist_sq
        });
        if too_close {
            continue;
        }

        if let Some((radius, support)) = best_radius(&points, cx, cy, min_radius, max_radius) {
            if support as f64 >= threshold {
                circles.push(Circle::new(cx as f32, cy as f32, radius as f32));
            }
        }
    }
    circles
}

/// Radius with the most edge support around a centre, with its support
/// count. The radius is the mean distance of the supporting points.
fn best_radius(
    points: &[EdgePoint],
    cx: f64,
    cy: f64,
    min_radius: u32,
    max_radius: u32,
) -> Option<(f64, usize)> {
    let bins = (max_radius - min_radius + 1) as usize;
    let mut counts = vec![0usize; bins];
    let mut sums = vec![0f64; bins];

    for p in points {
        let d = ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt();
        let bin = d.round();
        if bin < min_radius as f64 || bin > max_radius as f64 {
            continue;
        }
        let idx = bin as usize - min_radius as usize;
        counts[idx] += 1;
        sums[idx] += d;
    }

    let (idx, &count) = counts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;
    if count == 0 {
        return None;
    }
    Some((sums[idx] / count as f64, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    fn params() -> HoughParams {
        HoughParams {
            dp: 1.0,
            min_dist: 8.0,
            param1: 100.0,
            param2: 8.0,
            min_radius: 4,
            max_radius: 16,
        }
    }

    fn disc_image(discs: &[(i32, i32, i32)]) -> GrayImage {
        let mut img = GrayImage::new(96, 64);
        for &(x, y, r) in discs {
            draw_filled_circle_mut(&mut img, (x, y), r, Luma([200]));
        }
        img
    }

    #[test]
    fn test_blank_image_has_no_circles() {
        let img = GrayImage::new(64, 64);
        assert!(hough_circles(&img, &params()).is_empty());
    }

    #[test]
    fn test_tiny_image_has_no_circles() {
        let img = GrayImage::new(2, 2);
        assert!(hough_circles(&img, &params()).is_empty());
    }

    #[test]
    fn test_finds_single_disc() {
        let img = disc_image(&[(40, 30, 10)]);
        let circles = hough_circles(&img, &params());
        assert!(!circles.is_empty());

        let best = circles[0];
        assert!((best.x - 40.0).abs() <= 2.0, "x = {}", best.x);
        assert!((best.y - 30.0).abs() <= 2.0, "y = {}", best.y);
        assert!((best.r - 10.0).abs() <= 2.0, "r = {}", best.r);
    }

    #[test]
    fn test_finds_two_separate_discs() {
        let img = disc_image(&[(20, 30, 8), (70, 30, 8)]);
        let circles = hough_circles(&img, &params());
        assert!(circles.iter().any(|c| (c.x - 20.0).abs() <= 2.0));
        assert!(circles.iter().any(|c| (c.x - 70.0).abs() <= 2.0));
    }

    #[test]
    fn test_min_dist_suppresses_neighbouring_centres() {
        let img = disc_image(&[(40, 30, 10)]);
        let circles = hough_circles(&img, &HoughParams { min_dist: 30.0, ..params() });
        for (i, a) in circles.iter().enumerate() {
            for b in circles.iter().skip(i + 1) {
                let d = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                assert!(d >= 30.0);
            }
        }
    }

    #[test]
    fn test_inverted_radius_range_is_empty() {
        let img = disc_image(&[(40, 30, 10)]);
        let circles = hough_circles(
            &img,
            &HoughParams {
                min_radius: 20,
                max_radius: 10,
                ..params()
            },
        );
        assert!(circles.is_empty());
    }

    #[test]
    fn test_unbounded_max_radius_is_capped_at_diagonal() {
        let img = disc_image(&[(40, 30, 10)]);
        let circles = hough_circles(
            &img,
            &HoughParams {
                max_radius: u32::MAX,
                ..params()
            },
        );
        let best = circles.first().expect("disc found");
        assert!((best.x - 40.0).abs() <= 2.0, "x = {}", best.x);
        assert!((best.y - 30.0).abs() <= 2.0, "y = {}", best.y);
        assert!((best.r - 10.0).abs() <= 2.0, "r = {}", best.r);
    }
}
