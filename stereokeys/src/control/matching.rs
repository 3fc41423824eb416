//! Top/front fingertip pairing.
//!
//! Both cameras see the finger from angles that share the world x axis, so a
//! fingertip appears at roughly the same image x in both views. Each top
//! circle is paired with the front circle nearest in x; pairs further apart
//! than the threshold are discarded.
//!
//! Pairing carries no identity across ticks. With several fingers moving
//! quickly a top circle can pair with a different finger's front circle from
//! one tick to the next.

use crate::detector::Circle;
use crate::geometry::PixelPoint;

/// One top circle with the front circle it was paired with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerPair {
    pub top: Circle,
    pub front: Circle,
}

impl FingerPair {
    /// Bottom points of both circles, the inputs to triangulation.
    pub fn contact_points(&self) -> (PixelPoint, PixelPoint) {
        let point = |c: &Circle| {
            let (x, y) = c.bottom();
            PixelPoint::new(f64::from(x), f64::from(y))
        };
        (point(&self.top), point(&self.front))
    }
}

/// Front circle whose x is nearest to `x`. The first of equally near
/// circles wins.
pub fn nearest_by_x(x: f32, candidates: &[Circle]) -> Option<&Circle> {
    let mut best: Option<&Circle> = None;
    for candidate in candidates {
        let closer = match best {
            Some(b) => (candidate.x - x).abs() < (b.x - x).abs(),
            None => true,
        };
        if closer {
            best = Some(candidate);
        }
    }
    best
}

/// Pair every top circle with its nearest front circle, keeping pairs whose
/// x distance is within `threshold` (inclusive).
///
/// Pairs come out in the order of `top`. A front circle may be paired with
/// several top circles.
pub fn match_fingers(top: &[Circle], front: &[Circle], threshold: f32) -> Vec<FingerPair> {
    top.iter()
        .filter_map(|t| {
            let f = nearest_by_x(t.x, front)?;
            ((t.x - f.x).abs() <= threshold).then_some(FingerPair { top: *t, front: *f })
        })
        .collect()
}
