//! Circle candidates and the horizontal merge pass.

/// A detected circular feature, in pixel coordinates of its frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

impl Circle {
    pub fn new(x: f32, y: f32, r: f32) -> Self {
        Self { x, y, r }
    }

    /// Leftmost x covered by the circle.
    pub fn left(&self) -> f32 {
        self.x - self.r
    }

    /// Rightmost x covered by the circle.
    pub fn right(&self) -> f32 {
        self.x + self.r
    }

    /// Lowest image point of the circle, used as the fingertip contact point.
    pub fn bottom(&self) -> (f32, f32) {
        (self.x, self.y + self.r)
    }
}

/// Collapse horizontally overlapping circles into the lowest one.
///
/// Circles are sorted ascending by `x`. Walking the sorted list, a circle
/// whose left edge is at or left of the current kept circle's right edge
/// replaces it only when it lies further down the image (larger `y`);
/// otherwise it starts a new kept circle. The result is ascending by `x`.
///
/// Only the current kept circle is compared, so a wide replacement may end
/// up overlapping an earlier kept circle. A sequence without horizontal
/// overlaps passes through unchanged.
pub fn merge_circles(mut circles: Vec<Circle>) -> Vec<Circle> {
    circles.sort_by(|a, b| a.x.total_cmp(&b.x));

    let mut kept: Vec<Circle> = Vec::with_capacity(circles.len());
    for circle in circles {
        match kept.last_mut() {
            Some(current) if circle.left() <= current.right() => {
                if circle.y > current.y {
                    *current = circle;
                }
            }
            _ => kept.push(circle),
        }
    }
    kept
}
