//! Stereo triangulation from the top and front cameras.
//!
//! Both cameras are modelled as ideal pinholes. The front camera looks
//! straight along the world z axis; the top camera sits above it, tilted
//! about the horizontal (x) axis. Each camera's fingertip pixel defines a
//! ray, and the rays' projections on the Y-Z plane are intersected to get
//! the fingertip's height and depth:
//!
//! ```text
//!          y
//!          │   top ●
//!          │        \  y = a_top·z + b_top
//!          │         \
//!          │  front ●─┼──────────  y = a_front·z + b_front
//!          │           \
//!          └────────────●─────────── z
//!                    (y*, z*)
//! ```
//!
//! `x` comes from the top camera's horizontal ray evaluated at `z*`.
//! Everything derived from the geometry is computed once in
//! [`SpaceConverter::new`]; conversion itself is pure.

use thiserror::Error;

/// Slopes closer than this are treated as parallel.
const PARALLEL_EPSILON: f64 = 1e-9;

/// A point in real-world millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RealPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A pixel coordinate in a camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Physical camera setup for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraGeometry {
    /// Top camera position in mm.
    pub top_position: RealPosition,
    /// Front camera position in mm.
    pub front_position: RealPosition,
    /// Top camera rotation about the horizontal axis, in degrees.
    pub top_angle_x_deg: f64,
    /// Diagonal field of view shared by both cameras, in degrees.
    pub fov_diagonal_deg: f64,
    /// Sensor width and height in mm.
    pub sensor_size: (f64, f64),
    /// Frame width and height in pixels.
    pub image_size: (u32, u32),
}

impl Default for CameraGeometry {
    fn default() -> Self {
        Self {
            top_position: RealPosition::new(0.0, 207.0, 264.0),
            front_position: RealPosition::new(0.0, 37.0, 350.0),
            top_angle_x_deg: 31.1,
            fov_diagonal_deg: 64.0,
            sensor_size: (3.60, 2.70),
            image_size: (640, 480),
        }
    }
}

/// Rejected camera geometry.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("diagonal field of view must be in (0, 180) degrees, got {0}")]
    FieldOfView(f64),

    #[error("sensor size must be positive, got {0} x {1} mm")]
    SensorSize(f64, f64),

    #[error("image size must be non-zero, got {0} x {1}")]
    ImageSize(u32, u32),

    #[error("camera geometry contains a non-finite value")]
    NonFinite,
}

/// Converts paired fingertip pixels into a real-world position.
#[derive(Debug, Clone)]
pub struct SpaceConverter {
    top_position: RealPosition,
    front_position: RealPosition,
    top_angle_x: f64,
    /// Half horizontal and half vertical field of view, in radians.
    half_fov: (f64, f64),
    half_image: (f64, f64),
}

impl SpaceConverter {
    /// Derive the per-session constants from the camera geometry.
    ///
    /// The focal length follows from the sensor diagonal and the diagonal
    /// field of view; the half angles follow from the focal length and
    /// each sensor side.
    pub fn new(geometry: &CameraGeometry) -> Result<Self, GeometryError> {
        let (sensor_w, sensor_h) = geometry.sensor_size;
        let (image_w, image_h) = geometry.image_size;
        let fov = geometry.fov_diagonal_deg;

        let values = [
            geometry.top_position.x,
            geometry.top_position.y,
            geometry.top_position.z,
            geometry.front_position.x,
            geometry.front_position.y,
            geometry.front_position.z,
            geometry.top_angle_x_deg,
            fov,
            sensor_w,
            sensor_h,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        if fov <= 0.0 || fov >= 180.0 {
            return Err(GeometryError::FieldOfView(fov));
        }
        if sensor_w <= 0.0 || sensor_h <= 0.0 {
            return Err(GeometryError::SensorSize(sensor_w, sensor_h));
        }
        if image_w == 0 || image_h == 0 {
            return Err(GeometryError::ImageSize(image_w, image_h));
        }

        let sensor_diagonal = sensor_w.hypot(sensor_h);
        let focal_length = sensor_diagonal / (fov.to_radians() / 2.0).tan() / 2.0;
        let half_fov = (
            (sensor_w / focal_length / 2.0).atan(),
            (sensor_h / focal_length / 2.0).atan(),
        );

        Ok(Self {
            top_position: geometry.top_position,
            front_position: geometry.front_position,
            top_angle_x: geometry.top_angle_x_deg.to_radians(),
            half_fov,
            half_image: (image_w as f64 / 2.0, image_h as f64 / 2.0),
        })
    }

    /// Half horizontal and vertical field of view in radians.
    pub fn half_fov(&self) -> (f64, f64) {
        self.half_fov
    }

    fn snorm(&self, pixel: PixelPoint) -> (f64, f64) {
        (
            (pixel.x - self.half_image.0) / self.half_image.0,
            (pixel.y - self.half_image.1) / self.half_image.1,
        )
    }

    /// Triangulate one fingertip from its top and front pixels.
    ///
    /// Returns `None` when the two Y-Z rays are parallel (no unique
    /// intersection) or the result is not finite.
    pub fn convert(&self, top: PixelPoint, front: PixelPoint) -> Option<RealPosition> {
        let (top_sx, top_sy) = self.snorm(top);
        let (_, front_sy) = self.snorm(front);

        // The top camera's image is mirrored horizontally.
        let top_angle_h = -top_sx * self.half_fov.0;
        let top_angle_v = top_sy * self.half_fov.1 + self.top_angle_x;
        let front_angle_v = front_sy * self.half_fov.1;

        let a_top = top_angle_v.tan();
        let b_top = self.top_position.y - a_top * self.top_position.z;
        let a_front = front_angle_v.tan();
        let b_front = self.front_position.y - a_front * self.front_position.z;

        let denominator = a_top - a_front;
        if !denominator.is_finite() || denominator.abs() < PARALLEL_EPSILON {
            return None;
        }
        let z = (b_front - b_top) / denominator;
        let y = a_top * z + b_top;

        let a_xz = top_angle_h.tan();
        let b_xz = self.top_position.x - a_xz * self.top_position.z;
        let x = a_xz * z + b_xz;

        let position = RealPosition::new(x, y, z);
        (x.is_finite() && y.is_finite() && z.is_finite()).then_some(position)
    }

    /// Project a real-world point into ideal top and front pixel
    /// coordinates, the inverse of [`convert`](Self::convert).
    ///
    /// Returns `None` when the point lies in a camera's z plane.
    pub fn project(&self, point: RealPosition) -> Option<(PixelPoint, PixelPoint)> {
        let top = self.top_position;
        let front = self.front_position;
        let (dz_top, dz_front) = (point.z - top.z, point.z - front.z);
        if dz_top.abs() < PARALLEL_EPSILON || dz_front.abs() < PARALLEL_EPSILON {
            return None;
        }

        let top_angle_v = ((point.y - top.y) / dz_top).atan();
        let top_angle_h = ((point.x - top.x) / dz_top).atan();
        let front_angle_v = ((point.y - front.y) / dz_front).atan();
        let front_angle_h = ((point.x - front.x) / dz_front).atan();

        let top_sx = -top_angle_h / self.half_fov.0;
        let top_sy = (top_angle_v - self.top_angle_x) / self.half_fov.1;
        let front_sx = front_angle_h / self.half_fov.0;
        let front_sy = front_angle_v / self.half_fov.1;

        let to_pixel = |sx: f64, sy: f64| {
            PixelPoint::new(
                sx * self.half_image.0 + self.half_image.0,
                sy * self.half_image.1 + self.half_image.1,
            )
        };
        Some((to_pixel(top_sx, top_sy), to_pixel(front_sx, front_sy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> SpaceConverter {
        SpaceConverter::new(&CameraGeometry::default()).unwrap()
    }

    fn assert_close(a: RealPosition, b: RealPosition) {
        let tol = 1e-6 * (1.0 + b.x.abs().max(b.y.abs()).max(b.z.abs()));
        assert!((a.x - b.x).abs() < tol, "x: {} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < tol, "y: {} vs {}", a.y, b.y);
        assert!((a.z - b.z).abs() < tol, "z: {} vs {}", a.z, b.z);
    }

    #[test]
    fn test_half_fov_from_default_geometry() {
        let (h, v) = converter().half_fov();
        // 3.6 x 2.7 mm sensor, 64 degree diagonal.
        assert!((h.to_degrees() - 26.5).abs() < 0.5, "h = {}", h.to_degrees());
        assert!((v.to_degrees() - 20.5).abs() < 0.5, "v = {}", v.to_degrees());
    }

    #[test]
    fn test_round_trip_default_geometry() {
        let c = converter();
        let point = RealPosition::new(12.0, 10.0, 200.0);
        let (top, front) = c.project(point).unwrap();
        assert_close(c.convert(top, front).unwrap(), point);
    }

    #[test]
    fn test_centre_pixels_follow_optical_axes() {
        let c = converter();
        let centre = PixelPoint::new(320.0, 240.0);
        let p = c.convert(centre, centre).unwrap();
        // Front camera axis is horizontal, so y equals its height.
        assert!((p.y - 37.0).abs() < 1e-9);
        assert!(p.x.abs() < 1e-9);
    }

    #[test]
    fn test_parallel_rays_yield_none() {
        let geometry = CameraGeometry {
            top_angle_x_deg: 0.0,
            ..CameraGeometry::default()
        };
        let c = SpaceConverter::new(&geometry).unwrap();
        let centre = PixelPoint::new(320.0, 240.0);
        assert_eq!(c.convert(centre, centre), None);
    }

    #[test]
    fn test_horizontal_top_ray_still_converts() {
        // Top ray with zero slope would break a division by a_top.
        let geometry = CameraGeometry {
            top_angle_x_deg: 10.0,
            ..CameraGeometry::default()
        };
        let c = SpaceConverter::new(&geometry).unwrap();
        let (_, v) = c.half_fov();
        let y = 240.0 - 10f64.to_radians() / v * 240.0;
        let p = c.convert(PixelPoint::new(320.0, y), PixelPoint::new(320.0, 200.0));
        assert!(p.is_some());
        assert!((p.unwrap().y - 207.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let bad_fov = CameraGeometry {
            fov_diagonal_deg: 180.0,
            ..CameraGeometry::default()
        };
        assert_eq!(
            SpaceConverter::new(&bad_fov).unwrap_err(),
            GeometryError::FieldOfView(180.0)
        );

        let bad_sensor = CameraGeometry {
            sensor_size: (0.0, 2.7),
            ..CameraGeometry::default()
        };
        assert!(matches!(
            SpaceConverter::new(&bad_sensor),
            Err(GeometryError::SensorSize(_, _))
        ));

        let bad_image = CameraGeometry {
            image_size: (640, 0),
            ..CameraGeometry::default()
        };
        assert!(matches!(
            SpaceConverter::new(&bad_image),
            Err(GeometryError::ImageSize(640, 0))
        ));

        let nan = CameraGeometry {
            top_angle_x_deg: f64::NAN,
            ..CameraGeometry::default()
        };
        assert_eq!(SpaceConverter::new(&nan).unwrap_err(), GeometryError::NonFinite);
    }

    #[test]
    fn test_project_rejects_camera_plane() {
        let c = converter();
        assert!(c.project(RealPosition::new(0.0, 0.0, 264.0)).is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_triangulation_round_trip(
                x in -100.0f64..100.0,
                y in -20.0f64..30.0,
                z in 100.0f64..250.0,
            ) {
                let c = converter();
                let point = RealPosition::new(x, y, z);
                let (top, front) = c.project(point).unwrap();
                let recovered = c.convert(top, front).unwrap();

                let tol = 1e-6 * (1.0 + x.abs().max(y.abs()).max(z.abs()));
                prop_assert!((recovered.x - x).abs() < tol);
                prop_assert!((recovered.y - y).abs() < tol);
                prop_assert!((recovered.z - z).abs() < tol);
            }

            #[test]
            fn prop_round_trip_other_tilts(
                tilt in 15.0f64..60.0,
                y in -20.0f64..20.0,
                z in 120.0f64..220.0,
            ) {
                let geometry = CameraGeometry { top_angle_x_deg: tilt, ..CameraGeometry::default() };
                let c = SpaceConverter::new(&geometry).unwrap();
                let point = RealPosition::new(5.0, y, z);
                let (top, front) = c.project(point).unwrap();
                let recovered = c.convert(top, front).unwrap();
                prop_assert!((recovered.y - y).abs() < 1e-6 * 300.0);
                prop_assert!((recovered.z - z).abs() < 1e-6 * 300.0);
            }
        }
    }
}
