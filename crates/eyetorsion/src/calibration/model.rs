//! Spherical eye-globe model.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::conic::Ellipse;
use crate::torsion::StripGeometry;

/// Idealized eye globe in image coordinates (pixels).
///
/// The camera is treated as orthographic: a point on the globe at
/// `(dx, dy)` from the projected center lies at depth `sqrt(R² - d²)`
/// towards the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyePhysicalModel {
    pub center: [f64; 2],
    pub radius: f64,
}

/// Largest fraction of the radius a pupil may sit from the globe center
/// before it is pulled back onto the visible hemisphere.
const MAX_ECCENTRICITY: f64 = 0.99;

impl EyePhysicalModel {
    pub fn new(center: [f64; 2], radius: f64) -> Self {
        Self { center, radius }
    }

    /// Globe directly behind `pupil`, i.e. the pupil is looking at the camera.
    pub fn from_pupil(pupil: &Ellipse, globe_radius_px: f64) -> Self {
        Self::new(pupil.center(), globe_radius_px)
    }

    pub fn is_valid(&self) -> bool {
        self.center.iter().all(|v| v.is_finite()) && self.radius.is_finite() && self.radius > 0.0
    }

    /// Unit gaze vector `(x right, y down, z away from the camera)`.
    pub fn gaze_direction(&self, pupil_center: [f64; 2]) -> Vector3<f64> {
        let mut dx = pupil_center[0] - self.center[0];
        let mut dy = pupil_center[1] - self.center[1];
        let d = (dx * dx + dy * dy).sqrt();
        let d_max = MAX_ECCENTRICITY * self.radius;
        if d > d_max {
            dx *= d_max / d;
            dy *= d_max / d;
        }
        let z = (self.radius * self.radius - dx * dx - dy * dy).max(0.0).sqrt();
        Vector3::new(dx, dy, -z).normalize()
    }

    /// `[horizontal, vertical]` Fick angles in degrees; positive is right and
    /// down in the image.
    pub fn gaze_angles_deg(&self, pupil_center: [f64; 2]) -> [f64; 2] {
        let g = self.gaze_direction(pupil_center);
        let vertical = g.y.clamp(-1.0, 1.0).asin();
        let horizontal = g.x.atan2(-g.z);
        [horizontal.to_degrees(), vertical.to_degrees()]
    }

    /// Image projections of the iris-plane axes `u`, `v`.
    ///
    /// The iris plane is perpendicular to the gaze. `u` is horizontal in
    /// the eye frame and `v = u × g`; for frontal gaze they reduce to the
    /// image `+x` and `+y` axes.
    pub fn iris_axes(&self, pupil_center: [f64; 2]) -> ([f64; 2], [f64; 2]) {
        let g = self.gaze_direction(pupil_center);
        let u = g
            .cross(&Vector3::y())
            .try_normalize(1e-9)
            .unwrap_or_else(Vector3::x);
        let v = u.cross(&g);
        ([u.x, u.y], [v.x, v.y])
    }

    /// Sampling geometry of the iris annulus around `pupil_center`.
    pub fn strip_geometry(
        &self,
        pupil_center: [f64; 2],
        inner_radius: f64,
        outer_radius: f64,
    ) -> StripGeometry {
        let (u, v) = self.iris_axes(pupil_center);
        StripGeometry {
            center: pupil_center,
            inner_radius,
            outer_radius,
            u,
            v,
        }
    }
}
