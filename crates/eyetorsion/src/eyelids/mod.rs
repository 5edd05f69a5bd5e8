//! Upper/lower eyelid boundaries.
//!
//! Three strategies share the [`EyelidDetector`] trait and are chosen once
//! when the tracker is built:
//! - [`OpenEyelids`]: no occlusion, the boundary spans the whole frame.
//! - [`FixedEyelids`]: horizontal lids at fixed offsets from the pupil.
//! - [`HoughEyelids`]: parabola voting on vertical gradients, falling back to
//!   the fixed geometry when no candidate collects enough votes.

mod fixed;
mod hough;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::calibration::EyePhysicalModel;
use crate::conic::Ellipse;
use crate::settings::{DerivedGeometry, EyeTrackingSettings, EyelidMethod};

pub use fixed::{FixedEyelids, OpenEyelids};
pub use hough::HoughEyelids;

/// Upper and lower lid polylines in image coordinates, sorted by `x`.
///
/// A pixel is open when it lies between the two curves. An empty polyline
/// places no constraint on its side.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EyelidBoundary {
    pub upper: Vec<[f64; 2]>,
    pub lower: Vec<[f64; 2]>,
}

impl EyelidBoundary {
    /// Boundary spanning the whole `width × height` frame.
    pub fn open(width: u32, height: u32) -> Self {
        let x1 = width.saturating_sub(1) as f64;
        let y1 = height.saturating_sub(1) as f64;
        Self {
            upper: vec![[0.0, 0.0], [x1, 0.0]],
            lower: vec![[0.0, y1], [x1, y1]],
        }
    }

    /// Upper lid height at column `x`, or `None` without an upper curve.
    pub fn upper_y_at(&self, x: f64) -> Option<f64> {
        interpolate(&self.upper, x)
    }

    pub fn lower_y_at(&self, x: f64) -> Option<f64> {
        interpolate(&self.lower, x)
    }

    /// `true` when `(x, y)` lies between the lids (inclusive).
    pub fn is_open(&self, x: f64, y: f64) -> bool {
        self.upper_y_at(x).map_or(true, |u| y >= u) && self.lower_y_at(x).map_or(true, |l| y <= l)
    }

    /// Vertical opening at column `x`.
    pub fn aperture_at(&self, x: f64) -> Option<f64> {
        Some(self.lower_y_at(x)? - self.upper_y_at(x)?)
    }
}

/// Piecewise-linear lookup, clamped to the end points.
fn interpolate(poly: &[[f64; 2]], x: f64) -> Option<f64> {
    let first = poly.first()?;
    let last = poly[poly.len() - 1];
    if x <= first[0] {
        return Some(first[1]);
    }
    if x >= last[0] {
        return Some(last[1]);
    }
    let i = poly.partition_point(|p| p[0] <= x);
    let [x0, y0] = poly[i - 1];
    let [x1, y1] = poly[i];
    let dx = x1 - x0;
    if dx <= f64::EPSILON {
        return Some(y0);
    }
    Some(y0 + (y1 - y0) * (x - x0) / dx)
}

/// Sample `y = y0 + k (x - cx)^2` at `n` evenly spaced columns over the frame.
pub(crate) fn parabola_polyline(
    width: u32,
    height: u32,
    cx: f64,
    y0: f64,
    k: f64,
    n: usize,
) -> Vec<[f64; 2]> {
    let x1 = width.saturating_sub(1) as f64;
    let y1 = height.saturating_sub(1) as f64;
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let x = x1 * i as f64 / (n - 1) as f64;
            let dx = x - cx;
            [x, (y0 + k * dx * dx).clamp(0.0, y1)]
        })
        .collect()
}

/// Eyelid boundary strategy.
pub trait EyelidDetector: Send + Sync {
    fn find_eyelids(
        &self,
        image: &GrayImage,
        pupil: &Ellipse,
        model: Option<&EyePhysicalModel>,
    ) -> EyelidBoundary;
}

/// Build the detector selected by `settings.eyelid_method`.
pub fn build_detector(
    settings: &EyeTrackingSettings,
    geometry: &DerivedGeometry,
) -> Box<dyn EyelidDetector> {
    let fixed = FixedEyelids::from_settings(settings, geometry);
    match settings.eyelid_method {
        EyelidMethod::None => Box::new(OpenEyelids),
        EyelidMethod::Fixed => Box::new(fixed),
        EyelidMethod::HoughLines => Box::new(HoughEyelids::new(
            settings.eyelid.clone(),
            geometry.max_iris_radius_px,
            fixed,
        )),
    }
}
