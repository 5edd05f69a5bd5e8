//! Globe estimation from pupil ellipses seen at several gaze positions.
//!
//! A circular pupil on a rotating sphere projects to an ellipse whose minor
//! axis points at the projected globe center, and whose axis ratio is the
//! cosine of the gaze eccentricity. The center is the least-squares
//! intersection of the minor-axis lines; each sample then yields a radius
//! `d / sqrt(1 - (b/a)²)`.

use nalgebra::{Matrix2, Vector2};

use super::EyePhysicalModel;
use crate::conic::Ellipse;
use crate::sampling::median_in_place;

/// Accumulates pupil ellipses and solves for an [`EyePhysicalModel`].
#[derive(Debug, Clone)]
pub struct EyeModelEstimator {
    samples: Vec<Ellipse>,
    /// Minimum `a/b` for a sample to constrain the center.
    pub min_aspect: f64,
    /// Minimum number of constraining samples.
    pub min_samples: usize,
}

impl Default for EyeModelEstimator {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            min_aspect: 1.03,
            min_samples: 3,
        }
    }
}

impl EyeModelEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one pupil. Returns `false` when the ellipse cannot constrain
    /// the model (not found, or too round to have a reliable minor axis).
    pub fn add_pupil(&mut self, pupil: &Ellipse) -> bool {
        if !pupil.is_found() || pupil.aspect_ratio() < self.min_aspect {
            return false;
        }
        self.samples.push(*pupil);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Solve for the globe; `None` with too few or near-parallel samples.
    pub fn estimate(&self) -> Option<EyePhysicalModel> {
        if self.samples.len() < self.min_samples.max(2) {
            return None;
        }
        // Minor-axis lines: points x with n · (x - p) = 0, n along the major axis.
        let mut a = Matrix2::<f64>::zeros();
        let mut rhs = Vector2::<f64>::zeros();
        for e in &self.samples {
            let n = Vector2::new(e.angle.cos(), e.angle.sin());
            let p = Vector2::new(e.cx, e.cy);
            let nn = n * n.transpose();
            a += nn;
            rhs += nn * p;
        }
        let eig = a.symmetric_eigenvalues();
        let (lo, hi) = (eig.min(), eig.max());
        if !(hi > 0.0 && lo > 1e-3 * hi) {
            tracing::debug!(lo, hi, "eye model: minor-axis lines nearly parallel");
            return None;
        }
        let c = a.try_inverse()? * rhs;

        let mut radii: Vec<f64> = self
            .samples
            .iter()
            .filter_map(|e| {
                let d = ((e.cx - c.x).powi(2) + (e.cy - c.y).powi(2)).sqrt();
                let ratio = (e.b / e.a).min(1.0);
                let s = (1.0 - ratio * ratio).sqrt();
                (s > 0.15).then(|| d / s)
            })
            .collect();
        let radius = median_in_place(&mut radii)?;
        let model = EyePhysicalModel::new([c.x, c.y], radius);
        model.is_valid().then_some(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Pupil of radius `r` on a globe of radius `big_r` centered at `c`,
    /// rotated so its projected center is `(dx, dy)` from `c`.
    fn projected_pupil(c: [f64; 2], big_r: f64, r: f64, dx: f64, dy: f64) -> Ellipse {
        let d = (dx * dx + dy * dy).sqrt();
        let cos_t = (1.0 - (d / big_r).powi(2)).sqrt();
        // Major axis perpendicular to the offset direction.
        let angle = dy.atan2(dx) + std::f64::consts::FRAC_PI_2;
        Ellipse::from_axes(c[0] + dx, c[1] + dy, r, r * cos_t, angle)
    }

    #[test]
    fn recovers_globe_from_gaze_sweep() {
        let c = [160.0, 120.0];
        let big_r = 110.0;
        let mut est = EyeModelEstimator::new();
        for (dx, dy) in [(40.0, 0.0), (-35.0, 10.0), (5.0, 45.0), (-20.0, -38.0), (30.0, 30.0)] {
            assert!(est.add_pupil(&projected_pupil(c, big_r, 20.0, dx, dy)));
        }
        let m = est.estimate().unwrap();
        assert_relative_eq!(m.center[0], c[0], epsilon = 1e-6);
        assert_relative_eq!(m.center[1], c[1], epsilon = 1e-6);
        assert_relative_eq!(m.radius, big_r, epsilon = 1e-6);
    }

    #[test]
    fn round_and_parallel_samples_are_not_enough() {
        let mut est = EyeModelEstimator::new();
        assert!(!est.add_pupil(&Ellipse::circle(10.0, 10.0, 20.0)));
        assert!(!est.add_pupil(&Ellipse::NOT_FOUND));
        for dx in [30.0, 40.0, 50.0] {
            est.add_pupil(&projected_pupil([0.0, 0.0], 100.0, 20.0, dx, 0.0));
        }
        assert_eq!(est.len(), 3);
        assert!(est.estimate().is_none());
        est.clear();
        assert!(est.is_empty());
    }
}
