use image::GrayImage;

use super::{PupilLocator, RadiusBounds};
use crate::conic::Ellipse;
use crate::frame::Roi;

/// Weighted first and second moments of a 2-D point cloud.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Moments {
    w: f64,
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

impl Moments {
    #[inline]
    pub fn add(&mut self, x: f64, y: f64, w: f64) {
        self.w += w;
        self.sx += w * x;
        self.sy += w * y;
        self.sxx += w * x * x;
        self.syy += w * y * y;
        self.sxy += w * x * y;
    }

    pub fn centroid(&self) -> Option<[f64; 2]> {
        (self.w > 0.0).then(|| [self.sx / self.w, self.sy / self.w])
    }

    /// Ellipse with the same centroid and covariance as a uniformly filled
    /// region: radii are `2·sqrt(λ)` of the covariance eigenvalues.
    pub fn ellipse(&self) -> Option<Ellipse> {
        let [mx, my] = self.centroid()?;
        let cxx = self.sxx / self.w - mx * mx;
        let cyy = self.syy / self.w - my * my;
        let cxy = self.sxy / self.w - mx * my;
        let half_tr = 0.5 * (cxx + cyy);
        let disc = (0.25 * (cxx - cyy) * (cxx - cyy) + cxy * cxy).sqrt();
        let l1 = half_tr + disc;
        let l2 = half_tr - disc;
        if !(l1.is_finite() && l2 > 1e-9 * l1) {
            return None;
        }
        let angle = 0.5 * (2.0 * cxy).atan2(cxx - cyy);
        Some(Ellipse::from_axes(mx, my, 2.0 * l1.sqrt(), 2.0 * l2.sqrt(), angle))
    }
}

/// Intensity-weighted moments of every pixel at or below the dark level.
///
/// Weights grow with darkness (`dark - I + 1`), so soft boundary pixels
/// contribute less than the pupil interior. No connectivity analysis: dark
/// pixels anywhere in the search region pull the estimate.
#[derive(Debug, Clone)]
pub struct CentroidLocator {
    bounds: RadiusBounds,
}

impl CentroidLocator {
    pub fn new(bounds: RadiusBounds) -> Self {
        Self { bounds }
    }
}

impl PupilLocator for CentroidLocator {
    fn locate(
        &self,
        image: &GrayImage,
        roi: Roi,
        dark: u8,
        _scratch: &mut GrayImage,
    ) -> Option<Ellipse> {
        let mut m = Moments::default();
        let mut count = 0usize;
        for y in roi.y..roi.y + roi.height {
            for x in roi.x..roi.x + roi.width {
                let v = image.get_pixel(x, y)[0];
                if v <= dark {
                    m.add(x as f64, y as f64, (dark - v) as f64 + 1.0);
                    count += 1;
                }
            }
        }
        let r_eq = (count as f64 / std::f64::consts::PI).sqrt();
        if !self.bounds.contains(r_eq) {
            tracing::debug!(r_eq, count, "centroid: dark area outside pupil bounds");
            return None;
        }
        m.ellipse().filter(|e| self.bounds.contains(e.mean_radius()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn moments_of_axis_aligned_ellipse() {
        let truth = Ellipse::from_axes(30.0, 20.0, 12.0, 6.0, 0.0);
        let mut m = Moments::default();
        let step = 0.05;
        let mut y = 0.0;
        while y < 40.0 {
            let mut x = 0.0;
            while x < 60.0 {
                if truth.contains(x, y) {
                    m.add(x, y, 1.0);
                }
                x += step;
            }
            y += step;
        }
        let e = m.ellipse().unwrap();
        assert_abs_diff_eq!(e.cx, 30.0, epsilon = 0.05);
        assert_abs_diff_eq!(e.a, 12.0, epsilon = 0.1);
        assert_abs_diff_eq!(e.b, 6.0, epsilon = 0.1);
        assert_abs_diff_eq!(e.angle, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn collinear_points_have_no_ellipse() {
        let mut m = Moments::default();
        for i in 0..10 {
            m.add(i as f64, 2.0 * i as f64, 1.0);
        }
        assert!(m.ellipse().is_none());
        assert!(Moments::default().centroid().is_none());
    }
}
