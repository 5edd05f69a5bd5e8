//! Sub-pixel pupil and iris boundary refinement.
//!
//! All strategies start from boundary points found by [`scan_edges`] (or, for
//! the pupil centroid, from intensity moments) and are fully deterministic:
//! the robust fit uses a fixed RANSAC seed.

mod edge_scan;
mod hull;

use image::GrayImage;
use thiserror::Error;

use crate::conic::{fit_ellipse_direct, fit_ellipse_ransac, ConicError, Ellipse};
use crate::mask::Mask;
use crate::pupil::Moments;
use crate::sampling;
use crate::settings::{DerivedGeometry, EdgeScanConfig, EyeTrackingSettings, PositionMethod};

pub use edge_scan::{scan_edges, EdgeScanStats, EdgeScratch};
pub use hull::convex_hull;

/// Which boundary is being refined.
///
/// For `Pupil` the coarse ellipse is the locator output. For `Iris` it is
/// the refined pupil; the limbus is searched outside it up to the maximum
/// iris radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryTarget {
    Pupil,
    Iris,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefineError {
    #[error("coarse ellipse is degenerate")]
    NoCoarse,
    #[error("only {found} boundary points (need {needed})")]
    TooFewPoints { needed: usize, found: usize },
    #[error("boundary fit failed: {0}")]
    Fit(ConicError),
}

impl RefineError {
    /// Numeric fit failure on adequate support, as opposed to a segmentation miss.
    pub fn is_numeric(&self) -> bool {
        matches!(self, RefineError::Fit(_))
    }
}

/// Frame data shared by every refinement call of one frame.
#[derive(Clone, Copy)]
pub struct RefineInput<'a> {
    pub image: &'a GrayImage,
    /// Eyelid and reflection mask.
    pub mask: &'a Mask,
    pub dark: u8,
    pub bright: u8,
}

/// Boundary refinement strategy.
pub trait PositionRefiner: Send + Sync {
    fn refine(
        &self,
        input: &RefineInput<'_>,
        coarse: &Ellipse,
        target: BoundaryTarget,
        scratch: &mut EdgeScratch,
    ) -> Result<Ellipse, RefineError>;
}

/// Radial search window (pixels from the center) for `target`.
pub fn scan_window(target: BoundaryTarget, coarse: &Ellipse, max_iris_radius_px: f64) -> [f32; 2] {
    match target {
        BoundaryTarget::Pupil => [
            (0.3 * coarse.b) as f32,
            (1.6 * coarse.a).min(max_iris_radius_px) as f32,
        ],
        BoundaryTarget::Iris => [
            (1.3 * coarse.a + 2.0) as f32,
            (1.1 * max_iris_radius_px) as f32,
        ],
    }
}

/// Shared edge-scan front end of every strategy.
#[derive(Debug, Clone)]
struct BoundaryScanner {
    config: EdgeScanConfig,
    max_iris_radius_px: f64,
}

impl BoundaryScanner {
    fn scan<'s>(
        &self,
        input: &RefineInput<'_>,
        coarse: &Ellipse,
        target: BoundaryTarget,
        scratch: &'s mut EdgeScratch,
    ) -> Result<&'s [[f64; 2]], RefineError> {
        if !coarse.is_found() {
            return Err(RefineError::NoCoarse);
        }
        let window = scan_window(target, coarse, self.max_iris_radius_px);
        let stats = scan_edges(
            input.image,
            input.mask,
            input.bright,
            coarse.center(),
            window,
            &self.config,
            scratch,
        );
        let needed = self.config.min_points;
        if stats.n_points() < needed {
            return Err(RefineError::TooFewPoints {
                needed,
                found: stats.n_points(),
            });
        }
        Ok(&scratch.points)
    }
}

/// Pupil: intensity moments inside the enlarged coarse ellipse.
/// Iris: circle at the centroid of the boundary points with their median
/// distance as radius.
#[derive(Debug, Clone)]
pub struct CentroidRefiner {
    scanner: BoundaryScanner,
}

impl PositionRefiner for CentroidRefiner {
    fn refine(
        &self,
        input: &RefineInput<'_>,
        coarse: &Ellipse,
        target: BoundaryTarget,
        scratch: &mut EdgeScratch,
    ) -> Result<Ellipse, RefineError> {
        match target {
            BoundaryTarget::Pupil => pupil_moments(input, coarse),
            BoundaryTarget::Iris => {
                let pts = self.scanner.scan(input, coarse, target, scratch)?;
                let n = pts.len() as f64;
                let mx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
                let my = pts.iter().map(|p| p[1]).sum::<f64>() / n;
                let mut dist: Vec<f64> = pts
                    .iter()
                    .map(|p| ((p[0] - mx).powi(2) + (p[1] - my).powi(2)).sqrt())
                    .collect();
                let r = sampling::median_in_place(&mut dist).ok_or(RefineError::TooFewPoints {
                    needed: 1,
                    found: 0,
                })?;
                Ok(Ellipse::circle(mx, my, r))
            }
        }
    }
}

fn pupil_moments(input: &RefineInput<'_>, coarse: &Ellipse) -> Result<Ellipse, RefineError> {
    if !coarse.is_found() {
        return Err(RefineError::NoCoarse);
    }
    let region = coarse.scaled(1.4);
    let (w, h) = input.image.dimensions();
    let roi = crate::frame::Roi::from_bounds(region.bounding_box(), w, h)
        .ok_or(RefineError::NoCoarse)?;
    let dark = input.dark as f64;
    let mut m = Moments::default();
    let mut count = 0usize;
    for y in roi.y..roi.y + roi.height {
        for x in roi.x..roi.x + roi.width {
            let (fx, fy) = (x as f64, y as f64);
            if !region.contains(fx, fy) || !input.mask.is_valid(x, y) {
                continue;
            }
            let v = input.image.get_pixel(x, y)[0] as f64;
            if v <= dark {
                m.add(fx, fy, dark - v + 1.0);
                count += 1;
            }
        }
    }
    if count < 6 {
        return Err(RefineError::TooFewPoints {
            needed: 6,
            found: count,
        });
    }
    m.ellipse().ok_or(RefineError::Fit(ConicError::Degenerate))
}

/// Least-squares ellipse through the convex hull of the boundary points.
#[derive(Debug, Clone)]
pub struct ConvexHullRefiner {
    scanner: BoundaryScanner,
}

impl PositionRefiner for ConvexHullRefiner {
    fn refine(
        &self,
        input: &RefineInput<'_>,
        coarse: &Ellipse,
        target: BoundaryTarget,
        scratch: &mut EdgeScratch,
    ) -> Result<Ellipse, RefineError> {
        let pts = self.scanner.scan(input, coarse, target, scratch)?;
        let hull = convex_hull(pts);
        if hull.len() < 6 {
            return Err(RefineError::Fit(ConicError::TooFewPoints {
                needed: 6,
                got: hull.len(),
            }));
        }
        fit_ellipse_direct(&hull).ok_or(RefineError::Fit(ConicError::Degenerate))
    }
}

/// Seeded RANSAC ellipse fit on the boundary points.
#[derive(Debug, Clone)]
pub struct EllipseFitRefiner {
    scanner: BoundaryScanner,
}

impl PositionRefiner for EllipseFitRefiner {
    fn refine(
        &self,
        input: &RefineInput<'_>,
        coarse: &Ellipse,
        target: BoundaryTarget,
        scratch: &mut EdgeScratch,
    ) -> Result<Ellipse, RefineError> {
        let pts = self.scanner.scan(input, coarse, target, scratch)?;
        let res = fit_ellipse_ransac(pts, &self.scanner.config.ransac).map_err(RefineError::Fit)?;
        tracing::trace!(
            ?target,
            inliers = res.num_inliers,
            points = pts.len(),
            "ellipse refit"
        );
        Ok(res.ellipse)
    }
}

/// Build the refiner selected by `settings.position_method`.
pub fn build_refiner(
    settings: &EyeTrackingSettings,
    geometry: &DerivedGeometry,
) -> Box<dyn PositionRefiner> {
    let scanner = BoundaryScanner {
        config: settings.edge_scan.clone(),
        max_iris_radius_px: geometry.max_iris_radius_px,
    };
    match settings.position_method {
        PositionMethod::Centroid => Box::new(CentroidRefiner { scanner }),
        PositionMethod::ConvexHull => Box::new(ConvexHullRefiner { scanner }),
        PositionMethod::EllipseFitting => Box::new(EllipseFitRefiner { scanner }),
    }
}

/// One-shot refinement with the strategy from `settings`.
pub fn refine(
    image: &GrayImage,
    coarse: &Ellipse,
    mask: &Mask,
    settings: &EyeTrackingSettings,
    eye: crate::frame::Eye,
    target: BoundaryTarget,
) -> Result<Ellipse, RefineError> {
    let geometry = settings.derived();
    let t = settings.thresholds_for(eye);
    let input = RefineInput {
        image,
        mask,
        dark: t.dark,
        bright: t.bright,
    };
    build_refiner(settings, &geometry).refine(&input, coarse, target, &mut EdgeScratch::default())
}
