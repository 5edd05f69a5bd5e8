//! Ocular torsion from the angular shift of the iris pattern.
//!
//! The annulus between the pupil and the limbus is resampled on the iris
//! plane into an [`IrisStrip`], each radial row is normalized, and the strip
//! is correlated against the calibration reference over `±max_torsion`.
//! Positive angles are clockwise rotations of the iris as seen in the image.

mod correlate;
mod strip;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::calibration::EyePhysicalModel;
use crate::conic::Ellipse;
use crate::error::{Result, TrackError};
use crate::mask::Mask;
use crate::settings::TorsionConfig;

pub use correlate::{correlate, CorrelationCurve};
pub use strip::{IrisStrip, StripGeometry, StripSampler};

/// Bins excluded around the peak when computing the sidelobe statistics.
const PSR_GUARD_BINS: usize = 2;

/// Outcome of one torsion measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TorsionResult {
    /// Clockwise rotation relative to the reference (degrees).
    pub angle_deg: f64,
    /// Peak normalized correlation clamped to `[0, 1]`; 0 when nothing matched.
    pub quality: f64,
    /// Peak-to-sidelobe ratio of the correlation curve.
    pub psr: f64,
    /// Fraction of strip cells valid in both current and reference.
    pub overlap: f64,
}

impl TorsionResult {
    pub const NO_MATCH: TorsionResult = TorsionResult {
        angle_deg: 0.0,
        quality: 0.0,
        psr: 0.0,
        overlap: 0.0,
    };
}

/// Strip sampling and correlation with settings fixed at construction.
#[derive(Debug, Clone)]
pub struct TorsionEstimator {
    config: TorsionConfig,
    sampler: StripSampler,
    max_shift_bins: usize,
    max_iris_radius_px: f64,
}

impl TorsionEstimator {
    pub fn new(config: &TorsionConfig, max_torsion_deg: f64, max_iris_radius_px: f64) -> Self {
        let sampler = StripSampler::new(config.n_radii, config.angular_resolution_deg);
        let res = 360.0 / sampler.n_angles() as f64;
        Self {
            config: config.clone(),
            max_shift_bins: (max_torsion_deg / res).ceil() as usize,
            sampler,
            max_iris_radius_px,
        }
    }

    pub fn config(&self) -> &TorsionConfig {
        &self.config
    }

    pub fn empty_strip(&self) -> IrisStrip {
        self.sampler.empty_strip()
    }

    /// Sampling radii: from just outside the pupil to inside the limbus.
    /// Without an iris boundary the maximum iris radius stands in.
    pub fn annulus_radii(&self, pupil: &Ellipse, iris: &Ellipse) -> (f64, f64) {
        let inner = pupil.a * self.config.inner_radius_factor;
        let limbus = if iris.is_found() {
            iris.a.min(self.max_iris_radius_px)
        } else {
            self.max_iris_radius_px
        };
        (inner, limbus * self.config.outer_radius_fraction)
    }

    /// Resample the iris of `image` into `out` (normalized when configured).
    pub fn resample(
        &self,
        image: &GrayImage,
        mask: Option<&Mask>,
        model: Option<&EyePhysicalModel>,
        pupil: &Ellipse,
        iris: &Ellipse,
        out: &mut IrisStrip,
    ) {
        let (inner, outer) = self.annulus_radii(pupil, iris);
        let geom = match model {
            Some(m) => m.strip_geometry(pupil.center(), inner, outer),
            None => StripGeometry::frontal(pupil.center(), inner, outer),
        };
        self.sampler.resample(image, mask, &geom, out);
        if self.config.normalize_rows {
            out.normalize_rows();
        }
    }

    /// Reject references sampled on a different grid or with malformed
    /// buffers.
    pub fn check_reference(&self, reference: &IrisStrip) -> Result<()> {
        if let Some(e) = reference.layout_error() {
            return Err(TrackError::IncompatibleReference(e));
        }
        let expected = self.sampler.empty_strip();
        if reference.same_layout(&expected) {
            return Ok(());
        }
        Err(layout_mismatch(reference, &expected))
    }

    /// Compare an already resampled strip with a reference of the same
    /// layout; a different layout is [`TrackError::IncompatibleReference`].
    pub fn compare(&self, current: &IrisStrip, reference: &IrisStrip) -> Result<TorsionResult> {
        if !current.same_layout(reference) {
            return Err(layout_mismatch(reference, current));
        }
        let curve = correlate(
            current,
            reference,
            self.max_shift_bins,
            self.config.min_overlap_fraction,
        );
        let Some((shift, peak)) = curve.subbin_peak() else {
            tracing::debug!(
                overlap = curve.overlap_at_zero,
                "torsion: no shift with enough overlap"
            );
            return Ok(TorsionResult {
                overlap: curve.overlap_at_zero,
                ..TorsionResult::NO_MATCH
            });
        };
        Ok(TorsionResult {
            angle_deg: shift * current.angular_resolution_deg,
            quality: peak.clamp(0.0, 1.0),
            psr: curve.psr(PSR_GUARD_BINS),
            overlap: curve.overlap_at_zero,
        })
    }

    /// Resample `image` into `current` and measure its rotation against
    /// `reference`. `current` holds the torsion image afterwards.
    ///
    /// A fully masked annulus is not an error: it yields angle 0 and
    /// quality 0.
    #[allow(clippy::too_many_arguments)]
    pub fn calculate_torsion_angle(
        &self,
        image: &GrayImage,
        model: &EyePhysicalModel,
        reference: &IrisStrip,
        mask: Option<&Mask>,
        pupil: &Ellipse,
        iris: &Ellipse,
        current: &mut IrisStrip,
    ) -> Result<TorsionResult> {
        self.check_reference(reference)?;
        self.resample(image, mask, Some(model), pupil, iris, current);
        self.compare(current, reference)
    }
}

fn layout_mismatch(reference: &IrisStrip, expected: &IrisStrip) -> TrackError {
    TrackError::IncompatibleReference(format!(
        "reference is {}x{} at {:.3} deg, expected {}x{} at {:.3} deg",
        reference.n_radii,
        reference.n_angles,
        reference.angular_resolution_deg,
        expected.n_radii,
        expected.n_angles,
        expected.angular_resolution_deg,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask;
    use crate::settings::MaskConfig;
    use crate::test_utils::SyntheticEye;
    use image::Luma;

    fn estimator() -> TorsionEstimator {
        TorsionEstimator::new(&TorsionConfig::default(), 20.0, 70.0)
    }

    fn geometry(eye: &SyntheticEye) -> (EyePhysicalModel, Ellipse, Ellipse) {
        let pupil = Ellipse::circle(eye.center[0], eye.center[1], eye.pupil_radius);
        let iris = Ellipse::circle(eye.center[0], eye.center[1], eye.iris_radius);
        (EyePhysicalModel::from_pupil(&pupil, 120.0), pupil, iris)
    }

    fn reference_of(est: &TorsionEstimator, eye: &SyntheticEye, mask: Option<&Mask>) -> IrisStrip {
        let (model, pupil, iris) = geometry(eye);
        let mut strip = est.empty_strip();
        est.resample(&eye.render(), mask, Some(&model), &pupil, &iris, &mut strip);
        strip
    }

    #[test]
    fn same_frame_measures_zero() {
        let est = estimator();
        let eye = SyntheticEye::default();
        let reference = reference_of(&est, &eye, None);
        assert!(reference.coverage() > 0.99);
        let (model, pupil, iris) = geometry(&eye);
        let mut cur = est.empty_strip();
        let r = est.calculate_torsion_angle(
            &eye.render(),
            &model,
            &reference,
            None,
            &pupil,
            &iris,
            &mut cur,
        )
        .unwrap();
        assert!(r.angle_deg.abs() < 0.05, "{r:?}");
        assert!(r.quality > 0.99, "{r:?}");
        assert!(r.psr > 1.0);
    }

    #[test]
    fn rotated_iris_is_measured() {
        let est = estimator();
        let eye = SyntheticEye::default();
        let reference = reference_of(&est, &eye, None);
        let (model, pupil, iris) = geometry(&eye);
        let mut last_err = 0.0f64;
        for theta in [0.3, 1.7, -2.25, 5.0, -8.6, 12.4, -17.0, 19.5] {
            let img = eye.rotated(theta).render();
            let mut cur = est.empty_strip();
            let r = est.calculate_torsion_angle(
                &img, &model, &reference, None, &pupil, &iris, &mut cur,
            )
            .unwrap();
            let err = (r.angle_deg - theta).abs();
            assert!(err <= 0.5, "theta={theta} measured={}", r.angle_deg);
            assert!(r.quality > 0.8, "theta={theta} quality={}", r.quality);
            last_err = last_err.max(err);
        }
        assert!(last_err <= 0.5);
    }

    #[test]
    fn masked_out_pixels_do_not_matter() {
        let est = estimator();
        let eye = SyntheticEye::default();
        let (model, pupil, iris) = geometry(&eye);
        let img = eye.rotated(4.0).render();

        let lids = crate::eyelids::EyelidBoundary {
            upper: vec![[0.0, eye.center[1] - 35.0], [239.0, eye.center[1] - 25.0]],
            lower: vec![[0.0, eye.center[1] + 40.0], [239.0, eye.center[1] + 40.0]],
        };
        let m = mask::get_mask(&img, &lids, &pupil, 220, 70.0, &MaskConfig::default());
        let reference = reference_of(&est, &eye, Some(&m));

        let mut corrupted = img.clone();
        let mut state = 12345u32;
        for (x, y, p) in corrupted.enumerate_pixels_mut() {
            if !m.is_valid(x, y) {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                *p = Luma([(state >> 16) as u8]);
            }
        }

        let mut a = est.empty_strip();
        let mut b = est.empty_strip();
        let ra = est.calculate_torsion_angle(&img, &model, &reference, Some(&m), &pupil, &iris, &mut a)
            .unwrap();
        let rb = est.calculate_torsion_angle(
            &corrupted,
            &model,
            &reference,
            Some(&m),
            &pupil,
            &iris,
            &mut b,
        )
        .unwrap();
        assert_eq!(ra, rb);
        assert_eq!(a, b);
        assert!((ra.angle_deg - 4.0).abs() < 0.5, "{ra:?}");
    }

    #[test]
    fn fully_masked_annulus_gives_zero_quality() {
        let est = estimator();
        let eye = SyntheticEye::default();
        let reference = reference_of(&est, &eye, None);
        let (model, pupil, iris) = geometry(&eye);
        let m = Mask::none_valid(eye.width, eye.height);
        let mut cur = est.empty_strip();
        let r = est.calculate_torsion_angle(
            &eye.render(),
            &model,
            &reference,
            Some(&m),
            &pupil,
            &iris,
            &mut cur,
        )
        .unwrap();
        assert_eq!(r.angle_deg, 0.0);
        assert_eq!(r.quality, 0.0);
        assert_eq!(cur.coverage(), 0.0);
    }

    #[test]
    fn mismatched_reference_is_rejected() {
        let est = estimator();
        let eye = SyntheticEye::default();
        let (model, pupil, iris) = geometry(&eye);
        let other = IrisStrip::new(4, 360, 1.0);
        let mut cur = est.empty_strip();
        let err = est
            .calculate_torsion_angle(&eye.render(), &model, &other, None, &pupil, &iris, &mut cur)
            .unwrap_err();
        assert!(matches!(err, TrackError::IncompatibleReference(_)));

        let reference = reference_of(&est, &eye, None);
        assert!(est.compare(&reference, &reference).is_ok());
        assert!(matches!(
            est.compare(&reference, &other),
            Err(TrackError::IncompatibleReference(_))
        ));
    }

    #[test]
    fn malformed_reference_is_an_error_not_a_panic() {
        let est = estimator();
        let eye = SyntheticEye::default();
        let (model, pupil, iris) = geometry(&eye);
        let mut json = serde_json::to_value(reference_of(&est, &eye, None)).unwrap();
        for key in ["values", "valid"] {
            json[key].as_array_mut().unwrap().truncate(10);
        }
        let truncated: IrisStrip = serde_json::from_value(json).unwrap();
        assert!(matches!(
            est.check_reference(&truncated),
            Err(TrackError::IncompatibleReference(_))
        ));
        let mut cur = est.empty_strip();
        let err = est
            .calculate_torsion_angle(&eye.render(), &model, &truncated, None, &pupil, &iris, &mut cur)
            .unwrap_err();
        assert!(matches!(err, TrackError::IncompatibleReference(_)));
        assert!(matches!(
            est.compare(&cur, &truncated),
            Err(TrackError::IncompatibleReference(_))
        ));
    }

    #[test]
    fn annulus_uses_limbus_or_max_radius() {
        let est = estimator();
        let pupil = Ellipse::circle(0.0, 0.0, 20.0);
        let (i, o) = est.annulus_radii(&pupil, &Ellipse::circle(0.0, 0.0, 50.0));
        assert!((i - 26.0).abs() < 1e-9 && (o - 42.5).abs() < 1e-9);
        let (_, o) = est.annulus_radii(&pupil, &Ellipse::NOT_FOUND);
        assert!((o - 59.5).abs() < 1e-9);
    }
}
