//! Tracking configuration.
//!
//! [`EyeTrackingSettings`] is an immutable value built once per configuration
//! change and handed to [`EyeTracker::new`](crate::EyeTracker::new). Every
//! struct here uses `#[serde(default)]`, so a JSON file only needs the
//! fields it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::conic::RansacConfig;
use crate::error::{Result, TrackError};
use crate::frame::{Eye, Roi};

/// Coarse pupil search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PupilMethod {
    /// Largest dark connected component, ellipse fitted to its contour.
    #[default]
    Blob,
    /// Weighted moments of all dark pixels in the search region.
    Centroid,
}

/// Eyelid boundary strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EyelidMethod {
    /// Whole frame treated as open.
    #[default]
    None,
    /// Horizontal lids at fixed offsets from the pupil.
    Fixed,
    /// Edge voting for near-horizontal arcs above and below the pupil.
    HoughLines,
}

/// Subpixel boundary refinement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionMethod {
    Centroid,
    ConvexHull,
    #[default]
    EllipseFitting,
}

/// Which mask the torsion estimator correlates under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TorsionMode {
    /// Skip torsion; no calibration reference required.
    Disabled,
    /// Eyelid + reflection + annulus mask.
    #[default]
    Masked,
    /// Whole iris annulus, no eyelid or reflection exclusion.
    Unmasked,
}

/// 8-bit intensity thresholds for one eye.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityThresholds {
    /// Pixels at or below this value are pupil candidates.
    pub dark: u8,
    /// Pixels at or above this value are specular reflections.
    pub bright: u8,
}

impl Default for IntensityThresholds {
    fn default() -> Self {
        Self {
            dark: 60,
            bright: 220,
        }
    }
}

/// A value configured separately for each eye.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerEye<T> {
    pub left: T,
    pub right: T,
}

impl<T> PerEye<T> {
    pub fn same(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            left: value.clone(),
            right: value,
        }
    }

    /// Value for `eye`; a shared sensor (`Both`) uses the left entry.
    pub fn get(&self, eye: Eye) -> &T {
        match eye {
            Eye::Left | Eye::Both => &self.left,
            Eye::Right => &self.right,
        }
    }
}

/// Radial edge scanning used by the boundary refiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeScanConfig {
    /// Number of rays cast from the boundary center.
    pub n_rays: usize,
    /// Step along each ray (pixels).
    pub r_step: f32,
    /// Minimum smoothed `dI/dr` (normalized intensity per pixel) for an edge.
    pub min_edge_strength: f32,
    /// Minimum accepted edge points before a fit is attempted.
    pub min_points: usize,
    /// Robust fit used by `EllipseFitting`.
    pub ransac: RansacConfig,
}

impl Default for EdgeScanConfig {
    fn default() -> Self {
        Self {
            n_rays: 72,
            r_step: 0.5,
            min_edge_strength: 0.03,
            min_points: 12,
            ransac: RansacConfig::default(),
        }
    }
}

/// Eyelid detection controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyelidConfig {
    /// Upper lid distance above the pupil center, as a fraction of the
    /// maximum iris radius (`Fixed`, and `HoughLines` fallback).
    pub fixed_upper_fraction: f64,
    /// Lower lid distance below the pupil center, same units.
    pub fixed_lower_fraction: f64,
    /// Minimum fraction of scanned columns that must support a lid curve.
    pub min_vote_fraction: f32,
    /// Largest |curvature| (1/px) of the candidate parabolas.
    pub max_curvature: f64,
    /// Number of curvature hypotheses on each side of zero.
    pub curvature_steps: usize,
    /// Minimum vertical intensity step (grey levels) counted as a lid edge.
    pub min_gradient: f32,
    /// Number of points in the emitted polylines.
    pub polyline_points: usize,
}

impl Default for EyelidConfig {
    fn default() -> Self {
        Self {
            fixed_upper_fraction: 0.8,
            fixed_lower_fraction: 0.9,
            min_vote_fraction: 0.35,
            max_curvature: 0.008,
            curvature_steps: 4,
            min_gradient: 30.0,
            polyline_points: 9,
        }
    }
}

/// Validity mask controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Dilation radius (pixels) applied to bright reflections.
    pub reflection_dilation_px: u8,
    /// Annulus inner boundary as a multiple of the pupil radius.
    pub pupil_margin: f64,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            reflection_dilation_px: 2,
            pupil_margin: 1.15,
        }
    }
}

/// Iris resampling and correlation controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TorsionConfig {
    /// Angular bin width of the iris strip (degrees).
    pub angular_resolution_deg: f64,
    /// Number of concentric sampling circles across the annulus.
    pub n_radii: usize,
    /// Inner sampling radius as a multiple of the pupil radius.
    pub inner_radius_factor: f64,
    /// Outer sampling radius as a fraction of the iris radius.
    pub outer_radius_fraction: f64,
    /// Subtract mean and divide by deviation per radial row.
    pub normalize_rows: bool,
    /// Minimum fraction of strip cells overlapping the reference.
    pub min_overlap_fraction: f64,
    /// Quality under which a frame is flagged `LowQuality`.
    pub min_quality: f64,
    /// Valid-cell coverage a reference needs before calibration is `Ready`.
    pub min_reference_coverage: f64,
}

impl Default for TorsionConfig {
    fn default() -> Self {
        Self {
            angular_resolution_deg: 0.5,
            n_radii: 12,
            inner_radius_factor: 1.3,
            outer_radius_fraction: 0.85,
            normalize_rows: true,
            min_overlap_fraction: 0.1,
            min_quality: 0.5,
            min_reference_coverage: 0.3,
        }
    }
}

/// Complete per-configuration tracking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeTrackingSettings {
    pub pupil_method: PupilMethod,
    pub eyelid_method: EyelidMethod,
    pub position_method: PositionMethod,
    pub torsion_mode: TorsionMode,
    pub thresholds: PerEye<IntensityThresholds>,
    /// Optional pupil search region per eye, in frame pixels.
    pub crop: PerEye<Option<Roi>>,
    /// Millimeters per image pixel at the eye.
    pub mm_per_pixel: f64,
    /// Equivalent-radius range of a dark region accepted as the pupil.
    pub min_pupil_radius_mm: f64,
    pub max_pupil_radius_mm: f64,
    pub max_iris_radius_mm: f64,
    /// Radius of the idealized eye globe.
    pub globe_radius_mm: f64,
    /// Largest torsion searched, in either direction (degrees).
    pub max_torsion_deg: f64,
    pub edge_scan: EdgeScanConfig,
    pub eyelid: EyelidConfig,
    pub mask: MaskConfig,
    pub torsion: TorsionConfig,
}

impl Default for EyeTrackingSettings {
    fn default() -> Self {
        Self {
            pupil_method: PupilMethod::default(),
            eyelid_method: EyelidMethod::default(),
            position_method: PositionMethod::default(),
            torsion_mode: TorsionMode::default(),
            thresholds: PerEye::default(),
            crop: PerEye::default(),
            mm_per_pixel: 0.1,
            min_pupil_radius_mm: 0.5,
            max_pupil_radius_mm: 4.5,
            max_iris_radius_mm: 7.0,
            globe_radius_mm: 12.0,
            max_torsion_deg: 20.0,
            edge_scan: EdgeScanConfig::default(),
            eyelid: EyelidConfig::default(),
            mask: MaskConfig::default(),
            torsion: TorsionConfig::default(),
        }
    }
}

/// Millimeter settings converted to pixels once per configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedGeometry {
    pub min_pupil_radius_px: f64,
    pub max_pupil_radius_px: f64,
    pub max_iris_radius_px: f64,
    pub globe_radius_px: f64,
    pub max_torsion_deg: f64,
}

impl EyeTrackingSettings {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn thresholds_for(&self, eye: Eye) -> IntensityThresholds {
        *self.thresholds.get(eye)
    }

    pub fn crop_for(&self, eye: Eye) -> Option<Roi> {
        *self.crop.get(eye)
    }

    pub fn derived(&self) -> DerivedGeometry {
        let px = |mm: f64| mm / self.mm_per_pixel;
        DerivedGeometry {
            min_pupil_radius_px: px(self.min_pupil_radius_mm),
            max_pupil_radius_px: px(self.max_pupil_radius_mm),
            max_iris_radius_px: px(self.max_iris_radius_mm),
            globe_radius_px: px(self.globe_radius_mm),
            max_torsion_deg: self.max_torsion_deg,
        }
    }

    /// Reject values no pipeline run could make sense of.
    pub fn validate(&self) -> Result<()> {
        fn bad(msg: impl Into<String>) -> Result<()> {
            Err(TrackError::InvalidSettings(msg.into()))
        }
        let positive = [
            ("mm_per_pixel", self.mm_per_pixel),
            ("min_pupil_radius_mm", self.min_pupil_radius_mm),
            ("max_pupil_radius_mm", self.max_pupil_radius_mm),
            ("max_iris_radius_mm", self.max_iris_radius_mm),
            ("globe_radius_mm", self.globe_radius_mm),
            ("torsion.angular_resolution_deg", self.torsion.angular_resolution_deg),
            ("torsion.inner_radius_factor", self.torsion.inner_radius_factor),
            ("torsion.outer_radius_fraction", self.torsion.outer_radius_fraction),
            ("mask.pupil_margin", self.mask.pupil_margin),
        ];
        for (name, v) in positive {
            if !v.is_finite() || v <= 0.0 {
                return bad(format!("{} must be finite and > 0, got {}", name, v));
            }
        }
        if !self.max_torsion_deg.is_finite() || !(0.0..180.0).contains(&self.max_torsion_deg) {
            return bad(format!(
                "max_torsion_deg must be in [0, 180), got {}",
                self.max_torsion_deg
            ));
        }
        if self.min_pupil_radius_mm >= self.max_pupil_radius_mm {
            return bad("min_pupil_radius_mm must be below max_pupil_radius_mm");
        }
        if self.max_pupil_radius_mm >= self.max_iris_radius_mm {
            return bad("max_pupil_radius_mm must be below max_iris_radius_mm");
        }
        if self.max_iris_radius_mm >= self.globe_radius_mm {
            return bad("max_iris_radius_mm must be below globe_radius_mm");
        }
        for eye in [Eye::Left, Eye::Right] {
            let t = self.thresholds_for(eye);
            if t.dark >= t.bright {
                return bad(format!(
                    "{:?} dark threshold {} must be below bright threshold {}",
                    eye, t.dark, t.bright
                ));
            }
        }
        let es = &self.edge_scan;
        if es.n_rays < 8 || es.min_points < 6 {
            return bad("edge_scan needs n_rays >= 8 and min_points >= 6");
        }
        if !es.r_step.is_finite() || es.r_step <= 0.0 || es.min_edge_strength < 0.0 {
            return bad("edge_scan.r_step must be > 0 and min_edge_strength >= 0");
        }
        if self.eyelid.polyline_points < 2 || self.eyelid.max_curvature < 0.0 {
            return bad("eyelid needs polyline_points >= 2 and max_curvature >= 0");
        }
        let t = &self.torsion;
        if t.n_radii == 0 || 360.0 / t.angular_resolution_deg < 8.0 {
            return bad("torsion needs n_radii >= 1 and at least 8 angular bins");
        }
        if t.inner_radius_factor < 1.0 || t.outer_radius_fraction > 1.0 {
            return bad("torsion annulus must lie between pupil and iris boundaries");
        }
        for (name, v) in [
            ("torsion.min_overlap_fraction", t.min_overlap_fraction),
            ("torsion.min_quality", t.min_quality),
            ("torsion.min_reference_coverage", t.min_reference_coverage),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return bad(format!("{} must be in [0, 1], got {}", name, v));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EyeTrackingSettings::default().validate().unwrap();
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let s = EyeTrackingSettings::from_json_str(
            r#"{ "pupil_method": "Centroid", "torsion": { "n_radii": 6 },
                 "thresholds": { "right": { "dark": 40 } } }"#,
        )
        .unwrap();
        assert_eq!(s.pupil_method, PupilMethod::Centroid);
        assert_eq!(s.torsion.n_radii, 6);
        assert_eq!(s.torsion.angular_resolution_deg, 0.5);
        assert_eq!(s.thresholds.right.dark, 40);
        assert_eq!(s.thresholds.right.bright, 220);
        assert_eq!(s.thresholds.left.dark, 60);
    }

    #[test]
    fn json_roundtrip() {
        let mut s = EyeTrackingSettings::default();
        s.crop.right = Some(Roi::new(10, 20, 100, 80));
        let back = EyeTrackingSettings::from_json_str(&s.to_json_string().unwrap()).unwrap();
        assert_eq!(back.crop.right, Some(Roi::new(10, 20, 100, 80)));
        assert_eq!(back.crop.left, None);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut s = EyeTrackingSettings::default();
        s.mm_per_pixel = -0.1;
        assert!(matches!(s.validate(), Err(TrackError::InvalidSettings(_))));

        let mut s = EyeTrackingSettings::default();
        s.thresholds.left = IntensityThresholds {
            dark: 200,
            bright: 100,
        };
        assert!(s.validate().is_err());

        let mut s = EyeTrackingSettings::default();
        s.max_torsion_deg = f64::NAN;
        assert!(s.validate().is_err());
    }

    #[test]
    fn millimeters_convert_to_pixels() {
        let s = EyeTrackingSettings {
            mm_per_pixel: 0.05,
            ..Default::default()
        };
        let g = s.derived();
        assert!((g.max_iris_radius_px - 140.0).abs() < 1e-9);
        assert!((g.min_pupil_radius_px - 10.0).abs() < 1e-9);
    }
}
