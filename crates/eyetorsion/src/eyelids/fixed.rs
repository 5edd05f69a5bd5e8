use image::GrayImage;

use super::{parabola_polyline, EyelidBoundary, EyelidDetector};
use crate::calibration::EyePhysicalModel;
use crate::conic::Ellipse;
use crate::settings::{DerivedGeometry, EyeTrackingSettings};

/// No eyelid masking.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenEyelids;

impl EyelidDetector for OpenEyelids {
    fn find_eyelids(
        &self,
        image: &GrayImage,
        _pupil: &Ellipse,
        _model: Option<&EyePhysicalModel>,
    ) -> EyelidBoundary {
        EyelidBoundary::open(image.width(), image.height())
    }
}

/// Straight horizontal lids placed relative to the pupil center.
#[derive(Debug, Clone)]
pub struct FixedEyelids {
    /// Distance of the upper lid above the pupil center (pixels).
    pub upper_offset_px: f64,
    /// Distance of the lower lid below the pupil center (pixels).
    pub lower_offset_px: f64,
    pub polyline_points: usize,
}

impl FixedEyelids {
    pub fn from_settings(settings: &EyeTrackingSettings, geometry: &DerivedGeometry) -> Self {
        Self {
            upper_offset_px: settings.eyelid.fixed_upper_fraction * geometry.max_iris_radius_px,
            lower_offset_px: settings.eyelid.fixed_lower_fraction * geometry.max_iris_radius_px,
            polyline_points: settings.eyelid.polyline_points,
        }
    }

    pub(crate) fn boundary(&self, width: u32, height: u32, pupil: &Ellipse) -> EyelidBoundary {
        if !pupil.is_found() {
            return EyelidBoundary::open(width, height);
        }
        let n = self.polyline_points;
        EyelidBoundary {
            upper: parabola_polyline(width, height, pupil.cx, pupil.cy - self.upper_offset_px, 0.0, n),
            lower: parabola_polyline(width, height, pupil.cx, pupil.cy + self.lower_offset_px, 0.0, n),
        }
    }
}

impl EyelidDetector for FixedEyelids {
    fn find_eyelids(
        &self,
        image: &GrayImage,
        pupil: &Ellipse,
        _model: Option<&EyePhysicalModel>,
    ) -> EyelidBoundary {
        self.boundary(image.width(), image.height(), pupil)
    }
}
