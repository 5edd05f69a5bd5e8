//! Coarse pupil location.
//!
//! Both strategies threshold at the eye's dark level inside the search
//! region and report an ellipse in full-frame coordinates, or `None` when no
//! dark region of plausible size exists.

mod blob;
mod centroid;

use image::GrayImage;

use crate::conic::Ellipse;
use crate::frame::{ImageFrame, Roi};
use crate::pipeline::ProcessFrameResult;
use crate::settings::{DerivedGeometry, EyeTrackingSettings, PupilMethod};

pub use blob::BlobLocator;
pub use centroid::CentroidLocator;
pub(crate) use centroid::Moments;

/// Plausible pupil radius range, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusBounds {
    pub min_px: f64,
    pub max_px: f64,
}

impl RadiusBounds {
    pub fn from_geometry(geometry: &DerivedGeometry) -> Self {
        Self {
            min_px: geometry.min_pupil_radius_px,
            max_px: geometry.max_pupil_radius_px,
        }
    }

    pub fn contains(&self, r: f64) -> bool {
        r.is_finite() && r >= self.min_px && r <= self.max_px
    }
}

/// Coarse pupil strategy.
pub trait PupilLocator: Send + Sync {
    /// Search `roi` of `image` for pixels at or below `dark`.
    ///
    /// `scratch` is a reusable binarization buffer.
    fn locate(
        &self,
        image: &GrayImage,
        roi: Roi,
        dark: u8,
        scratch: &mut GrayImage,
    ) -> Option<Ellipse>;
}

/// Build the locator selected by `settings.pupil_method`.
pub fn build_locator(
    settings: &EyeTrackingSettings,
    geometry: &DerivedGeometry,
) -> Box<dyn PupilLocator> {
    let bounds = RadiusBounds::from_geometry(geometry);
    match settings.pupil_method {
        PupilMethod::Blob => Box::new(BlobLocator::new(bounds)),
        PupilMethod::Centroid => Box::new(CentroidLocator::new(bounds)),
    }
}

/// Search region for `frame`: the eye's crop clamped to the image, or the
/// whole frame.
pub fn search_roi(frame: &ImageFrame, settings: &EyeTrackingSettings) -> Roi {
    let (w, h) = (frame.width(), frame.height());
    settings
        .crop_for(frame.eye)
        .and_then(|r| r.clamp_to(w, h))
        .unwrap_or_else(|| Roi::full(w, h))
}

/// One-shot locate with the strategy from `settings`.
///
/// Returns [`Ellipse::NOT_FOUND`] with [`ProcessFrameResult::PupilNotFound`]
/// on a miss.
pub fn locate(frame: &ImageFrame, settings: &EyeTrackingSettings) -> (Ellipse, ProcessFrameResult) {
    let geometry = settings.derived();
    let locator = build_locator(settings, &geometry);
    let dark = settings.thresholds_for(frame.eye).dark;
    let mut scratch = GrayImage::new(0, 0);
    match locator.locate(&frame.image, search_roi(frame, settings), dark, &mut scratch) {
        Some(e) => (e, ProcessFrameResult::Good),
        None => (Ellipse::NOT_FOUND, ProcessFrameResult::PupilNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Eye;
    use crate::test_utils::{draw_disk, frame, SyntheticEye};

    fn check(method: PupilMethod, img: GrayImage, c: [f64; 2], r: f64) {
        let settings = EyeTrackingSettings {
            pupil_method: method,
            ..Default::default()
        };
        let (e, status) = locate(&frame(img, 0), &settings);
        assert_eq!(status, ProcessFrameResult::Good, "{method:?}");
        let d = ((e.cx - c[0]).powi(2) + (e.cy - c[1]).powi(2)).sqrt();
        assert!(d < 1.0, "{method:?} center off by {d}");
        for radius in [e.a, e.b] {
            assert!((radius - r).abs() < 0.05 * r, "{method:?} radius {radius} vs {r}");
        }
    }

    #[test]
    fn dark_disk_is_found_by_both_strategies() {
        for method in [PupilMethod::Blob, PupilMethod::Centroid] {
            check(method, draw_disk(160, 120, [71.4, 58.2], 17.0, 15, 180), [71.4, 58.2], 17.0);
            check(method, draw_disk(160, 120, [90.0, 61.7], 12.0, 10, 200), [90.0, 61.7], 12.0);
        }
    }

    #[test]
    fn pupil_inside_textured_iris() {
        let eye = SyntheticEye::default();
        for method in [PupilMethod::Blob, PupilMethod::Centroid] {
            check(method, eye.render(), eye.center, eye.pupil_radius);
        }
    }

    #[test]
    fn missing_pupil_is_a_status_not_an_error() {
        let img = GrayImage::from_pixel(100, 80, image::Luma([150]));
        for method in [PupilMethod::Blob, PupilMethod::Centroid] {
            let settings = EyeTrackingSettings {
                pupil_method: method,
                ..Default::default()
            };
            let (e, status) = locate(&frame(img.clone(), 0), &settings);
            assert_eq!(status, ProcessFrameResult::PupilNotFound);
            assert!(!e.is_found());
        }
    }

    #[test]
    fn too_small_blob_is_rejected() {
        // 2 px radius is below the 5 px minimum at 0.1 mm/px.
        let img = draw_disk(100, 80, [50.0, 40.0], 2.0, 10, 180);
        let (_, status) = locate(&frame(img, 0), &EyeTrackingSettings::default());
        assert_eq!(status, ProcessFrameResult::PupilNotFound);
    }

    #[test]
    fn oversized_dark_region_is_not_a_pupil() {
        // Radius 55 px: above the 45 px pupil limit, below the 70 px iris limit.
        let img = draw_disk(200, 160, [100.0, 80.0], 55.0, 10, 180);
        for method in [PupilMethod::Blob, PupilMethod::Centroid] {
            let mut settings = EyeTrackingSettings {
                pupil_method: method,
                ..Default::default()
            };
            let (_, status) = locate(&frame(img.clone(), 0), &settings);
            assert_eq!(status, ProcessFrameResult::PupilNotFound, "{method:?}");

            settings.max_pupil_radius_mm = 6.0;
            let (e, status) = locate(&frame(img.clone(), 0), &settings);
            assert_eq!(status, ProcessFrameResult::Good, "{method:?}");
            assert!((e.mean_radius() - 55.0).abs() < 2.75, "{method:?} {e:?}");
        }
    }

    #[test]
    fn crop_limits_search_and_keeps_frame_coordinates() {
        let mut img = draw_disk(200, 100, [40.0, 50.0], 15.0, 10, 180);
        let right = draw_disk(200, 100, [150.2, 49.4], 12.0, 10, 180);
        for (x, y, p) in right.enumerate_pixels() {
            if x >= 100 {
                img.put_pixel(x, y, *p);
            }
        }
        let mut settings = EyeTrackingSettings::default();
        settings.crop.right = Some(Roi::new(100, 0, 100, 100));
        let f = ImageFrame::new(img, 3, 0.05, Eye::Right);
        let (e, status) = locate(&f, &settings);
        assert_eq!(status, ProcessFrameResult::Good);
        assert!((e.cx - 150.2).abs() < 1.0 && (e.cy - 49.4).abs() < 1.0);
    }
}
