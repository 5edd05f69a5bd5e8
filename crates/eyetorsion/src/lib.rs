//! Per-frame eye-video analysis.
//!
//! For every grayscale eye image the pipeline:
//!
//! 1. **Pupil**: coarse dark-region location (blob contour or moments).
//! 2. **Eyelids**: upper/lower lid curves (open, fixed offsets, or arc voting).
//! 3. **Mask**: eyelid, reflection and iris-annulus exclusion.
//! 4. **Refine**: sub-pixel pupil and limbus ellipses from radial edge scans.
//! 5. **Torsion**: iris strip resampled on the iris plane and correlated
//!    against a calibrated reference.
//!
//! # Public API
//! - [`EyeTracker`] / [`BinocularTracker`] as entry points
//! - [`EyeTrackingSettings`] for strategy selection and tuning
//! - [`CalibrationReference`] for the eye model and reference pattern
//! - [`EyeData`] per frame, with [`ProcessFrameResult`] as status
//!
//! ```no_run
//! use eyetorsion::{CalibrationReference, Eye, EyeTracker, EyeTrackingSettings, ImageFrame};
//!
//! let mut tracker = EyeTracker::new(EyeTrackingSettings::default()).unwrap();
//! let mut calibration = CalibrationReference::new(Eye::Left);
//! let first = ImageFrame::new(image::GrayImage::new(320, 240), 0, 0.0, Eye::Left);
//! if let Some(model) = tracker.eye_model_from_frame(&first).unwrap() {
//!     calibration.set_eye_model(model).unwrap();
//!     tracker.capture_reference(&first, &mut calibration).unwrap();
//! }
//! let data = tracker.process(&first, &calibration);
//! ```

pub mod calibration;
pub mod conic;
mod error;
pub mod eyelids;
mod frame;
pub mod mask;
mod pipeline;
pub mod pupil;
pub mod refine;
mod sampling;
mod settings;
pub mod torsion;

#[cfg(test)]
pub(crate) mod test_utils;

pub use calibration::{
    CalibrationReference, CalibrationState, EyeModelEstimator, EyePhysicalModel, ReferencePattern,
};
pub use conic::Ellipse;
pub use error::{Result, TrackError};
pub use eyelids::EyelidBoundary;
pub use frame::{Eye, FrameInfo, ImageFrame, Roi};
pub use mask::Mask;
pub use pipeline::{BinocularTracker, EyeData, EyeTracker, ProcessFrameResult, SharedCalibration};
pub use settings::{
    DerivedGeometry, EdgeScanConfig, EyeTrackingSettings, EyelidConfig, EyelidMethod,
    IntensityThresholds, MaskConfig, PerEye, PositionMethod, PupilMethod, TorsionConfig,
    TorsionMode,
};
pub use torsion::{IrisStrip, TorsionResult};
