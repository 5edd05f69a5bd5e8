use std::sync::Arc;

use parking_lot::RwLock;

use super::result::EyeData;
use super::tracker::EyeTracker;
use crate::calibration::CalibrationReference;
use crate::error::Result;
use crate::frame::{Eye, ImageFrame};
use crate::settings::EyeTrackingSettings;

/// Calibration shared between a tracker and whoever issues calibration
/// commands. Writers take the write lock; `process` only reads.
pub type SharedCalibration = Arc<RwLock<CalibrationReference>>;

/// Two independent single-eye pipelines run side by side.
///
/// Each eye owns its tracker and scratch buffers; the only shared state is
/// the per-eye calibration behind a read/write lock, so a command applied
/// through [`BinocularTracker::calibration`] is visible to every later
/// [`process_pair`](BinocularTracker::process_pair).
pub struct BinocularTracker {
    left: EyeTracker,
    right: EyeTracker,
    left_calibration: SharedCalibration,
    right_calibration: SharedCalibration,
}

impl BinocularTracker {
    pub fn new(settings: EyeTrackingSettings) -> Result<Self> {
        Ok(Self {
            left: EyeTracker::new(settings.clone())?,
            right: EyeTracker::new(settings)?,
            left_calibration: Arc::new(RwLock::new(CalibrationReference::new(Eye::Left))),
            right_calibration: Arc::new(RwLock::new(CalibrationReference::new(Eye::Right))),
        })
    }

    /// Handle to one eye's calibration. `Both` maps to the left eye.
    pub fn calibration(&self, eye: Eye) -> SharedCalibration {
        match eye {
            Eye::Left | Eye::Both => Arc::clone(&self.left_calibration),
            Eye::Right => Arc::clone(&self.right_calibration),
        }
    }

    pub fn tracker_mut(&mut self, eye: Eye) -> &mut EyeTracker {
        match eye {
            Eye::Left | Eye::Both => &mut self.left,
            Eye::Right => &mut self.right,
        }
    }

    /// Capture the reference of one eye from `frame`, using the tracker and
    /// calibration of that eye.
    pub fn capture_reference(&mut self, eye: Eye, frame: &ImageFrame) -> Result<EyeData> {
        let calibration = self.calibration(eye);
        let mut cal = calibration.write();
        let (data, _) = self.tracker_mut(eye).capture_reference(frame, &mut cal)?;
        Ok(data)
    }

    /// Process a left/right pair concurrently.
    pub fn process_pair(
        &mut self,
        left: &ImageFrame,
        right: &ImageFrame,
    ) -> (Result<EyeData>, Result<EyeData>) {
        let Self {
            left: left_tracker,
            right: right_tracker,
            left_calibration,
            right_calibration,
        } = self;
        rayon::join(
            || left_tracker.process(left, &left_calibration.read()),
            || right_tracker.process(right, &right_calibration.read()),
        )
    }
}
