use serde::{Deserialize, Serialize};

use crate::conic::Ellipse;
use crate::eyelids::EyelidBoundary;
use crate::frame::FrameInfo;
use crate::torsion::{IrisStrip, TorsionResult};

/// Per-frame outcome of [`EyeTracker::process`](crate::EyeTracker::process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessFrameResult {
    #[default]
    Good,
    /// No dark region of plausible size; later stages were skipped.
    PupilNotFound,
    /// Torsion was measured with low confidence (or not at all).
    LowQuality,
    /// A numeric fault inside a stage; the frame carries no usable data.
    Error,
}

impl ProcessFrameResult {
    pub fn is_good(&self) -> bool {
        matches!(self, ProcessFrameResult::Good)
    }
}

/// Everything extracted from one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeData {
    pub frame: FrameInfo,
    /// Refined pupil, [`Ellipse::NOT_FOUND`] on a miss.
    pub pupil: Ellipse,
    /// Refined limbus, [`Ellipse::NOT_FOUND`] when it could not be traced.
    pub iris: Ellipse,
    pub eyelids: EyelidBoundary,
    /// Clockwise torsion relative to the reference (degrees).
    pub torsion_deg: f64,
    /// Torsion confidence in `[0, 1]`; 0 when torsion was not measured.
    pub data_quality: f64,
    /// Correlation diagnostics, present when torsion was computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torsion: Option<TorsionResult>,
    pub status: ProcessFrameResult,
    /// Reference strip stored by
    /// [`EyeTracker::capture_reference`](crate::EyeTracker::capture_reference).
    /// Per-frame strips stay in the tracker, see
    /// [`EyeTracker::torsion_strip`](crate::EyeTracker::torsion_strip).
    #[serde(skip)]
    pub torsion_strip: Option<IrisStrip>,
}

impl EyeData {
    /// Structurally complete record with degenerate geometry.
    pub fn empty(frame: FrameInfo, status: ProcessFrameResult) -> Self {
        Self {
            frame,
            pupil: Ellipse::NOT_FOUND,
            iris: Ellipse::NOT_FOUND,
            eyelids: EyelidBoundary::default(),
            torsion_deg: 0.0,
            data_quality: 0.0,
            torsion: None,
            status,
            torsion_strip: None,
        }
    }

    /// Render of the iris strip, masked cells black.
    pub fn torsion_image(&self) -> Option<image::GrayImage> {
        self.torsion_strip.as_ref().map(IrisStrip::to_image)
    }
}
