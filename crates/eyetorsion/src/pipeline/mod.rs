//! Per-frame orchestration.
//!
//! [`EyeTracker`] sequences the stages for one eye:
//! pupil locator -> eyelid detector -> occlusion mask -> pupil/iris
//! refinement -> torsion. A miss in the locator short-circuits to
//! [`ProcessFrameResult::PupilNotFound`] with a structurally complete
//! [`EyeData`]. [`BinocularTracker`] runs two of them in parallel.

mod binocular;
mod result;
mod tracker;
mod workspace;

pub use binocular::{BinocularTracker, SharedCalibration};
pub use result::{EyeData, ProcessFrameResult};
pub use tracker::EyeTracker;
