//! Precondition and I/O faults returned to the caller.
//!
//! Segmentation misses are not errors; they travel as
//! [`ProcessFrameResult`](crate::ProcessFrameResult) inside [`EyeData`](crate::EyeData).

use thiserror::Error;

use crate::calibration::CalibrationState;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("frame has no pixels")]
    EmptyFrame,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("torsion requested but calibration is {0:?}, not Ready")]
    CalibrationNotReady(CalibrationState),

    #[error("no eye model set")]
    NoEyeModel,

    #[error("no reference pattern to reset")]
    NoReference,

    #[error("reference pattern geometry does not match the torsion settings: {0}")]
    IncompatibleReference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrackError>;
