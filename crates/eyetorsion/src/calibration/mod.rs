//! Per-eye calibration: globe model plus reference iris pattern.
//!
//! ```text
//! Uncalibrated --set_eye_model--> ModelSet --set_reference--> ReferenceSet | Ready
//!                                    ^                             |
//!                                    +------ reset_reference ------+
//! ```
//!
//! `set_eye_model` is accepted in every state and always lands in
//! `ModelSet`, dropping any stored reference.
//!
//! A stored reference reaches `Ready` only when enough of the strip was
//! valid; a sparse reference stays at `ReferenceSet` and torsion is refused.

mod estimator;
mod model;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TrackError};
use crate::frame::{Eye, FrameInfo};
use crate::torsion::IrisStrip;

pub use estimator::EyeModelEstimator;
pub use model::EyePhysicalModel;

/// Lifecycle of a [`CalibrationReference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CalibrationState {
    #[default]
    Uncalibrated,
    ModelSet,
    /// A reference is stored but covers too little of the iris to be used.
    ReferenceSet,
    Ready,
}

/// Zero-torsion iris pattern and the frame it was captured from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePattern {
    pub strip: IrisStrip,
    pub source: FrameInfo,
}

/// Calibration context for one eye.
///
/// Owned by the caller and passed by reference into
/// [`EyeTracker::process`](crate::EyeTracker::process), which only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReference {
    eye: Eye,
    state: CalibrationState,
    model: Option<EyePhysicalModel>,
    reference: Option<ReferencePattern>,
}

impl CalibrationReference {
    pub fn new(eye: Eye) -> Self {
        Self {
            eye,
            state: CalibrationState::Uncalibrated,
            model: None,
            reference: None,
        }
    }

    pub fn eye(&self) -> Eye {
        self.eye
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CalibrationState::Ready
    }

    pub fn model(&self) -> Option<&EyePhysicalModel> {
        self.model.as_ref()
    }

    pub fn reference(&self) -> Option<&ReferencePattern> {
        self.reference.as_ref()
    }

    /// Assign the globe. Any stored reference is discarded.
    pub fn set_eye_model(&mut self, model: EyePhysicalModel) -> Result<CalibrationState> {
        if !model.is_valid() {
            return Err(TrackError::InvalidSettings(format!(
                "eye model must have finite center and positive radius, got {:?}",
                model
            )));
        }
        if self.reference.take().is_some() {
            info!(eye = ?self.eye, "calibration: eye model changed, reference discarded");
        }
        self.model = Some(model);
        self.state = CalibrationState::ModelSet;
        info!(
            eye = ?self.eye,
            cx = model.center[0],
            cy = model.center[1],
            radius = model.radius,
            "calibration: eye model set"
        );
        Ok(self.state)
    }

    /// Store `strip` as the zero-torsion reference.
    ///
    /// Requires a model. The new state is `Ready` when the strip's valid
    /// coverage reaches `min_coverage`, `ReferenceSet` otherwise.
    pub fn set_reference(
        &mut self,
        strip: IrisStrip,
        source: FrameInfo,
        min_coverage: f64,
    ) -> Result<CalibrationState> {
        if self.model.is_none() {
            warn!(eye = ?self.eye, "calibration: reference offered before eye model");
            return Err(TrackError::NoEyeModel);
        }
        if let Some(e) = strip.layout_error() {
            return Err(TrackError::IncompatibleReference(e));
        }
        let coverage = strip.coverage();
        self.state = if coverage >= min_coverage {
            CalibrationState::Ready
        } else {
            warn!(
                eye = ?self.eye,
                coverage,
                min_coverage,
                "calibration: reference too sparse for torsion"
            );
            CalibrationState::ReferenceSet
        };
        self.reference = Some(ReferencePattern { strip, source });
        info!(
            eye = ?self.eye,
            frame = source.frame_number,
            coverage,
            state = ?self.state,
            "calibration: reference set"
        );
        Ok(self.state)
    }

    /// Drop the stored reference and fall back to `ModelSet`.
    ///
    /// Fails with [`TrackError::NoReference`] when there is nothing to reset;
    /// the state is left untouched in that case.
    pub fn reset_reference(&mut self) -> Result<CalibrationState> {
        if self.reference.take().is_none() {
            return Err(TrackError::NoReference);
        }
        self.state = CalibrationState::ModelSet;
        info!(eye = ?self.eye, "calibration: reference reset");
        Ok(self.state)
    }

    /// Model and reference strip, or [`TrackError::CalibrationNotReady`].
    pub fn require_ready(&self) -> Result<(&EyePhysicalModel, &IrisStrip)> {
        match (self.state, &self.model, &self.reference) {
            (CalibrationState::Ready, Some(m), Some(r)) => Ok((m, &r.strip)),
            _ => Err(TrackError::CalibrationNotReady(self.state)),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and check that the stored state agrees with its contents.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cal: Self = serde_json::from_str(s)?;
        cal.check_consistent()?;
        Ok(cal)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    fn check_consistent(&self) -> Result<()> {
        use CalibrationState::*;
        let ok = match self.state {
            Uncalibrated => self.model.is_none() && self.reference.is_none(),
            ModelSet => self.model.is_some() && self.reference.is_none(),
            ReferenceSet | Ready => self.model.is_some() && self.reference.is_some(),
        };
        let model_ok = self.model.map_or(true, |m| m.is_valid());
        if !(ok && model_ok) {
            return Err(TrackError::InvalidSettings(format!(
                "calibration state {:?} does not match its stored model/reference",
                self.state
            )));
        }
        match self.reference.as_ref().and_then(|r| r.strip.layout_error()) {
            Some(e) => Err(TrackError::InvalidSettings(format!(
                "calibration reference strip: {e}"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(n: u64) -> FrameInfo {
        FrameInfo {
            frame_number: n,
            timestamp: n as f64 * 0.25,
            eye: Eye::Left,
            width: 240,
            height: 200,
        }
    }

    fn full_strip() -> IrisStrip {
        let mut s = IrisStrip::new(2, 8, 45.0);
        for ri in 0..2 {
            for a in 0..8 {
                s.set(ri, a, Some((ri * 8 + a) as f32));
            }
        }
        s
    }

    fn model() -> EyePhysicalModel {
        EyePhysicalModel::new([120.0, 100.0], 120.0)
    }

    #[test]
    fn full_lifecycle() {
        let mut cal = CalibrationReference::new(Eye::Left);
        assert_eq!(cal.state(), CalibrationState::Uncalibrated);
        assert!(matches!(
            cal.require_ready(),
            Err(TrackError::CalibrationNotReady(CalibrationState::Uncalibrated))
        ));

        assert_eq!(cal.set_eye_model(model()).unwrap(), CalibrationState::ModelSet);
        assert_eq!(
            cal.set_reference(full_strip(), info(0), 0.3).unwrap(),
            CalibrationState::Ready
        );
        let (m, s) = cal.require_ready().unwrap();
        assert_eq!(*m, model());
        assert_eq!(s.valid_count(), 16);

        assert_eq!(cal.reset_reference().unwrap(), CalibrationState::ModelSet);
        assert!(cal.reference().is_none());
        assert!(cal.model().is_some());
    }

    #[test]
    fn reset_without_reference_is_an_error() {
        let mut cal = CalibrationReference::new(Eye::Right);
        assert!(matches!(cal.reset_reference(), Err(TrackError::NoReference)));
        assert_eq!(cal.state(), CalibrationState::Uncalibrated);
        cal.set_eye_model(model()).unwrap();
        assert!(matches!(cal.reset_reference(), Err(TrackError::NoReference)));
        assert_eq!(cal.state(), CalibrationState::ModelSet);
    }

    #[test]
    fn new_model_invalidates_reference() {
        let mut cal = CalibrationReference::new(Eye::Left);
        cal.set_eye_model(model()).unwrap();
        cal.set_reference(full_strip(), info(3), 0.3).unwrap();
        assert!(cal.is_ready());
        let moved = EyePhysicalModel::new([130.0, 100.0], 118.0);
        assert_eq!(cal.set_eye_model(moved).unwrap(), CalibrationState::ModelSet);
        assert!(cal.reference().is_none());
        assert!(matches!(
            cal.require_ready(),
            Err(TrackError::CalibrationNotReady(CalibrationState::ModelSet))
        ));
    }

    #[test]
    fn reference_needs_model_and_coverage() {
        let mut cal = CalibrationReference::new(Eye::Left);
        assert!(matches!(
            cal.set_reference(full_strip(), info(0), 0.3),
            Err(TrackError::NoEyeModel)
        ));
        cal.set_eye_model(model()).unwrap();
        assert!(matches!(
            cal.set_reference(IrisStrip::new(2, 8, 40.0), info(0), 0.3),
            Err(TrackError::IncompatibleReference(_))
        ));
        assert_eq!(cal.state(), CalibrationState::ModelSet);
        let mut sparse = IrisStrip::new(2, 8, 45.0);
        sparse.set(0, 0, Some(1.0));
        assert_eq!(
            cal.set_reference(sparse, info(1), 0.3).unwrap(),
            CalibrationState::ReferenceSet
        );
        assert!(cal.require_ready().is_err());
    }

    #[test]
    fn invalid_model_is_rejected() {
        let mut cal = CalibrationReference::new(Eye::Left);
        let bad = EyePhysicalModel::new([f64::NAN, 0.0], 100.0);
        assert!(matches!(cal.set_eye_model(bad), Err(TrackError::InvalidSettings(_))));
        assert_eq!(cal.state(), CalibrationState::Uncalibrated);
    }

    #[test]
    fn json_round_trip_and_consistency() {
        let mut cal = CalibrationReference::new(Eye::Left);
        cal.set_eye_model(model()).unwrap();
        cal.set_reference(full_strip(), info(7), 0.3).unwrap();
        let json = cal.to_json_string().unwrap();
        let back = CalibrationReference::from_json_str(&json).unwrap();
        assert_eq!(back, cal);

        let tampered = json.replace("\"Ready\"", "\"ModelSet\"");
        assert!(matches!(
            CalibrationReference::from_json_str(&tampered),
            Err(TrackError::InvalidSettings(_))
        ));
    }

    fn edited(cal: &CalibrationReference, edit: impl FnOnce(&mut serde_json::Value)) -> String {
        let mut v = serde_json::to_value(cal).unwrap();
        edit(&mut v["reference"]["strip"]);
        v.to_string()
    }

    #[test]
    fn malformed_reference_strip_is_rejected_on_load() {
        let mut cal = CalibrationReference::new(Eye::Left);
        cal.set_eye_model(model()).unwrap();
        cal.set_reference(full_strip(), info(2), 0.3).unwrap();

        let truncated = edited(&cal, |s| {
            for key in ["values", "valid"] {
                s[key].as_array_mut().unwrap().truncate(10);
            }
        });
        let zero_angles = edited(&cal, |s| s["n_angles"] = 0.into());
        let wrong_step = edited(&cal, |s| s["angular_resolution_deg"] = 30.0.into());
        for json in [truncated, zero_angles, wrong_step] {
            assert!(matches!(
                CalibrationReference::from_json_str(&json),
                Err(TrackError::InvalidSettings(_))
            ));
        }
    }
}
