use tracing::{debug, trace, warn};

use super::result::{EyeData, ProcessFrameResult};
use super::workspace::Workspace;
use crate::calibration::{CalibrationReference, CalibrationState, EyePhysicalModel};
use crate::conic::Ellipse;
use crate::error::{Result, TrackError};
use crate::eyelids::{self, EyelidBoundary, EyelidDetector};
use crate::frame::ImageFrame;
use crate::mask;
use crate::pupil::{self, PupilLocator};
use crate::refine::{self, BoundaryTarget, PositionRefiner, RefineError, RefineInput};
use crate::settings::{DerivedGeometry, EyeTrackingSettings, TorsionMode};
use crate::torsion::{IrisStrip, TorsionEstimator};

/// Output of the segmentation stages shared by tracking and reference capture.
struct Segmentation {
    pupil: Ellipse,
    iris: Ellipse,
    eyelids: EyelidBoundary,
    status: ProcessFrameResult,
}

/// Single-eye pipeline: locate → eyelids → mask → refine → torsion.
///
/// Strategies are selected once from the settings. The tracker keeps no
/// history between frames beyond its scratch buffers, so reprocessing a
/// frame with the same calibration gives the same [`EyeData`].
pub struct EyeTracker {
    settings: EyeTrackingSettings,
    geometry: DerivedGeometry,
    locator: Box<dyn PupilLocator>,
    eyelids: Box<dyn EyelidDetector>,
    refiner: Box<dyn PositionRefiner>,
    torsion: TorsionEstimator,
    workspace: Workspace,
}

impl EyeTracker {
    /// Validate `settings` and build the configured strategies.
    pub fn new(settings: EyeTrackingSettings) -> Result<Self> {
        settings.validate()?;
        let geometry = settings.derived();
        let torsion = TorsionEstimator::new(
            &settings.torsion,
            geometry.max_torsion_deg,
            geometry.max_iris_radius_px,
        );
        debug!(
            pupil = ?settings.pupil_method,
            eyelid = ?settings.eyelid_method,
            position = ?settings.position_method,
            torsion = ?settings.torsion_mode,
            max_iris_px = geometry.max_iris_radius_px,
            "eye tracker configured"
        );
        Ok(Self {
            locator: pupil::build_locator(&settings, &geometry),
            eyelids: eyelids::build_detector(&settings, &geometry),
            refiner: refine::build_refiner(&settings, &geometry),
            workspace: Workspace::new(torsion.empty_strip()),
            torsion,
            geometry,
            settings,
        })
    }

    pub fn settings(&self) -> &EyeTrackingSettings {
        &self.settings
    }

    pub fn geometry(&self) -> &DerivedGeometry {
        &self.geometry
    }

    /// Resampled iris strip of the last [`process`](Self::process) call,
    /// when it measured torsion. Overwritten by the next call.
    pub fn torsion_strip(&self) -> Option<&IrisStrip> {
        self.workspace.has_strip.then_some(&self.workspace.strip)
    }

    /// Process one frame against `calibration`, which is only read.
    ///
    /// Segmentation misses come back as `Ok` with a non-`Good` status.
    /// `Err` is reserved for an empty frame, torsion requested without a
    /// `Ready` calibration, or a reference sampled on another grid.
    pub fn process(
        &mut self,
        frame: &ImageFrame,
        calibration: &CalibrationReference,
    ) -> Result<EyeData> {
        self.workspace.has_strip = false;
        if frame.is_empty() {
            return Err(TrackError::EmptyFrame);
        }
        let ready = match self.settings.torsion_mode {
            TorsionMode::Disabled => None,
            TorsionMode::Masked | TorsionMode::Unmasked => {
                let (model, reference) = calibration.require_ready()?;
                self.torsion.check_reference(reference)?;
                Some((model, reference))
            }
        };

        let seg = self.segment(frame, calibration.model());
        let mut data = EyeData {
            pupil: seg.pupil,
            iris: seg.iris,
            eyelids: seg.eyelids,
            ..EyeData::empty(frame.info(), seg.status)
        };
        if seg.status != ProcessFrameResult::Good {
            return Ok(data);
        }
        let Some((model, reference)) = ready else {
            return Ok(data);
        };

        let masked = self.prepare_torsion_mask(&data.pupil);
        let result = self.torsion.calculate_torsion_angle(
            &frame.image,
            model,
            reference,
            masked.then_some(&self.workspace.occlusion),
            &data.pupil,
            &data.iris,
            &mut self.workspace.strip,
        )?;
        self.workspace.has_strip = true;
        data.torsion_deg = result.angle_deg;
        data.data_quality = result.quality;
        data.torsion = Some(result);
        if result.quality < self.settings.torsion.min_quality {
            debug!(
                frame = frame.frame_number,
                quality = result.quality,
                overlap = result.overlap,
                "torsion below quality threshold"
            );
            data.status = ProcessFrameResult::LowQuality;
        }
        trace!(
            frame = frame.frame_number,
            torsion_deg = data.torsion_deg,
            quality = data.data_quality,
            psr = result.psr,
            "frame processed"
        );
        Ok(data)
    }

    /// Globe directly behind the pupil of `frame`, with the configured
    /// globe radius. `None` when no pupil is found.
    pub fn eye_model_from_frame(&mut self, frame: &ImageFrame) -> Result<Option<EyePhysicalModel>> {
        if frame.is_empty() {
            return Err(TrackError::EmptyFrame);
        }
        let seg = self.segment(frame, None);
        if seg.status != ProcessFrameResult::Good {
            return Ok(None);
        }
        Ok(Some(EyePhysicalModel::from_pupil(
            &seg.pupil,
            self.geometry.globe_radius_px,
        )))
    }

    /// Segment `frame`, resample its iris and store it as the reference.
    ///
    /// Needs an eye model in `calibration`. A frame without a usable pupil
    /// stores nothing; the returned record carries the reason and the
    /// calibration state is left unchanged.
    pub fn capture_reference(
        &mut self,
        frame: &ImageFrame,
        calibration: &mut CalibrationReference,
    ) -> Result<(EyeData, CalibrationState)> {
        if frame.is_empty() {
            return Err(TrackError::EmptyFrame);
        }
        let model = *calibration.model().ok_or(TrackError::NoEyeModel)?;
        let seg = self.segment(frame, Some(&model));
        let mut data = EyeData {
            pupil: seg.pupil,
            iris: seg.iris,
            eyelids: seg.eyelids,
            ..EyeData::empty(frame.info(), seg.status)
        };
        if seg.status != ProcessFrameResult::Good {
            warn!(
                frame = frame.frame_number,
                status = ?seg.status,
                "reference frame rejected"
            );
            return Ok((data, calibration.state()));
        }

        let masked = self.prepare_torsion_mask(&data.pupil);
        let mut strip = self.torsion.empty_strip();
        self.torsion.resample(
            &frame.image,
            masked.then_some(&self.workspace.occlusion),
            Some(&model),
            &data.pupil,
            &data.iris,
            &mut strip,
        );
        data.data_quality = strip.coverage();
        data.torsion_strip = Some(strip.clone());
        let state = calibration.set_reference(
            strip,
            frame.info(),
            self.settings.torsion.min_reference_coverage,
        )?;
        Ok((data, state))
    }

    /// Narrow the frame's occlusion mask to the iris annulus when the
    /// configured mode masks torsion. `false` means sample unmasked.
    fn prepare_torsion_mask(&mut self, pupil: &Ellipse) -> bool {
        match self.settings.torsion_mode {
            TorsionMode::Masked => {
                self.workspace.occlusion.restrict_to_annulus(
                    pupil,
                    self.geometry.max_iris_radius_px,
                    &self.settings.mask,
                );
                true
            }
            TorsionMode::Unmasked | TorsionMode::Disabled => false,
        }
    }

    /// Pupil location, eyelids, occlusion mask and boundary refinement.
    fn segment(&mut self, frame: &ImageFrame, model: Option<&EyePhysicalModel>) -> Segmentation {
        let image = &frame.image;
        let (w, h) = image.dimensions();
        let thresholds = self.settings.thresholds_for(frame.eye);
        let roi = pupil::search_roi(frame, &self.settings);

        let Some(coarse) = self
            .locator
            .locate(image, roi, thresholds.dark, &mut self.workspace.binary)
        else {
            debug!(frame = frame.frame_number, "pupil not found");
            return Segmentation {
                pupil: Ellipse::NOT_FOUND,
                iris: Ellipse::NOT_FOUND,
                eyelids: EyelidBoundary::open(w, h),
                status: ProcessFrameResult::PupilNotFound,
            };
        };

        let eyelids = self.eyelids.find_eyelids(image, &coarse, model);
        mask::occlusion_mask_into(
            image,
            &eyelids,
            thresholds.bright,
            &self.settings.mask,
            &mut self.workspace.reflections,
            &mut self.workspace.occlusion,
        );
        let input = RefineInput {
            image,
            mask: &self.workspace.occlusion,
            dark: thresholds.dark,
            bright: thresholds.bright,
        };

        let mut status = ProcessFrameResult::Good;
        let pupil = match self.refiner.refine(
            &input,
            &coarse,
            BoundaryTarget::Pupil,
            &mut self.workspace.edge,
        ) {
            Ok(p) => p,
            Err(e) => {
                status = stage_fault(frame, "pupil", &e).unwrap_or(status);
                coarse
            }
        };
        let iris = if status == ProcessFrameResult::Good {
            match self.refiner.refine(
                &input,
                &pupil,
                BoundaryTarget::Iris,
                &mut self.workspace.edge,
            ) {
                Ok(i) => i,
                Err(e) => {
                    status = stage_fault(frame, "iris", &e).unwrap_or(status);
                    Ellipse::NOT_FOUND
                }
            }
        } else {
            Ellipse::NOT_FOUND
        };

        trace!(
            frame = frame.frame_number,
            cx = pupil.cx,
            cy = pupil.cy,
            a = pupil.a,
            b = pupil.b,
            iris_found = iris.is_found(),
            "segmentation"
        );
        Segmentation {
            pupil,
            iris,
            eyelids,
            status,
        }
    }
}

/// `Some(Error)` for numeric faults; segmentation shortfalls fall back
/// silently to the coarse estimate.
fn stage_fault(frame: &ImageFrame, stage: &str, err: &RefineError) -> Option<ProcessFrameResult> {
    if err.is_numeric() {
        warn!(frame = frame.frame_number, stage, error = %err, "boundary fit failed");
        Some(ProcessFrameResult::Error)
    } else {
        debug!(frame = frame.frame_number, stage, error = %err, "boundary refinement skipped");
        None
    }
}
