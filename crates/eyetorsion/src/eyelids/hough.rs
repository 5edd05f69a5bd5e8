use image::{GrayImage, ImageBuffer, Luma};

use super::{parabola_polyline, EyelidBoundary, EyelidDetector, FixedEyelids};
use crate::calibration::EyePhysicalModel;
use crate::conic::Ellipse;
use crate::settings::EyelidConfig;

/// Vertical Scharr gain for a unit intensity step.
const SCHARR_GAIN: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct LidCandidate {
    y0: f64,
    k: f64,
    votes: usize,
    strength: f32,
}

impl LidCandidate {
    fn beats(&self, other: &LidCandidate) -> bool {
        (self.votes, self.strength) > (other.votes, other.strength)
    }
}

/// Parabolic arc voting over vertical gradients.
///
/// Each hypothesis is `y = y0 + k (x - cx)^2` with `cx` the pupil column.
/// Upper lids bend downward away from the pupil column (`k ≥ 0`), lower lids
/// bend upward (`k ≤ 0`). A column votes for a hypothesis when the gradient
/// magnitude on the curve exceeds `min_gradient`.
#[derive(Debug, Clone)]
pub struct HoughEyelids {
    config: EyelidConfig,
    max_iris_radius_px: f64,
    fallback: FixedEyelids,
}

impl HoughEyelids {
    pub fn new(config: EyelidConfig, max_iris_radius_px: f64, fallback: FixedEyelids) -> Self {
        Self {
            config,
            max_iris_radius_px,
            fallback,
        }
    }

    fn curvatures(&self, sign: f64) -> Vec<f64> {
        let steps = self.config.curvature_steps;
        (0..=steps)
            .map(|j| {
                if steps == 0 {
                    0.0
                } else {
                    sign * self.config.max_curvature * j as f64 / steps as f64
                }
            })
            .collect()
    }

    fn vote(
        &self,
        grad: &ImageBuffer<Luma<i16>, Vec<i16>>,
        cx: f64,
        cols: &[u32],
        rows: (f64, f64),
        sign: f64,
    ) -> Option<LidCandidate> {
        let h = grad.height() as f64;
        let (lo, hi) = (rows.0.max(1.0), rows.1.min(h - 2.0));
        if hi < lo {
            return None;
        }
        let mut best: Option<LidCandidate> = None;
        for k in self.curvatures(sign) {
            let mut y0 = lo;
            while y0 <= hi {
                let mut cand = LidCandidate {
                    y0,
                    k,
                    votes: 0,
                    strength: 0.0,
                };
                for &x in cols {
                    let dx = x as f64 - cx;
                    let y = (y0 + k * dx * dx).round();
                    if y < 0.0 || y >= h {
                        continue;
                    }
                    let g = grad.get_pixel(x, y as u32)[0].unsigned_abs() as f32 / SCHARR_GAIN;
                    if g >= self.config.min_gradient {
                        cand.votes += 1;
                        cand.strength += g;
                    }
                }
                if best.as_ref().map_or(true, |b| cand.beats(b)) {
                    best = Some(cand);
                }
                y0 += 1.0;
            }
        }
        best
    }
}

impl EyelidDetector for HoughEyelids {
    fn find_eyelids(
        &self,
        image: &GrayImage,
        pupil: &Ellipse,
        model: Option<&EyePhysicalModel>,
    ) -> EyelidBoundary {
        let (w, h) = image.dimensions();
        let fixed = self.fallback.boundary(w, h, pupil);
        if !pupil.is_found() || w < 3 || h < 3 {
            return fixed;
        }

        let span = model
            .map(|m| m.radius)
            .unwrap_or(1.5 * self.max_iris_radius_px)
            .max(pupil.a);
        let x_lo = (pupil.cx - span).max(0.0) as u32;
        let x_hi = ((pupil.cx + span).min((w - 1) as f64)).max(0.0) as u32;
        let cols: Vec<u32> = (x_lo..=x_hi).step_by(2).collect();
        if cols.is_empty() {
            return fixed;
        }
        let min_votes = (self.config.min_vote_fraction * cols.len() as f32).ceil() as usize;

        let grad = imageproc::gradients::vertical_scharr(image);
        let clear = 1.1 * pupil.b + 2.0;
        let reach = 1.2 * self.max_iris_radius_px;

        let upper = self.vote(&grad, pupil.cx, &cols, (pupil.cy - reach, pupil.cy - clear), 1.0);
        let lower = self.vote(&grad, pupil.cx, &cols, (pupil.cy + clear, pupil.cy + reach), -1.0);

        let n = self.config.polyline_points;
        let pick = |cand: Option<LidCandidate>, fallback: Vec<[f64; 2]>, side: &str| match cand {
            Some(c) if c.votes >= min_votes.max(1) => {
                tracing::trace!(side, y0 = c.y0, k = c.k, votes = c.votes, "eyelid arc");
                parabola_polyline(w, h, pupil.cx, c.y0, c.k, n)
            }
            _ => {
                tracing::debug!(
                    side,
                    votes = cand.map_or(0, |c| c.votes),
                    min_votes,
                    "eyelid vote below threshold, using fixed lid"
                );
                fallback
            }
        };

        EyelidBoundary {
            upper: pick(upper, fixed.upper, "upper"),
            lower: pick(lower, fixed.lower, "lower"),
        }
    }
}
