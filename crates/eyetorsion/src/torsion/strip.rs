//! Polar iris strip: the annulus between pupil and limbus resampled on a
//! `[radius][angle]` grid.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::mask::Mask;
use crate::sampling;

/// Resampled iris annulus, row-major `[radius][angle]`.
///
/// Angle bin `a` covers `a · angular_resolution_deg` measured from the image
/// `+x` axis towards `+y` (clockwise on screen). Radial rows run from the
/// pupil side outward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrisStrip {
    pub n_radii: usize,
    pub n_angles: usize,
    pub angular_resolution_deg: f64,
    values: Vec<f32>,
    valid: Vec<bool>,
}

impl IrisStrip {
    pub fn new(n_radii: usize, n_angles: usize, angular_resolution_deg: f64) -> Self {
        Self {
            n_radii,
            n_angles,
            angular_resolution_deg,
            values: vec![0.0; n_radii * n_angles],
            valid: vec![false; n_radii * n_angles],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, ri: usize, ai: usize) -> Option<f32> {
        let i = ri * self.n_angles + ai;
        self.valid[i].then(|| self.values[i])
    }

    #[inline]
    pub fn set(&mut self, ri: usize, ai: usize, value: Option<f32>) {
        let i = ri * self.n_angles + ai;
        self.valid[i] = value.is_some();
        self.values[i] = value.unwrap_or(0.0);
    }

    /// Values and validity of one radial row.
    pub fn row(&self, ri: usize) -> (&[f32], &[bool]) {
        let s = ri * self.n_angles;
        let e = s + self.n_angles;
        (&self.values[s..e], &self.valid[s..e])
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Fraction of valid cells.
    pub fn coverage(&self) -> f64 {
        if self.valid.is_empty() {
            return 0.0;
        }
        self.valid_count() as f64 / self.valid.len() as f64
    }

    /// Same grid and same buffer sizes.
    pub fn same_layout(&self, other: &IrisStrip) -> bool {
        self.n_radii == other.n_radii
            && self.n_angles == other.n_angles
            && (self.angular_resolution_deg - other.angular_resolution_deg).abs() < 1e-9
            && self.values.len() == other.values.len()
            && self.valid.len() == other.valid.len()
    }

    /// Why this strip cannot be indexed as declared, if it cannot.
    ///
    /// Strips built with [`IrisStrip::new`] are always well formed; a
    /// deserialized one may not be.
    pub fn layout_error(&self) -> Option<String> {
        let cells = self.n_radii.checked_mul(self.n_angles);
        if self.n_radii == 0 || self.n_angles == 0 {
            return Some(format!("empty grid {}x{}", self.n_radii, self.n_angles));
        }
        if cells != Some(self.values.len()) || cells != Some(self.valid.len()) {
            return Some(format!(
                "grid {}x{} does not match {} values / {} flags",
                self.n_radii,
                self.n_angles,
                self.values.len(),
                self.valid.len()
            ));
        }
        let turn = self.angular_resolution_deg * self.n_angles as f64;
        if !turn.is_finite() || (turn - 360.0).abs() > 1e-6 {
            return Some(format!(
                "{} bins of {} deg do not cover a full turn",
                self.n_angles, self.angular_resolution_deg
            ));
        }
        None
    }

    /// Zero mean, unit variance per radial row over its valid cells.
    /// Rows with fewer than two valid cells or no variance are invalidated.
    pub fn normalize_rows(&mut self) {
        for ri in 0..self.n_radii {
            let s = ri * self.n_angles;
            let e = s + self.n_angles;
            let (vals, valid) = (&mut self.values[s..e], &mut self.valid[s..e]);
            let (mut n, mut sum, mut sum2) = (0usize, 0.0f64, 0.0f64);
            for (v, ok) in vals.iter().zip(valid.iter()) {
                if *ok {
                    n += 1;
                    sum += *v as f64;
                    sum2 += (*v as f64) * (*v as f64);
                }
            }
            let mean = if n > 0 { sum / n as f64 } else { 0.0 };
            let var = if n > 1 { sum2 / n as f64 - mean * mean } else { 0.0 };
            if var <= 1e-12 {
                vals.fill(0.0);
                valid.fill(false);
                continue;
            }
            let inv = 1.0 / var.sqrt();
            for (v, ok) in vals.iter_mut().zip(valid.iter()) {
                *v = if *ok { ((*v as f64 - mean) * inv) as f32 } else { 0.0 };
            }
        }
    }

    /// Grayscale rendering, one pixel per cell, masked cells black.
    /// Valid cells are stretched to the row-independent value range.
    pub fn to_image(&self) -> GrayImage {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for (v, ok) in self.values.iter().zip(&self.valid) {
            if *ok {
                lo = lo.min(*v);
                hi = hi.max(*v);
            }
        }
        let span = if hi > lo { hi - lo } else { 1.0 };
        let mut img = GrayImage::new(self.n_angles as u32, self.n_radii as u32);
        for (x, y, p) in img.enumerate_pixels_mut() {
            if let Some(v) = self.get(y as usize, x as usize) {
                *p = Luma([(1.0 + 254.0 * (v - lo) / span).round() as u8]);
            }
        }
        img
    }
}

/// Projected sampling basis of the iris plane.
///
/// Sample `(ρ, φ)` lands at `center + ρ (cos φ · u + sin φ · v)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripGeometry {
    pub center: [f64; 2],
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub u: [f64; 2],
    pub v: [f64; 2],
}

impl StripGeometry {
    /// Image-plane circles around `center`.
    pub fn frontal(center: [f64; 2], inner_radius: f64, outer_radius: f64) -> Self {
        Self {
            center,
            inner_radius,
            outer_radius,
            u: [1.0, 0.0],
            v: [0.0, 1.0],
        }
    }

    pub fn is_usable(&self) -> bool {
        self.inner_radius > 0.0 && self.outer_radius > self.inner_radius + 1.0
    }
}

/// Fixed angular grid, with its trigonometry tabulated once.
#[derive(Debug, Clone)]
pub struct StripSampler {
    n_radii: usize,
    angular_resolution_deg: f64,
    trig: Vec<(f64, f64)>,
}

impl StripSampler {
    pub fn new(n_radii: usize, angular_resolution_deg: f64) -> Self {
        let n_angles = (360.0 / angular_resolution_deg).round().max(1.0) as usize;
        let step = std::f64::consts::TAU / n_angles as f64;
        let trig = (0..n_angles).map(|a| (a as f64 * step).sin_cos()).collect();
        Self {
            n_radii,
            angular_resolution_deg: 360.0 / n_angles as f64,
            trig,
        }
    }

    pub fn n_angles(&self) -> usize {
        self.trig.len()
    }

    pub fn empty_strip(&self) -> IrisStrip {
        IrisStrip::new(self.n_radii, self.n_angles(), self.angular_resolution_deg)
    }

    /// Fill `out` from `image`. With a mask, a cell is valid only when all
    /// four bilinear neighbours are valid; without one, only image bounds
    /// matter. `out` is reshaped if its layout differs.
    pub fn resample(
        &self,
        image: &GrayImage,
        mask: Option<&Mask>,
        geom: &StripGeometry,
        out: &mut IrisStrip,
    ) {
        if !out.same_layout(&self.empty_strip()) {
            *out = self.empty_strip();
        }
        if !geom.is_usable() {
            out.valid.fill(false);
            out.values.fill(0.0);
            return;
        }
        let n_radii = self.n_radii;
        let dr = (geom.outer_radius - geom.inner_radius) / n_radii as f64;
        for ri in 0..n_radii {
            let rho = geom.inner_radius + (ri as f64 + 0.5) * dr;
            for (ai, &(s, c)) in self.trig.iter().enumerate() {
                let x = geom.center[0] + rho * (c * geom.u[0] + s * geom.v[0]);
                let y = geom.center[1] + rho * (c * geom.u[1] + s * geom.v[1]);
                let (xf, yf) = (x as f32, y as f32);
                let v = match mask {
                    Some(m) => sampling::bilinear_sample_masked(image, m, xf, yf),
                    None => sampling::bilinear_sample_u8_checked(image, xf, yf),
                };
                out.set(ri, ai, v);
            }
        }
    }
}
