//! Sub-pixel sampling and 1-D profile helpers shared by the refiner and the
//! torsion estimator.

use image::GrayImage;

use crate::mask::Mask;

/// Sample a grayscale image at sub-pixel position using bilinear interpolation.
/// Returns intensity in [0, 1] or `None` if sampling is out of bounds.
#[inline]
pub fn bilinear_sample_u8_checked(img: &GrayImage, x: f32, y: f32) -> Option<f32> {
    let (w, h) = img.dimensions();
    if !(x >= 0.0 && y >= 0.0) {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    if x0 + 1 >= w || y0 + 1 >= h {
        return None;
    }
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let p00 = img.get_pixel(x0, y0)[0] as f32 / 255.0;
    let p10 = img.get_pixel(x0 + 1, y0)[0] as f32 / 255.0;
    let p01 = img.get_pixel(x0, y0 + 1)[0] as f32 / 255.0;
    let p11 = img.get_pixel(x0 + 1, y0 + 1)[0] as f32 / 255.0;
    Some(
        (1.0 - fx) * (1.0 - fy) * p00
            + fx * (1.0 - fy) * p10
            + (1.0 - fx) * fy * p01
            + fx * fy * p11,
    )
}

/// Bilinear sample that only succeeds when all four contributing pixels are
/// valid in `mask`. Masked pixels therefore never leak into the value.
#[inline]
pub fn bilinear_sample_masked(img: &GrayImage, mask: &Mask, x: f32, y: f32) -> Option<f32> {
    if !(x >= 0.0 && y >= 0.0) {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let ok = mask.is_valid(x0, y0)
        && mask.is_valid(x0 + 1, y0)
        && mask.is_valid(x0, y0 + 1)
        && mask.is_valid(x0 + 1, y0 + 1);
    if !ok {
        return None;
    }
    bilinear_sample_u8_checked(img, x, y)
}

/// Compute radial derivative `dI/dr` from sampled intensities using central differences.
///
/// Boundary samples use forward/backward differences.
pub fn radial_derivative_into(i_vals: &[f32], r_step: f32, out: &mut [f32]) {
    let n = i_vals.len();
    debug_assert_eq!(out.len(), n);
    if n == 0 {
        return;
    }
    if n == 1 {
        out[0] = 0.0;
        return;
    }

    out[0] = (i_vals[1] - i_vals[0]) / r_step;
    for ri in 1..(n - 1) {
        out[ri] = (i_vals[ri + 1] - i_vals[ri - 1]) / (2.0 * r_step);
    }
    out[n - 1] = (i_vals[n - 1] - i_vals[n - 2]) / r_step;
}

/// 3-point moving average, in place. Ends are left unchanged; curves
/// shorter than 5 samples are not touched.
pub fn smooth_3point(d: &mut [f32]) {
    let n = d.len();
    if n < 5 {
        return;
    }
    let mut left = d[0];
    let mut mid = d[1];
    for ri in 1..(n - 1) {
        let right = d[ri + 1];
        d[ri] = (left + mid + right) / 3.0;
        left = mid;
        mid = right;
    }
}

/// Index of the largest finite value (the strongest dark-to-bright edge of
/// a radial derivative profile).
pub fn peak_idx(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Vertex offset in `(-0.5, 0.5)` of the parabola through three samples
/// centered on a discrete extremum. Flat neighbourhoods return 0.
#[inline]
pub fn parabolic_offset(y_minus: f64, y0: f64, y_plus: f64) -> f64 {
    let denom = y_minus - 2.0 * y0 + y_plus;
    if denom.abs() < 1e-12 || !denom.is_finite() {
        return 0.0;
    }
    (0.5 * (y_minus - y_plus) / denom).clamp(-0.5, 0.5)
}

/// Median of a scratch slice (reordered in place).
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*m)
}
