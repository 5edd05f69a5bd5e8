//! Direct least-squares ellipse fitting (Fitzgibbon, Pilu & Fisher, 1999).

use nalgebra::{Matrix3, Matrix6, Vector6};

use super::eigen::ellipse_eigenvector;
use super::types::{ConicCoeffs, Ellipse};

/// Fit a conic constrained to be an ellipse to at least six points.
///
/// Points are shifted to their centroid and scaled to a mean radius of √2
/// before building the scatter matrix, so the result does not depend on
/// where in the frame the boundary lies.
pub fn fit_conic_direct(points: &[[f64; 2]]) -> Option<ConicCoeffs> {
    if points.len() < 6 {
        return None;
    }

    let (mx, my, scale) = normalization_params(points);

    let mut s = Matrix6::<f64>::zeros();
    for &[px, py] in points {
        let x = (px - mx) * scale;
        let y = (py - my) * scale;
        let row = Vector6::new(x * x, x * y, y * y, x, y, 1.0);
        s += row * row.transpose();
    }

    let s11 = s.fixed_view::<3, 3>(0, 0).into_owned();
    let s12 = s.fixed_view::<3, 3>(0, 3).into_owned();
    let s22 = s.fixed_view::<3, 3>(3, 3).into_owned();

    // 4AC − B² = 1 expressed as aᵀ C₁ a.
    let c1 = Matrix3::new(0.0, 0.0, 2.0, 0.0, -1.0, 0.0, 2.0, 0.0, 0.0);

    let s22_inv = s22.try_inverse()?;
    let reduced = s11 - s12 * s22_inv * s12.transpose();
    let system = c1.try_inverse()? * reduced;

    let a1 = ellipse_eigenvector(&system)?;
    let a2 = -s22_inv * s12.transpose() * a1;

    let coeffs = denormalize([a1[0], a1[1], a1[2], a2[0], a2[1], a2[2]], mx, my, scale);
    if coeffs.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let conic = ConicCoeffs(coeffs);
    if !conic.is_ellipse() {
        return None;
    }
    conic.to_ellipse()?;
    Some(conic)
}

pub fn fit_ellipse_direct(points: &[[f64; 2]]) -> Option<Ellipse> {
    fit_conic_direct(points)?.to_ellipse()
}

/// Centroid and isotropic scale mapping the mean centroid distance to √2.
pub(crate) fn normalization_params(points: &[[f64; 2]]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let my = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p[0] - mx).hypot(p[1] - my))
        .sum::<f64>()
        / n;
    let scale = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    (mx, my, scale)
}

/// Map coefficients fitted in `x' = s(x − mx), y' = s(y − my)` back to pixels.
fn denormalize(c: [f64; 6], mx: f64, my: f64, s: f64) -> [f64; 6] {
    let [a, b, cc, d, e, f] = c;
    let s2 = s * s;
    [
        a * s2,
        b * s2,
        cc * s2,
        -2.0 * a * s2 * mx - b * s2 * my + d * s,
        -b * s2 * mx - 2.0 * cc * s2 * my + e * s,
        a * s2 * mx * mx + b * s2 * mx * my + cc * s2 * my * my - d * s * mx - e * s * my + f,
    ]
}

/// Root-mean-square Sampson distance of `points` to `ellipse`.
pub fn rms_sampson_distance(ellipse: &Ellipse, points: &[[f64; 2]]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .iter()
        .map(|&[x, y]| ellipse.sampson_distance(x, y).powi(2))
        .sum();
    (sum / points.len() as f64).sqrt()
}
