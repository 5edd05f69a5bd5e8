//! Small dense eigen helpers for the 3×3 reduced ellipse-fit system.

use nalgebra::{Matrix3, Vector3};

/// Eigenvector of `system` (= C₁⁻¹ M) that satisfies the ellipse constraint
/// `4 v₀ v₂ − v₁² > 0`.
///
/// Eigenvalues come from the characteristic cubic; eigenvectors from the
/// adjugate of `system − λI`. When more than one real eigenpair qualifies
/// (numerical noise), the one with the smallest |λ| wins.
pub(crate) fn ellipse_eigenvector(system: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let m = system;
    let trace = m.trace();
    let minors = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)] + m[(0, 0)] * m[(2, 2)]
        - m[(0, 2)] * m[(2, 0)]
        + m[(1, 1)] * m[(2, 2)]
        - m[(1, 2)] * m[(2, 1)];
    let det = m.determinant();

    let mut best: Option<(f64, Vector3<f64>)> = None;
    for lambda in real_cubic_roots(-trace, minors, -det) {
        let Some(v) = null_vector(&(system - Matrix3::identity() * lambda)) else {
            continue;
        };
        if 4.0 * v[0] * v[2] - v[1] * v[1] <= 0.0 {
            continue;
        }
        if best.map_or(true, |(l, _)| lambda.abs() < l) {
            best = Some((lambda.abs(), v));
        }
    }
    best.map(|(_, v)| v)
}

/// Unit null vector of a rank-2 matrix: the adjugate row with the largest norm.
fn null_vector(m: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let r0 = m.row(0).transpose();
    let r1 = m.row(1).transpose();
    let r2 = m.row(2).transpose();
    let candidates = [r1.cross(&r2), r2.cross(&r0), r0.cross(&r1)];

    let best = candidates
        .iter()
        .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))?;
    let n2 = best.norm_squared();
    if !n2.is_finite() || n2 < 1e-30 {
        return None;
    }
    Some(best / n2.sqrt())
}

/// Real roots of the monic cubic `x³ + b x² + c x + d`.
fn real_cubic_roots(b: f64, c: f64, d: f64) -> Vec<f64> {
    use std::f64::consts::TAU;

    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let shift = -b / 3.0;
    let disc = -4.0 * p * p * p - 27.0 * q * q;

    if disc >= 0.0 {
        let r = (-p / 3.0).max(0.0).sqrt();
        let cos_arg = if r < 1e-15 {
            0.0
        } else {
            (-q / (2.0 * r * r * r)).clamp(-1.0, 1.0)
        };
        let theta = cos_arg.acos();
        (0..3)
            .map(|k| 2.0 * r * ((theta + TAU * k as f64) / 3.0).cos() + shift)
            .collect()
    } else {
        let s = (q * q / 4.0 + p * p * p / 27.0).sqrt();
        vec![(-q / 2.0 + s).cbrt() + (-q / 2.0 - s).cbrt() + shift]
    }
}
