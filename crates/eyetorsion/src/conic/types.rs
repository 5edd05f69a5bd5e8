//! Ellipse and general-conic representations.

use serde::{Deserialize, Serialize};

/// Failure modes of the robust ellipse fit.
#[derive(Debug, Clone, PartialEq)]
pub enum ConicError {
    /// Fewer support points than the fit needs.
    TooFewPoints { needed: usize, got: usize },
    /// The consensus set never reached the configured minimum.
    InsufficientInliers { needed: usize, found: usize },
    /// The normal equations were singular or produced a non-ellipse.
    Degenerate,
}

impl std::fmt::Display for ConicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { needed, got } => {
                write!(f, "too few points: need {}, got {}", needed, got)
            }
            Self::InsufficientInliers { needed, found } => {
                write!(f, "insufficient inliers: need {}, found {}", needed, found)
            }
            Self::Degenerate => write!(f, "degenerate conic"),
        }
    }
}

impl std::error::Error for ConicError {}

/// Coefficients `[A, B, C, D, E, F]` of `A x² + B xy + C y² + D x + E y + F = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConicCoeffs(pub [f64; 6]);

impl ConicCoeffs {
    /// Value of the conic polynomial at `(x, y)`.
    pub fn algebraic_distance(&self, x: f64, y: f64) -> f64 {
        let [a, b, c, d, e, f] = self.0;
        a * x * x + b * x * y + c * y * y + d * x + e * y + f
    }

    /// `B² − 4AC < 0`.
    pub fn is_ellipse(&self) -> bool {
        let [a, b, c, ..] = self.0;
        b * b - 4.0 * a * c < 0.0
    }

    pub fn to_ellipse(self) -> Option<Ellipse> {
        conic_to_ellipse(&self)
    }
}

/// Pupil or iris outline in image pixels.
///
/// `a` is the semi-major axis and `b` the semi-minor axis (`a >= b >= 0`),
/// `angle` is the major-axis direction from +x in radians, kept in
/// (−π/2, π/2]. A zero radius marks "not found".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    pub a: f64,
    pub b: f64,
    pub angle: f64,
}

impl Ellipse {
    /// Degenerate ellipse reported when a boundary could not be located.
    pub const NOT_FOUND: Ellipse = Ellipse {
        cx: 0.0,
        cy: 0.0,
        a: 0.0,
        b: 0.0,
        angle: 0.0,
    };

    pub fn circle(cx: f64, cy: f64, r: f64) -> Self {
        Self {
            cx,
            cy,
            a: r,
            b: r,
            angle: 0.0,
        }
    }

    /// Build from two semi-axes in any order, canonicalizing `a >= b`.
    pub fn from_axes(cx: f64, cy: f64, r1: f64, r2: f64, angle: f64) -> Self {
        let (a, b, angle) = if r1 >= r2 {
            (r1, r2, angle)
        } else {
            (r2, r1, angle + std::f64::consts::FRAC_PI_2)
        };
        Self {
            cx,
            cy,
            a: a.max(0.0),
            b: b.max(0.0),
            angle: normalize_angle(angle),
        }
    }

    /// Finite parameters with strictly positive radii.
    pub fn is_found(&self) -> bool {
        self.a > 0.0
            && self.b > 0.0
            && self.a.is_finite()
            && self.b.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.angle.is_finite()
    }

    pub fn center(&self) -> [f64; 2] {
        [self.cx, self.cy]
    }

    /// Geometric mean of the semi-axes (radius of the equal-area circle).
    pub fn mean_radius(&self) -> f64 {
        (self.a * self.b).sqrt()
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.b > 0.0 {
            self.a / self.b
        } else {
            f64::INFINITY
        }
    }

    /// Same center and orientation, both axes multiplied by `k`.
    pub fn scaled(&self, k: f64) -> Self {
        Self {
            a: self.a * k,
            b: self.b * k,
            ..*self
        }
    }

    /// Elliptical radius of `(x, y)`: 1.0 on the boundary, < 1.0 inside.
    pub fn normalized_radius(&self, x: f64, y: f64) -> f64 {
        if !self.is_found() {
            return f64::INFINITY;
        }
        let (s, c) = self.angle.sin_cos();
        let dx = x - self.cx;
        let dy = y - self.cy;
        let u = (c * dx + s * dy) / self.a;
        let v = (-s * dx + c * dy) / self.b;
        (u * u + v * v).sqrt()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.normalized_radius(x, y) <= 1.0
    }

    /// Point on the boundary at parametric angle `t`.
    pub fn point_at(&self, t: f64) -> [f64; 2] {
        let (s, c) = self.angle.sin_cos();
        let px = self.a * t.cos();
        let py = self.b * t.sin();
        [self.cx + c * px - s * py, self.cy + s * px + c * py]
    }

    /// `n` boundary points evenly spaced in the parametric angle.
    pub fn sample_points(&self, n: usize) -> Vec<[f64; 2]> {
        (0..n)
            .map(|i| self.point_at(std::f64::consts::TAU * i as f64 / n as f64))
            .collect()
    }

    pub fn to_conic(self) -> ConicCoeffs {
        ellipse_to_conic(&self)
    }

    /// First-order geometric distance from `(x, y)` to the boundary.
    pub fn sampson_distance(&self, x: f64, y: f64) -> f64 {
        let c = self.to_conic();
        let [ca, cb, cc, cd, ce, _] = c.0;
        let alg = c.algebraic_distance(x, y);
        let gx = 2.0 * ca * x + cb * y + cd;
        let gy = cb * x + 2.0 * cc * y + ce;
        let g2 = gx * gx + gy * gy;
        if g2 < 1e-30 {
            return alg.abs();
        }
        alg.abs() / g2.sqrt()
    }

    /// Bounding box `[x_min, y_min, x_max, y_max]` of the ellipse.
    pub fn bounding_box(&self) -> [f64; 4] {
        let (s, c) = self.angle.sin_cos();
        let hw = ((self.a * c).powi(2) + (self.b * s).powi(2)).sqrt();
        let hh = ((self.a * s).powi(2) + (self.b * c).powi(2)).sqrt();
        [self.cx - hw, self.cy - hh, self.cx + hw, self.cy + hh]
    }
}

/// Geometric parameters of a conic, or `None` when it is not a real ellipse.
pub fn conic_to_ellipse(c: &ConicCoeffs) -> Option<Ellipse> {
    let [a, b, cc, d, e, f] = c.0;

    let denom = 4.0 * a * cc - b * b;
    if denom <= 0.0 {
        return None;
    }

    let cx = (b * e - 2.0 * cc * d) / denom;
    let cy = (b * d - 2.0 * a * e) / denom;

    let angle = if (a - cc).abs() < 1e-15 {
        if b == 0.0 {
            0.0
        } else {
            std::f64::consts::FRAC_PI_4.copysign(b)
        }
    } else {
        0.5 * b.atan2(a - cc)
    };

    // Eigenvalues of the quadratic part.
    let sum = a + cc;
    let diff = ((a - cc).powi(2) + b * b).sqrt();
    let l1 = 0.5 * (sum + diff);
    let l2 = 0.5 * (sum - diff);

    let f_center = a * cx * cx + b * cx * cy + cc * cy * cy + d * cx + e * cy + f;
    if f_center.abs() < 1e-15 {
        return None;
    }

    let a2 = -f_center / l1;
    let b2 = -f_center / l2;
    if a2 <= 0.0 || b2 <= 0.0 {
        return None;
    }

    let out = Ellipse::from_axes(cx, cy, a2.sqrt(), b2.sqrt(), angle);
    out.is_found().then_some(out)
}

pub fn ellipse_to_conic(e: &Ellipse) -> ConicCoeffs {
    let (s, c) = e.angle.sin_cos();
    let ia2 = 1.0 / (e.a * e.a);
    let ib2 = 1.0 / (e.b * e.b);

    let ca = c * c * ia2 + s * s * ib2;
    let cb = 2.0 * c * s * (ia2 - ib2);
    let cc = s * s * ia2 + c * c * ib2;
    let cd = -2.0 * ca * e.cx - cb * e.cy;
    let ce = -cb * e.cx - 2.0 * cc * e.cy;
    let cf = ca * e.cx * e.cx + cb * e.cx * e.cy + cc * e.cy * e.cy - 1.0;

    ConicCoeffs([ca, cb, cc, cd, ce, cf])
}

/// Wrap to (−π/2, π/2].
pub(crate) fn normalize_angle(mut angle: f64) -> f64 {
    use std::f64::consts::{FRAC_PI_2, PI};
    if !angle.is_finite() {
        return 0.0;
    }
    angle %= PI;
    if angle > FRAC_PI_2 {
        angle -= PI;
    } else if angle <= -FRAC_PI_2 {
        angle += PI;
    }
    angle
}
