//! Ellipse primitives shared by the pupil locator and the boundary refiner.
//!
//! - Direct least-squares conic fit constrained to ellipses (Fitzgibbon et al.).
//! - Conversion between conic coefficients and geometric parameters.
//! - Sampson residuals and a seeded RANSAC wrapper.

mod eigen;
mod fit;
mod ransac;
mod types;

pub use fit::{fit_conic_direct, fit_ellipse_direct, rms_sampson_distance};
pub use ransac::{fit_ellipse_ransac, RansacConfig, RansacResult};
pub(crate) use types::normalize_angle;
pub use types::{ConicCoeffs, ConicError, Ellipse};
