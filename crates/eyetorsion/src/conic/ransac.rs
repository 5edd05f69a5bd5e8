//! Consensus-based ellipse fitting for boundary points with outliers
//! (eyelashes, reflections, eyelid edges).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::fit::fit_ellipse_direct;
use super::types::{ConicError, Ellipse};

/// RANSAC controls. The seed is fixed so repeated runs on the same points
/// produce the same ellipse.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Sampson distance (pixels) under which a point counts as an inlier.
    pub inlier_threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 200,
            inlier_threshold: 1.0,
            min_inliers: 12,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult {
    pub ellipse: Ellipse,
    pub num_inliers: usize,
    pub inlier_mask: Vec<bool>,
}

/// Fit from minimal 6-point samples, keep the largest consensus set and
/// refit on it.
pub fn fit_ellipse_ransac(
    points: &[[f64; 2]],
    config: &RansacConfig,
) -> Result<RansacResult, ConicError> {
    let n = points.len();
    if n < 6 {
        return Err(ConicError::TooFewPoints { needed: 6, got: n });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..n).collect();
    let mut sample = [[0.0f64; 2]; 6];
    let mut best_count = 0usize;
    let mut best_mask = vec![false; n];
    let mut mask = vec![false; n];

    for _ in 0..config.max_iters {
        // Partial Fisher-Yates: the first six slots become the sample.
        for i in 0..6 {
            let j = rng.gen_range(i..n);
            indices.swap(i, j);
            sample[i] = points[indices[i]];
        }
        let Some(candidate) = fit_ellipse_direct(&sample) else {
            continue;
        };

        let mut count = 0usize;
        for (m, &[x, y]) in mask.iter_mut().zip(points) {
            *m = candidate.sampson_distance(x, y) < config.inlier_threshold;
            count += usize::from(*m);
        }
        if count > best_count {
            best_count = count;
            best_mask.copy_from_slice(&mask);
            if best_count * 10 > n * 9 {
                break;
            }
        }
    }

    if best_count < config.min_inliers.max(6) {
        return Err(ConicError::InsufficientInliers {
            needed: config.min_inliers.max(6),
            found: best_count,
        });
    }

    let inliers: Vec<[f64; 2]> = points
        .iter()
        .zip(&best_mask)
        .filter_map(|(p, &m)| m.then_some(*p))
        .collect();
    let ellipse = fit_ellipse_direct(&inliers).ok_or(ConicError::Degenerate)?;

    let inlier_mask: Vec<bool> = points
        .iter()
        .map(|&[x, y]| ellipse.sampson_distance(x, y) < config.inlier_threshold)
        .collect();
    let num_inliers = inlier_mask.iter().filter(|&&m| m).count();

    Ok(RansacResult {
        ellipse,
        num_inliers,
        inlier_mask,
    })
}
