//! Radial edge scanning from a boundary center.
//!
//! Rays are cast at evenly spaced angles; on each ray the intensity profile
//! is converted to a smoothed radial derivative and the strongest
//! dark-to-bright transition becomes one boundary point (parabolic sub-sample
//! refinement). A ray is dropped when any sample inside the edge is masked
//! out or saturated, so eyelids and reflections never produce boundary
//! points.

use image::GrayImage;

use crate::mask::Mask;
use crate::sampling;
use crate::settings::EdgeScanConfig;

/// Reusable per-scan buffers.
#[derive(Debug, Default, Clone)]
pub struct EdgeScratch {
    r_samples: Vec<f32>,
    i_vals: Vec<f32>,
    d_vals: Vec<f32>,
    /// Boundary points of the last scan, in frame pixels.
    pub points: Vec<[f64; 2]>,
}

/// Summary of one scan; points are left in [`EdgeScratch::points`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeScanStats {
    pub n_rays: usize,
    pub n_masked: usize,
    pub n_weak: usize,
}

impl EdgeScanStats {
    pub fn n_points(&self) -> usize {
        self.n_rays - self.n_masked - self.n_weak
    }
}

/// Scan `[window[0], window[1]]` pixels from `center` for dark-to-bright edges.
pub fn scan_edges(
    image: &GrayImage,
    mask: &Mask,
    bright: u8,
    center: [f64; 2],
    window: [f32; 2],
    config: &EdgeScanConfig,
    scratch: &mut EdgeScratch,
) -> EdgeScanStats {
    scratch.points.clear();
    let n_rays = config.n_rays.max(1);
    let mut stats = EdgeScanStats {
        n_rays,
        n_masked: 0,
        n_weak: 0,
    };
    let r_step = config.r_step;
    if !(window[1] > window[0] + 2.0 * r_step) {
        stats.n_weak = n_rays;
        return stats;
    }
    let n_r = ((window[1] - window[0]) / r_step).floor() as usize + 1;
    scratch.r_samples.clear();
    scratch
        .r_samples
        .extend((0..n_r).map(|i| window[0] + i as f32 * r_step));
    scratch.i_vals.resize(n_r, 0.0);
    scratch.d_vals.resize(n_r, 0.0);

    let bright_f = bright as f32 / 255.0;
    let (cx, cy) = (center[0] as f32, center[1] as f32);

    let d_theta = 2.0 * std::f32::consts::PI / n_rays as f32;
    let c_step = d_theta.cos();
    let s_step = d_theta.sin();
    let mut ct = 1.0f32;
    let mut st = 0.0f32;
    for _ in 0..n_rays {
        // Profile up to the first out-of-bounds sample.
        let mut len = 0usize;
        let mut first_bad = usize::MAX;
        for (i, &r) in scratch.r_samples.iter().enumerate() {
            let x = cx + r * ct;
            let y = cy + r * st;
            let Some(v) = sampling::bilinear_sample_u8_checked(image, x, y) else {
                break;
            };
            let usable = v < bright_f && mask.is_valid(x.round() as u32, y.round() as u32);
            if !usable && first_bad == usize::MAX {
                first_bad = i;
            }
            scratch.i_vals[i] = v;
            len = i + 1;
        }

        let edge = if len >= 5 {
            let d = &mut scratch.d_vals[..len];
            sampling::radial_derivative_into(&scratch.i_vals[..len], r_step, d);
            sampling::smooth_3point(d);
            sampling::peak_idx(d).map(|i| (i, d[i]))
        } else {
            None
        };

        match edge {
            Some((i, _)) if i >= first_bad => stats.n_masked += 1,
            Some((i, strength)) if strength >= config.min_edge_strength => {
                let d = &scratch.d_vals;
                let off = if i > 0 && i + 1 < len {
                    sampling::parabolic_offset(d[i - 1] as f64, d[i] as f64, d[i + 1] as f64)
                } else {
                    0.0
                };
                let r = scratch.r_samples[i] as f64 + off * r_step as f64;
                scratch
                    .points
                    .push([center[0] + r * ct as f64, center[1] + r * st as f64]);
            }
            _ => stats.n_weak += 1,
        }

        let next_ct = ct * c_step - st * s_step;
        let next_st = st * c_step + ct * s_step;
        ct = next_ct;
        st = next_st;
    }
    tracing::trace!(
        n_rays,
        n_points = stats.n_points(),
        n_masked = stats.n_masked,
        "edge scan"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{add_reflection, blur_gray, draw_disk};

    fn cfg() -> EdgeScanConfig {
        EdgeScanConfig {
            n_rays: 48,
            ..Default::default()
        }
    }

    #[test]
    fn points_lie_on_blurred_disk_edge() {
        let c = [60.4, 55.7];
        let img = blur_gray(&draw_disk(120, 110, c, 18.0, 20, 170), 1.0);
        let mask = Mask::all_valid(120, 110);
        let mut scratch = EdgeScratch::default();
        let stats = scan_edges(&img, &mask, 250, c, [5.0, 30.0], &cfg(), &mut scratch);
        assert_eq!(stats.n_points(), 48);
        for &[x, y] in &scratch.points {
            let r = ((x - c[0]).powi(2) + (y - c[1]).powi(2)).sqrt();
            assert!((r - 18.0).abs() < 0.3, "edge at r={r}");
        }
    }

    #[test]
    fn masked_and_saturated_rays_are_dropped() {
        let c = [60.0, 55.0];
        let mut img = draw_disk(120, 110, c, 18.0, 20, 170);
        add_reflection(&mut img, [c[0] + 10.0, c[1]], 3.0);
        let mut mask = Mask::all_valid(120, 110);
        for x in 0..120 {
            for y in 0..40 {
                mask.set(x, y, false);
            }
        }
        let mut scratch = EdgeScratch::default();
        let stats = scan_edges(&img, &mask, 220, c, [5.0, 30.0], &cfg(), &mut scratch);
        assert!(stats.n_masked > 5);
        assert!(stats.n_points() >= 24);
        for &[x, y] in &scratch.points {
            assert!(y >= 40.0 - 1.0);
            let ang = (y - c[1]).atan2(x - c[0]);
            assert!(ang.abs() > 0.2, "ray through the reflection at {ang}");
        }
    }

    #[test]
    fn flat_image_has_no_edges() {
        let img = GrayImage::from_pixel(80, 80, image::Luma([100]));
        let mut scratch = EdgeScratch::default();
        let stats = scan_edges(
            &img,
            &Mask::all_valid(80, 80),
            220,
            [40.0, 40.0],
            [3.0, 30.0],
            &cfg(),
            &mut scratch,
        );
        assert_eq!(stats.n_points(), 0);
        assert_eq!(stats.n_weak, 48);
    }
}
