use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use super::{Moments, PupilLocator, RadiusBounds};
use crate::conic::{fit_ellipse_direct, Ellipse};
use crate::frame::Roi;

/// Largest dark 8-connected component with a plausible equivalent radius.
///
/// The ellipse is fitted to the component contour, taken as the midpoints
/// between member pixels and their non-member 4-neighbours. When the contour
/// fit is degenerate or implausible, the component's moments are used.
#[derive(Debug, Clone)]
pub struct BlobLocator {
    bounds: RadiusBounds,
}

impl BlobLocator {
    pub fn new(bounds: RadiusBounds) -> Self {
        Self { bounds }
    }
}

const FG: u8 = 255;

fn binarize_into(image: &GrayImage, roi: Roi, dark: u8, out: &mut GrayImage) {
    if out.dimensions() != (roi.width, roi.height) {
        *out = GrayImage::new(roi.width, roi.height);
    }
    for (x, y, p) in out.enumerate_pixels_mut() {
        let v = image.get_pixel(roi.x + x, roi.y + y)[0];
        *p = Luma([if v <= dark { FG } else { 0 }]);
    }
}

impl PupilLocator for BlobLocator {
    fn locate(
        &self,
        image: &GrayImage,
        roi: Roi,
        dark: u8,
        scratch: &mut GrayImage,
    ) -> Option<Ellipse> {
        binarize_into(image, roi, dark, scratch);
        let labels = connected_components(&*scratch, Connectivity::Eight, Luma([0u8]));

        let mut areas: Vec<usize> = Vec::new();
        for p in labels.pixels() {
            let l = p[0] as usize;
            if l == 0 {
                continue;
            }
            if l >= areas.len() {
                areas.resize(l + 1, 0);
            }
            areas[l] += 1;
        }

        let best = areas
            .iter()
            .enumerate()
            .filter(|&(_, &a)| {
                let r_eq = (a as f64 / std::f64::consts::PI).sqrt();
                a > 0 && self.bounds.contains(r_eq)
            })
            .max_by_key(|&(l, &a)| (a, std::cmp::Reverse(l)))
            .map(|(l, &a)| (l as u32, a));
        let Some((label, area)) = best else {
            tracing::debug!(
                components = areas.len().saturating_sub(1),
                "blob: no plausible dark component"
            );
            return None;
        };

        let (w, h) = labels.dimensions();
        let member = |x: i64, y: i64| {
            x >= 0
                && y >= 0
                && x < w as i64
                && y < h as i64
                && labels.get_pixel(x as u32, y as u32)[0] == label
        };
        let ox = roi.x as f64;
        let oy = roi.y as f64;
        let mut contour: Vec<[f64; 2]> = Vec::new();
        let mut moments = Moments::default();
        for (x, y, p) in labels.enumerate_pixels() {
            if p[0] != label {
                continue;
            }
            let (fx, fy) = (ox + x as f64, oy + y as f64);
            moments.add(fx, fy, 1.0);
            for (dx, dy) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
                if !member(x as i64 + dx, y as i64 + dy) {
                    contour.push([fx + 0.5 * dx as f64, fy + 0.5 * dy as f64]);
                }
            }
        }

        let r_eq = (area as f64 / std::f64::consts::PI).sqrt();
        let plausible = |e: &Ellipse| {
            let [mx, my] = moments.centroid().unwrap_or([e.cx, e.cy]);
            let shift = ((e.cx - mx).powi(2) + (e.cy - my).powi(2)).sqrt();
            shift < 0.5 * r_eq && e.a < 2.0 * r_eq && e.b > 0.5 * r_eq
        };
        match fit_ellipse_direct(&contour).filter(plausible) {
            Some(e) => Some(e),
            None => {
                tracing::debug!(area, "blob: contour fit rejected, using moments");
                moments.ellipse()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_disk;

    fn locator() -> BlobLocator {
        BlobLocator::new(RadiusBounds {
            min_px: 5.0,
            max_px: 70.0,
        })
    }

    #[test]
    fn largest_component_wins() {
        let mut img = draw_disk(200, 120, [50.0, 60.0], 10.0, 10, 180);
        let big = draw_disk(200, 120, [140.5, 58.3], 20.0, 10, 180);
        for (x, y, p) in big.enumerate_pixels() {
            if x >= 100 {
                img.put_pixel(x, y, *p);
            }
        }
        let mut scratch = GrayImage::new(0, 0);
        let e = locator()
            .locate(&img, Roi::full(200, 120), 60, &mut scratch)
            .unwrap();
        assert!((e.cx - 140.5).abs() < 0.5 && (e.cy - 58.3).abs() < 0.5);
        assert_eq!(scratch.dimensions(), (200, 120));
    }

    #[test]
    fn elongated_pupil_keeps_orientation() {
        let truth = Ellipse::from_axes(80.0, 60.0, 20.0, 13.0, 0.5);
        let mut img = GrayImage::from_pixel(160, 120, Luma([170]));
        for (x, y, p) in img.enumerate_pixels_mut() {
            if truth.contains(x as f64, y as f64) {
                *p = Luma([15]);
            }
        }
        let mut scratch = GrayImage::new(0, 0);
        let e = locator()
            .locate(&img, Roi::full(160, 120), 60, &mut scratch)
            .unwrap();
        assert!((e.cx - 80.0).abs() < 0.5 && (e.cy - 60.0).abs() < 0.5);
        assert!((e.a - 20.0).abs() < 1.0 && (e.b - 13.0).abs() < 1.0);
        assert!((e.angle - 0.5).abs() < 0.1);
    }
}
