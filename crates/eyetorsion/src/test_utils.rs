//! Synthetic eye images for unit tests.

use image::{GrayImage, Luma};
use rand::prelude::*;

use crate::frame::{Eye, ImageFrame};

/// `(harmonic, phase, weight, radial twist)` of the iris texture.
const IRIS_HARMONICS: [(f64, f64, f64, f64); 5] = [
    (3.0, 0.3, 1.0, 0.8),
    (7.0, 1.1, 0.8, -1.5),
    (11.0, 2.0, 0.6, 2.0),
    (17.0, 0.7, 0.5, -2.5),
    (23.0, 2.9, 0.4, 3.0),
];

/// Frontal eye: dark pupil disk, textured iris annulus, uniform sclera.
#[derive(Debug, Clone)]
pub(crate) struct SyntheticEye {
    pub width: u32,
    pub height: u32,
    pub center: [f64; 2],
    pub pupil_radius: f64,
    pub iris_radius: f64,
    /// Clockwise rotation of the iris texture (degrees).
    pub rotation_deg: f64,
    pub sclera: u8,
    pub pupil: u8,
    pub iris_mean: f64,
    pub iris_amplitude: f64,
}

impl Default for SyntheticEye {
    fn default() -> Self {
        Self {
            width: 240,
            height: 200,
            center: [120.3, 98.6],
            pupil_radius: 22.0,
            iris_radius: 55.0,
            rotation_deg: 0.0,
            sclera: 190,
            pupil: 20,
            iris_mean: 110.0,
            iris_amplitude: 35.0,
        }
    }
}

impl SyntheticEye {
    pub fn rotated(&self, deg: f64) -> Self {
        Self {
            rotation_deg: deg,
            ..self.clone()
        }
    }

    fn iris_value(&self, phi: f64, rho: f64) -> f64 {
        let mut s = 0.0;
        let mut wsum = 0.0;
        for (k, phase, w, twist) in IRIS_HARMONICS {
            s += w * (k * phi + phase + twist * rho).sin();
            wsum += w;
        }
        self.iris_mean + self.iris_amplitude * s / wsum
    }

    fn value_at(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.center[0];
        let dy = y - self.center[1];
        let r = (dx * dx + dy * dy).sqrt();
        if r < self.pupil_radius {
            self.pupil as f64
        } else if r < self.iris_radius {
            let phi = dy.atan2(dx) - self.rotation_deg.to_radians();
            let rho = (r - self.pupil_radius) / (self.iris_radius - self.pupil_radius);
            self.iris_value(phi, rho)
        } else {
            self.sclera as f64
        }
    }

    /// Render with 4×4 supersampling per pixel.
    pub fn render(&self) -> GrayImage {
        const SS: usize = 4;
        let mut img = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut acc = 0.0;
                for sy in 0..SS {
                    for sx in 0..SS {
                        let fx = x as f64 + (sx as f64 + 0.5) / SS as f64 - 0.5;
                        let fy = y as f64 + (sy as f64 + 0.5) / SS as f64 - 0.5;
                        acc += self.value_at(fx, fy);
                    }
                }
                let v = (acc / (SS * SS) as f64).round().clamp(0.0, 255.0);
                img.put_pixel(x, y, Luma([v as u8]));
            }
        }
        img
    }

    /// Fill everything above `y = y0 + k (x - cx)^2` with `value`.
    pub fn draw_upper_lid(&self, img: &mut GrayImage, y0: f64, k: f64, value: u8) {
        let cx = self.center[0];
        for (x, y, p) in img.enumerate_pixels_mut() {
            let dx = x as f64 - cx;
            if (y as f64) < y0 + k * dx * dx {
                *p = Luma([value]);
            }
        }
    }

    /// Fill everything below `y = y0 + k (x - cx)^2` with `value`.
    pub fn draw_lower_lid(&self, img: &mut GrayImage, y0: f64, k: f64, value: u8) {
        let cx = self.center[0];
        for (x, y, p) in img.enumerate_pixels_mut() {
            let dx = x as f64 - cx;
            if (y as f64) > y0 + k * dx * dx {
                *p = Luma([value]);
            }
        }
    }
}

/// Saturated disk, as left by an IR illuminator.
pub(crate) fn add_reflection(img: &mut GrayImage, center: [f64; 2], radius: f64) {
    for (x, y, p) in img.enumerate_pixels_mut() {
        let dx = x as f64 - center[0];
        let dy = y as f64 - center[1];
        if dx * dx + dy * dy <= radius * radius {
            *p = Luma([255]);
        }
    }
}

/// Uniform integer noise in `[-amplitude, amplitude]`.
pub(crate) fn add_noise(img: &mut GrayImage, amplitude: i16, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for p in img.pixels_mut() {
        let n = rng.gen_range(-amplitude..=amplitude);
        p[0] = (p[0] as i16 + n).clamp(0, 255) as u8;
    }
}

/// Gaussian-blur a `GrayImage` via `imageproc`.
pub(crate) fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut f = image::ImageBuffer::<Luma<f32>, Vec<f32>>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            f.put_pixel(x, y, Luma([img.get_pixel(x, y)[0] as f32 / 255.0]));
        }
    }
    let blurred = imageproc::filter::gaussian_blur_f32(&f, sigma);
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v = blurred.get_pixel(x, y)[0].clamp(0.0, 1.0);
            out.put_pixel(x, y, Luma([(v * 255.0).round() as u8]));
        }
    }
    out
}

pub(crate) fn frame(image: GrayImage, frame_number: u64) -> ImageFrame {
    ImageFrame::new(image, frame_number, frame_number as f64 / 60.0, Eye::Left)
}

/// Dark disk on a uniform background.
pub(crate) fn draw_disk(w: u32, h: u32, center: [f64; 2], radius: f64, fg: u8, bg: u8) -> GrayImage {
    SyntheticEye {
        width: w,
        height: h,
        center,
        pupil_radius: radius,
        iris_radius: radius,
        sclera: bg,
        pupil: fg,
        ..SyntheticEye::default()
    }
    .render()
}
