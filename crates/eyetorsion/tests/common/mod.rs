//! Synthetic eye frames shared by the integration tests.

#![allow(dead_code)]

use eyetorsion::{Eye, ImageFrame};
use image::{GrayImage, Luma};

/// Frontal eye with a textured iris that can be rendered at any rotation.
#[derive(Debug, Clone)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub center: [f64; 2],
    pub pupil_radius: f64,
    pub iris_radius: f64,
    /// Clockwise iris rotation (degrees).
    pub rotation_deg: f64,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            width: 256,
            height: 208,
            center: [127.6, 101.2],
            pupil_radius: 21.0,
            iris_radius: 56.0,
            rotation_deg: 0.0,
        }
    }
}

impl Scene {
    pub fn rotated(&self, deg: f64) -> Self {
        Self {
            rotation_deg: deg,
            ..self.clone()
        }
    }

    fn value_at(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.center[0];
        let dy = y - self.center[1];
        let r = dx.hypot(dy);
        if r < self.pupil_radius {
            return 18.0;
        }
        if r >= self.iris_radius {
            return 185.0;
        }
        let phi = dy.atan2(dx) - self.rotation_deg.to_radians();
        let rho = (r - self.pupil_radius) / (self.iris_radius - self.pupil_radius);
        let texture = (4.0 * phi + 0.9 + rho).sin()
            + 0.7 * (9.0 * phi - 2.0 * rho).sin()
            + 0.5 * (15.0 * phi + 1.7 + 3.0 * rho).cos()
            + 0.4 * (26.0 * phi - 0.4).sin();
        105.0 + 14.0 * texture
    }

    /// 3×3 supersampled render.
    pub fn render(&self) -> GrayImage {
        const SS: u32 = 3;
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let mut acc = 0.0;
            for sy in 0..SS {
                for sx in 0..SS {
                    let fx = x as f64 + (sx as f64 + 0.5) / SS as f64 - 0.5;
                    let fy = y as f64 + (sy as f64 + 0.5) / SS as f64 - 0.5;
                    acc += self.value_at(fx, fy);
                }
            }
            Luma([(acc / (SS * SS) as f64).round().clamp(0.0, 255.0) as u8])
        })
    }

    pub fn frame(&self, frame_number: u64, eye: Eye) -> ImageFrame {
        ImageFrame::new(self.render(), frame_number, frame_number as f64 * 0.0625, eye)
    }
}
