//! Per-pixel validity masks.
//!
//! A pixel is usable for torsion when it is between the eyelids, not part of
//! a (dilated) specular reflection, and inside the iris annulus around the
//! pupil. [`occlusion_mask`] covers the first two conditions and is also
//! consumed by the boundary refiner; [`annulus_mask`] adds the third.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;

use crate::conic::Ellipse;
use crate::eyelids::EyelidBoundary;
use crate::settings::MaskConfig;

const VALID: u8 = 255;

/// Binary mask, `255` = valid, `0` = excluded. Same size as its frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(GrayImage);

impl Mask {
    pub fn all_valid(width: u32, height: u32) -> Self {
        Self(GrayImage::from_pixel(width, height, Luma([VALID])))
    }

    pub fn none_valid(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// Out-of-bounds pixels are invalid.
    #[inline]
    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        x < self.0.width() && y < self.0.height() && self.0.get_pixel(x, y)[0] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, valid: bool) {
        if x < self.0.width() && y < self.0.height() {
            self.0.put_pixel(x, y, Luma([if valid { VALID } else { 0 }]));
        }
    }

    pub fn valid_count(&self) -> usize {
        self.0.as_raw().iter().filter(|&&v| v != 0).count()
    }

    /// Resize to `width × height`, reallocating only on a size change.
    /// Contents are unspecified afterwards.
    fn ensure_size(&mut self, width: u32, height: u32) {
        if self.dimensions() != (width, height) {
            self.0 = GrayImage::new(width, height);
        }
    }

    /// Exclude everything outside the ring between `pupil` scaled by
    /// `config.pupil_margin` and a circle of `outer_radius` around the pupil
    /// center.
    pub fn restrict_to_annulus(&mut self, pupil: &Ellipse, outer_radius: f64, config: &MaskConfig) {
        if !pupil.is_found() || outer_radius <= 0.0 {
            self.0.fill(0);
            return;
        }
        let inner = pupil.scaled(config.pupil_margin);
        let r2 = outer_radius * outer_radius;
        for (x, y, p) in self.0.enumerate_pixels_mut() {
            if p[0] == 0 {
                continue;
            }
            let (fx, fy) = (x as f64, y as f64);
            let (dx, dy) = (fx - pupil.cx, fy - pupil.cy);
            if dx * dx + dy * dy > r2 || inner.contains(fx, fy) {
                *p = Luma([0]);
            }
        }
    }

    /// `255`/`0` view, e.g. for saving as a debug image.
    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

/// Eyelid and reflection exclusion.
///
/// Pixels at or above `bright` are reflections; they are grown by
/// `config.reflection_dilation_px` (chessboard distance) before removal.
pub fn occlusion_mask(
    image: &GrayImage,
    eyelids: &EyelidBoundary,
    bright: u8,
    config: &MaskConfig,
) -> Mask {
    let mut out = Mask::none_valid(0, 0);
    occlusion_mask_into(image, eyelids, bright, config, &mut GrayImage::new(0, 0), &mut out);
    out
}

/// [`occlusion_mask`] written into `out`, with `reflections` as scratch.
/// Both buffers are resized to the frame only when their size differs.
pub fn occlusion_mask_into(
    image: &GrayImage,
    eyelids: &EyelidBoundary,
    bright: u8,
    config: &MaskConfig,
    reflections: &mut GrayImage,
    out: &mut Mask,
) {
    let (w, h) = image.dimensions();
    if reflections.dimensions() != (w, h) {
        *reflections = GrayImage::new(w, h);
    }
    for (r, p) in reflections.iter_mut().zip(image.iter()) {
        *r = if *p >= bright { VALID } else { 0 };
    }
    if config.reflection_dilation_px > 0 {
        imageproc::morphology::dilate_mut(reflections, Norm::LInf, config.reflection_dilation_px);
    }

    out.ensure_size(w, h);
    for (x, y, p) in out.0.enumerate_pixels_mut() {
        let open = reflections.get_pixel(x, y)[0] == 0 && eyelids.is_open(x as f64, y as f64);
        *p = Luma([if open { VALID } else { 0 }]);
    }
}

/// Ring between `pupil` scaled by `config.pupil_margin` and a circle of
/// `outer_radius` around the pupil center.
pub fn annulus_mask(
    width: u32,
    height: u32,
    pupil: &Ellipse,
    outer_radius: f64,
    config: &MaskConfig,
) -> Mask {
    let mut mask = Mask::all_valid(width, height);
    mask.restrict_to_annulus(pupil, outer_radius, config);
    mask
}

/// Full torsion mask: occlusion intersected with the iris annulus.
pub fn get_mask(
    image: &GrayImage,
    eyelids: &EyelidBoundary,
    pupil: &Ellipse,
    bright: u8,
    max_iris_radius_px: f64,
    config: &MaskConfig,
) -> Mask {
    let mut mask = occlusion_mask(image, eyelids, bright, config);
    mask.restrict_to_annulus(pupil, max_iris_radius_px, config);
    mask
}
