use image::GrayImage;

use crate::mask::Mask;
use crate::refine::EdgeScratch;
use crate::torsion::IrisStrip;

/// Buffers reused from frame to frame by one tracker.
#[derive(Debug, Clone)]
pub(crate) struct Workspace {
    /// Binarization buffer of the pupil locator.
    pub binary: GrayImage,
    /// Bright-pixel map, dilated in place.
    pub reflections: GrayImage,
    /// Occlusion mask of the current frame; narrowed to the annulus for
    /// masked torsion.
    pub occlusion: Mask,
    pub edge: EdgeScratch,
    pub strip: IrisStrip,
    /// `strip` holds the current frame's torsion image.
    pub has_strip: bool,
}

impl Workspace {
    pub fn new(strip: IrisStrip) -> Self {
        Self {
            binary: GrayImage::new(0, 0),
            reflections: GrayImage::new(0, 0),
            occlusion: Mask::none_valid(0, 0),
            edge: EdgeScratch::default(),
            strip,
            has_strip: false,
        }
    }
}
