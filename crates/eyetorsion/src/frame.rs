//! Input frames and pixel-rectangle helpers.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Which eye a frame (or a pipeline instance) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    #[default]
    Left,
    Right,
    /// Both eyes share a single sensor image.
    Both,
}

/// One captured grayscale eye image.
///
/// Owned by the caller; the pipeline only reads it.
#[derive(Debug, Clone)]
pub struct ImageFrame {
    pub image: GrayImage,
    /// Monotonically increasing frame counter from the frame source.
    pub frame_number: u64,
    /// Capture time in seconds on the source's clock.
    pub timestamp: f64,
    pub eye: Eye,
}

impl ImageFrame {
    pub fn new(image: GrayImage, frame_number: u64, timestamp: f64, eye: Eye) -> Self {
        Self {
            image,
            frame_number,
            timestamp,
            eye,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Metadata describing this frame, without pixels.
    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            frame_number: self.frame_number,
            timestamp: self.timestamp,
            eye: self.eye,
            width: self.width(),
            height: self.height(),
        }
    }
}

/// Serializable identity of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame_number: u64,
    pub timestamp: f64,
    pub eye: Eye,
    pub width: u32,
    pub height: u32,
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Intersection with a `width × height` image; `None` when empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Roi> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.x.saturating_add(self.width).min(width);
        let y1 = self.y.saturating_add(self.height).min(height);
        (x1 > x0 && y1 > y0).then(|| Roi::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Bounding rectangle of `[x_min, y_min, x_max, y_max]` (float, inclusive).
    pub fn from_bounds(bounds: [f64; 4], width: u32, height: u32) -> Option<Roi> {
        let [x0, y0, x1, y1] = bounds;
        if !bounds.iter().all(|v| v.is_finite()) {
            return None;
        }
        let x0 = x0.floor().max(0.0) as u32;
        let y0 = y0.floor().max(0.0) as u32;
        let x1 = (x1.ceil() + 1.0).max(0.0) as u32;
        let y1 = (y1.ceil() + 1.0).max(0.0) as u32;
        Roi::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)).clamp_to(width, height)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
