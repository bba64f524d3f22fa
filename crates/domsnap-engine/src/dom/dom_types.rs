//! Shared DOM types: viewport, bounding box and the capture window.

use serde::{Deserialize, Serialize};

/// Viewport information for coordinate calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportInfo {
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Device pixel ratio.
    pub device_pixel_ratio: f64,
    /// Scroll X offset.
    pub scroll_x: f64,
    /// Scroll Y offset.
    pub scroll_y: f64,
}

impl Default for ViewportInfo {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            device_pixel_ratio: 1.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// Bounding box in top-level viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// A box with zero width or height never counts as rendered.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Check if a point is inside this bounding box.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Get the center point of this bounding box.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Check if this box intersects with another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Shift the box by an offset, e.g. from frame-local to top-level coordinates.
    pub fn translate(&self, dx: f64, dy: f64) -> BoundingBox {
        BoundingBox::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// The viewport grown by the configured expansion on every side.
///
/// An expansion of `-1` means the window is unlimited and every box is in view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureWindow {
    pub width: f64,
    pub height: f64,
    pub expansion: i32,
}

impl CaptureWindow {
    pub fn new(viewport: &ViewportInfo, expansion: i32) -> Self {
        Self {
            width: viewport.width as f64,
            height: viewport.height as f64,
            expansion,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.expansion < 0
    }

    /// Whether the box lies at least partly inside the expanded window.
    ///
    /// Edges touching the window count as inside.
    pub fn overlaps(&self, rect: &BoundingBox) -> bool {
        if self.is_unlimited() {
            return true;
        }
        let e = self.expansion as f64;
        !(rect.bottom() < -e
            || rect.top() > self.height + e
            || rect.right() < -e
            || rect.left() > self.width + e)
    }
}
