//! Canvas sizes, pixel rectangles and denormalization.

use glimpse_analyze::BoundingBox;
use serde::{Deserialize, Serialize};

/// Displayed (layout) size of the video surface, which the overlay canvas
/// always matches 1:1. Not the intrinsic capture resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Containment with a sub-pixel allowance for float rounding.
    pub fn is_within(&self, size: DisplaySize) -> bool {
        const SLACK: f32 = 1e-3;
        self.x >= 0.0
            && self.y >= 0.0
            && self.right() <= size.width as f32 + SLACK
            && self.bottom() <= size.height as f32 + SLACK
    }
}

/// Project a normalized box onto a canvas of `size`.
///
/// The result is clamped to the canvas; `None` for non-finite input or a
/// box with no visible area left after clamping.
pub fn denormalize(bbox: &BoundingBox, size: DisplaySize) -> Option<PixelRect> {
    let vals = [bbox.x, bbox.y, bbox.width, bbox.height];
    if size.is_empty() || !vals.iter().all(|v| v.is_finite()) {
        return None;
    }
    let (cw, ch) = (size.width as f32, size.height as f32);

    let px = bbox.x * cw;
    let py = bbox.y * ch;
    let pw = bbox.width * cw;
    let ph = bbox.height * ch;

    let x0 = px.clamp(0.0, cw);
    let y0 = py.clamp(0.0, ch);
    let x1 = (px + pw).clamp(x0, cw);
    let y1 = (py + ph).clamp(y0, ch);

    let rect = PixelRect::new(x0, y0, x1 - x0, y1 - y0);
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    Some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn scales_by_displayed_size() {
        let r = denormalize(&BoundingBox::new(0.1, 0.1, 0.3, 0.3), DisplaySize::new(640, 480)).unwrap();
        assert!(close(r.x, 64.0) && close(r.y, 48.0));
        assert!(close(r.width, 192.0) && close(r.height, 144.0));
    }

    #[test]
    fn overhanging_box_is_clamped() {
        let size = DisplaySize::new(100, 50);
        let r = denormalize(&BoundingBox::new(0.9, -0.2, 0.5, 0.5), size).unwrap();
        assert!(r.is_within(size));
        assert!(close(r.x, 90.0) && close(r.width, 10.0));
        assert!(close(r.y, 0.0) && close(r.height, 15.0));
    }

    #[test]
    fn degenerate_boxes_are_dropped() {
        let size = DisplaySize::new(100, 100);
        assert!(denormalize(&BoundingBox::new(f32::NAN, 0.0, 0.1, 0.1), size).is_none());
        assert!(denormalize(&BoundingBox::new(0.5, 0.5, -0.2, 0.1), size).is_none());
        assert!(denormalize(&BoundingBox::new(1.2, 0.0, 0.1, 0.1), size).is_none());
        assert!(denormalize(&BoundingBox::new(0.1, 0.1, 0.1, 0.1), DisplaySize::new(0, 10)).is_none());
    }
}
