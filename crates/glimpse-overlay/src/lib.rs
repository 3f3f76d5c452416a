// glimpse-overlay/src/lib.rs
// ============================================================
// glimpse-overlay  –  detection overlay for Glimpse
// Projects normalized detection boxes onto the displayed size
// of the video surface and paints outlines plus demographic
// labels onto a transparent canvas of exactly that size.
// ------------------------------------------------------------
// Pipeline: AnalysisResult + DisplaySize → layout → PaintOp[]
//           → Canvas (RasterCanvas over an RgbaImage)
// ------------------------------------------------------------
// Public API
//   * render(size, result, style) – pure, deterministic
//   * paint(canvas, ops)          – replay onto any Canvas
// ============================================================

//! Glimpse – overlay layer
//!
//! Rendering is a pure function of the displayed size and the latest
//! result: every call starts with a resize and a full clear, so repeating
//! a render yields identical pixels and nothing from an older result or
//! size survives. Layout is measured through [`TextMeasure`] and painted
//! through [`Canvas`], which keeps both testable without a window.

mod geometry;
mod layout;
mod paint;
mod raster;

pub use geometry::{denormalize, DisplaySize, PixelRect};
pub use layout::{
    label_lines, layout, place_label, BitmapFont, LabelBlock, LabelLine, OverlayBox, OverlayStyle,
    RenderableOverlay, TextMeasure, GLYPH_SIZE,
};
pub use paint::{paint, render, to_ops, Canvas, PaintOp};
pub use raster::RasterCanvas;
