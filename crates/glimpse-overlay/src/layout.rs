//! Box projection and label placement.
//!
//! Labels default to the box's top-left corner, flowing down into the box.
//! A block that would run off the bottom flips above the box when there is
//! room there, otherwise it is pinned inside the canvas; horizontal
//! overflow shifts it left. The block never leaves the canvas, and lines
//! that cannot fit vertically at all are dropped from the end.

use crate::geometry::{denormalize, DisplaySize, PixelRect};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use glimpse_analyze::{AnalysisResult, Detection};
use log::debug;
use serde::{Deserialize, Serialize};

pub const GLYPH_SIZE: u32 = 8;

/// Colours and spacing of the overlay. Colours are straight RGBA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub stroke_color: [u8; 4],
    pub stroke_width: f32,
    pub label_background: [u8; 4],
    pub label_color: [u8; 4],
    /// Integer scale of the 8×8 bitmap font.
    pub font_scale: u32,
    pub padding: f32,
    pub line_spacing: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke_color: [0, 255, 0, 255],
            stroke_width: 2.0,
            label_background: [0, 0, 0, 160],
            label_color: [255, 255, 255, 255],
            font_scale: 1,
            padding: 4.0,
            line_spacing: 3.0,
        }
    }
}

impl OverlayStyle {
    pub fn line_height(&self, measure: &impl TextMeasure) -> f32 {
        measure.glyph_height() + self.line_spacing.max(0.0)
    }
}

/// Text metrics seam, so layout can be computed without a real font.
pub trait TextMeasure {
    fn text_width(&self, text: &str) -> f32;
    fn glyph_height(&self) -> f32;
}

/// Fixed-advance metrics of the `font8x8` bitmap font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapFont {
    pub scale: u32,
}

impl BitmapFont {
    pub fn new(scale: u32) -> Self {
        Self { scale: scale.max(1) }
    }

    /// 8 rows of 8 bits, LSB leftmost; unknown characters render as '?'.
    pub fn glyph(ch: char) -> Option<[u8; 8]> {
        BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?'))
    }
}

impl TextMeasure for BitmapFont {
    fn text_width(&self, text: &str) -> f32 {
        (text.chars().count() as u32 * GLYPH_SIZE * self.scale) as f32
    }

    fn glyph_height(&self) -> f32 {
        (GLYPH_SIZE * self.scale) as f32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelLine {
    pub text: String,
    /// Top-left of the line's glyph cell.
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelBlock {
    pub rect: PixelRect,
    pub lines: Vec<LabelLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
    /// Position of the detection in the result's list.
    pub index: usize,
    pub rect: PixelRect,
    pub label: Option<LabelBlock>,
}

/// Everything needed to paint one result at one displayed size.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderableOverlay {
    pub size: DisplaySize,
    pub boxes: Vec<OverlayBox>,
}

/// Short lines shown next to a box; empty fields are left out.
pub fn label_lines(detection: &Detection) -> Vec<String> {
    [
        ("Age", &detection.age_range_estimate),
        ("Gender", &detection.gender_estimate),
        ("Mood", &detection.mood_estimate),
    ]
    .iter()
    .filter(|(_, v)| !v.trim().is_empty())
    .map(|(k, v)| format!("{k}: {}", v.trim()))
    .collect()
}

/// Project `result` onto a canvas of `size`.
pub fn layout(
    size: DisplaySize,
    result: Option<&AnalysisResult>,
    style: &OverlayStyle,
    measure: &impl TextMeasure,
) -> RenderableOverlay {
    let mut overlay = RenderableOverlay { size, boxes: Vec::new() };
    let Some(result) = result else {
        return overlay;
    };
    if size.is_empty() {
        return overlay;
    }

    for (index, detection) in result.detections().iter().enumerate() {
        let Some(bbox) = &detection.bounding_box else {
            continue;
        };
        let Some(rect) = denormalize(bbox, size) else {
            debug!("detection {index}: box {bbox:?} has no visible area, skipped");
            continue;
        };
        let label = label_block(&rect, &label_lines(detection), size, style, measure);
        overlay.boxes.push(OverlayBox { index, rect, label });
    }
    overlay
}

fn label_block(
    anchor: &PixelRect,
    lines: &[String],
    size: DisplaySize,
    style: &OverlayStyle,
    measure: &impl TextMeasure,
) -> Option<LabelBlock> {
    let pad = style.padding.max(0.0);
    let line_h = style.line_height(measure);
    let (cw, ch) = (size.width as f32, size.height as f32);

    // keep only as many lines as the canvas can hold
    let room = ((ch - 2.0 * pad) / line_h).floor().max(0.0) as usize;
    let lines = &lines[..lines.len().min(room)];
    if lines.is_empty() {
        return None;
    }

    let text_w = lines.iter().map(|l| measure.text_width(l)).fold(0.0, f32::max);
    let w = (text_w + 2.0 * pad).min(cw);
    let h = lines.len() as f32 * line_h + 2.0 * pad;

    let (x, y) = place_label(anchor, w, h, size);
    let rect = PixelRect::new(x, y, w, h);
    let lines = lines
        .iter()
        .enumerate()
        .map(|(i, text)| LabelLine {
            text: text.clone(),
            x: x + pad,
            y: y + pad + i as f32 * line_h,
        })
        .collect();
    debug_assert!(rect.is_within(size) || w > cw);
    Some(LabelBlock { rect, lines })
}

/// Top-left corner for a `w`×`h` label block next to `anchor`.
pub fn place_label(anchor: &PixelRect, w: f32, h: f32, size: DisplaySize) -> (f32, f32) {
    let (cw, ch) = (size.width as f32, size.height as f32);

    let x = if anchor.x + w > cw { cw - w } else { anchor.x };

    let mut y = anchor.y;
    if y + h > ch {
        let above = anchor.y - h;
        y = if above >= 0.0 { above } else { ch - h };
    }

    (x.max(0.0), y.max(0.0))
}
