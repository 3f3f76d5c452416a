use crate::geometry::{DisplaySize, PixelRect};
use crate::layout::{layout, BitmapFont, OverlayStyle, RenderableOverlay};
use glimpse_analyze::AnalysisResult;

/// One canvas operation. A render is a flat list of these, always starting
/// with `Resize` then `Clear`.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintOp {
    Resize(DisplaySize),
    Clear,
    StrokeRect { rect: PixelRect, color: [u8; 4], width: f32 },
    FillRect { rect: PixelRect, color: [u8; 4] },
    Text { x: f32, y: f32, text: String, color: [u8; 4], scale: u32 },
}

/// Surface the overlay paints onto.
pub trait Canvas {
    /// Match the pixel buffer to `size`; contents may be discarded.
    fn resize(&mut self, size: DisplaySize);
    fn clear(&mut self);
    fn stroke_rect(&mut self, rect: &PixelRect, color: [u8; 4], width: f32);
    fn fill_rect(&mut self, rect: &PixelRect, color: [u8; 4]);
    fn fill_text(&mut self, x: f32, y: f32, text: &str, color: [u8; 4], scale: u32);
}

/// Pure render: displayed size + latest result → paint operations.
pub fn render(size: DisplaySize, result: Option<&AnalysisResult>, style: &OverlayStyle) -> Vec<PaintOp> {
    let font = BitmapFont::new(style.font_scale);
    to_ops(&layout(size, result, style, &font), style)
}

/// Turn a laid-out overlay into paint operations.
pub fn to_ops(overlay: &RenderableOverlay, style: &OverlayStyle) -> Vec<PaintOp> {
    let mut ops = vec![PaintOp::Resize(overlay.size), PaintOp::Clear];
    for b in &overlay.boxes {
        ops.push(PaintOp::StrokeRect {
            rect: b.rect,
            color: style.stroke_color,
            width: style.stroke_width,
        });
    }
    // labels after all boxes so no stroke cuts through a label
    for label in overlay.boxes.iter().filter_map(|b| b.label.as_ref()) {
        ops.push(PaintOp::FillRect { rect: label.rect, color: style.label_background });
        for line in &label.lines {
            ops.push(PaintOp::Text {
                x: line.x,
                y: line.y,
                text: line.text.clone(),
                color: style.label_color,
                scale: style.font_scale.max(1),
            });
        }
    }
    ops
}

/// Replay `ops` onto `canvas`.
pub fn paint<C: Canvas + ?Sized>(canvas: &mut C, ops: &[PaintOp]) {
    for op in ops {
        match op {
            PaintOp::Resize(size) => canvas.resize(*size),
            PaintOp::Clear => canvas.clear(),
            PaintOp::StrokeRect { rect, color, width } => canvas.stroke_rect(rect, *color, *width),
            PaintOp::FillRect { rect, color } => canvas.fill_rect(rect, *color),
            PaintOp::Text { x, y, text, color, scale } => canvas.fill_text(*x, *y, text, *color, *scale),
        }
    }
}
