use crate::geometry::{DisplaySize, PixelRect};
use crate::layout::{BitmapFont, GLYPH_SIZE};
use crate::paint::Canvas;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Transparent RGBA overlay buffer.
#[derive(Debug, Clone, Default)]
pub struct RasterCanvas {
    image: RgbaImage,
}

impl RasterCanvas {
    pub fn new(size: DisplaySize) -> Self {
        Self { image: RgbaImage::new(size.width, size.height) }
    }

    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Alpha-composite the overlay over `base` (e.g. the frame scaled to
    /// the displayed size).
    pub fn composite_onto(&self, base: &mut RgbaImage) {
        image::imageops::overlay(base, &self.image, 0, 0);
    }

    /// Integer pixel span `[x0, x1) × [y0, y1)` of `rect`, clipped to the buffer.
    fn span(&self, rect: &PixelRect) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = (self.image.width() as f32, self.image.height() as f32);
        let x0 = rect.x.round().clamp(0.0, w) as u32;
        let y0 = rect.y.round().clamp(0.0, h) as u32;
        let x1 = rect.right().round().clamp(0.0, w) as u32;
        let y1 = rect.bottom().round().clamp(0.0, h) as u32;
        (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
    }

    fn blend(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let dst = *self.image.get_pixel(x, y);
        self.image.put_pixel(x, y, blend_pixel(dst, Rgba(color)));
    }
}

impl Canvas for RasterCanvas {
    fn resize(&mut self, size: DisplaySize) {
        if self.size() != size {
            self.image = RgbaImage::new(size.width, size.height);
        }
    }

    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    fn stroke_rect(&mut self, rect: &PixelRect, color: [u8; 4], width: f32) {
        let Some((x0, y0, x1, y1)) = self.span(rect) else {
            return;
        };
        // strokes grow inward so the outline never leaves the box
        let thickness = width.round().max(1.0) as u32;
        for t in 0..thickness {
            let (w, h) = ((x1 - x0).saturating_sub(2 * t), (y1 - y0).saturating_sub(2 * t));
            if w == 0 || h == 0 {
                break;
            }
            let r = Rect::at((x0 + t) as i32, (y0 + t) as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut self.image, r, Rgba(color));
        }
    }

    fn fill_rect(&mut self, rect: &PixelRect, color: [u8; 4]) {
        let Some((x0, y0, x1, y1)) = self.span(rect) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, color);
            }
        }
    }

    fn fill_text(&mut self, x: f32, y: f32, text: &str, color: [u8; 4], scale: u32) {
        let scale = scale.max(1) as i32;
        let (w, h) = (self.image.width() as i32, self.image.height() as i32);
        let mut cursor_x = x.round() as i32;
        let top = y.round() as i32;
        for ch in text.chars() {
            if let Some(glyph) = BitmapFont::glyph(ch) {
                for (row_idx, row_bits) in glyph.iter().enumerate() {
                    for col_idx in 0..GLYPH_SIZE as i32 {
                        if (row_bits >> col_idx) & 1 == 0 {
                            continue;
                        }
                        let px = cursor_x + col_idx * scale;
                        let py = top + row_idx as i32 * scale;
                        for sy in 0..scale {
                            for sx in 0..scale {
                                let (tx, ty) = (px + sx, py + sy);
                                if tx >= 0 && ty >= 0 && tx < w && ty < h {
                                    self.blend(tx as u32, ty as u32, color);
                                }
                            }
                        }
                    }
                }
            }
            cursor_x += GLYPH_SIZE as i32 * scale;
        }
    }
}

/// Straight-alpha "over".
fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f32::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let da = f32::from(dst[3]) / 255.0;
    let out_a = a + da * inv;
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |i: usize| {
        ((f32::from(src[i]) * a + f32::from(dst[i]) * da * inv) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::OverlayStyle;
    use crate::paint::{paint, render};
    use glimpse_analyze::{AnalysisResult, BoundingBox, Detection};

    fn result() -> AnalysisResult {
        let d = |x, y, w, h| Detection {
            bounding_box: Some(BoundingBox::new(x, y, w, h)),
            age_range_estimate: "18-25".into(),
            gender_estimate: "male".into(),
            mood_estimate: "focused".into(),
            ..Default::default()
        };
        AnalysisResult::success(vec![d(0.1, 0.1, 0.3, 0.3), d(0.5, 0.9, 0.4, 0.1)], "two")
    }

    fn drawn(size: DisplaySize, result: &AnalysisResult) -> RgbaImage {
        let mut canvas = RasterCanvas::default();
        paint(&mut canvas, &render(size, Some(result), &OverlayStyle::default()));
        canvas.into_image()
    }

    #[test]
    fn stroke_lands_on_box_edges() {
        let size = DisplaySize::new(640, 480);
        let only_box = AnalysisResult::success(
            vec![Detection { bounding_box: Some(BoundingBox::new(0.1, 0.1, 0.3, 0.3)), ..Default::default() }],
            "one",
        );
        let img = drawn(size, &only_box);
        let green = Rgba([0, 255, 0, 255]);
        assert_eq!(*img.get_pixel(64, 48), green);
        assert_eq!(*img.get_pixel(64 + 191, 48 + 143), green);
        assert_eq!(*img.get_pixel(65, 49), green); // 2px stroke
        assert_eq!(img.get_pixel(100, 100)[3], 0);
        assert_eq!(img.get_pixel(63, 47)[3], 0);
    }

    #[test]
    fn rerender_is_pixel_identical() {
        let size = DisplaySize::new(320, 240);
        let r = result();
        let ops = render(size, Some(&r), &OverlayStyle::default());

        let mut canvas = RasterCanvas::default();
        paint(&mut canvas, &ops);
        let first = canvas.image().clone();
        paint(&mut canvas, &ops);
        assert_eq!(canvas.image(), &first);
    }

    #[test]
    fn resize_leaves_no_artifacts() {
        let r = result();
        let style = OverlayStyle::default();
        let (s1, s2) = (DisplaySize::new(640, 480), DisplaySize::new(300, 200));

        let mut canvas = RasterCanvas::default();
        paint(&mut canvas, &render(s1, Some(&r), &style));
        paint(&mut canvas, &render(s2, Some(&r), &style));

        assert_eq!(canvas.size(), s2);
        assert_eq!(canvas.image(), &drawn(s2, &r));
    }

    #[test]
    fn new_result_replaces_old_boxes() {
        let size = DisplaySize::new(320, 240);
        let mut canvas = RasterCanvas::new(size);
        paint(&mut canvas, &render(size, Some(&result()), &OverlayStyle::default()));
        let empty = AnalysisResult::success(vec![], "No clearly analyzable faces were detected.");
        paint(&mut canvas, &render(size, Some(&empty), &OverlayStyle::default()));
        assert!(canvas.image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn label_background_is_translucent() {
        let size = DisplaySize::new(640, 480);
        let img = drawn(size, &result());
        // inside the first label block, left of any glyph
        let px = img.get_pixel(64 + 2, 48 + 2);
        assert_eq!(px[3], 160);
    }

    #[test]
    fn blending_over_transparent_keeps_source() {
        let out = blend_pixel(Rgba([0, 0, 0, 0]), Rgba([10, 20, 30, 128]));
        assert_eq!(out, Rgba([10, 20, 30, 128]));
    }
}
