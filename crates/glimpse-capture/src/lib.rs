//! glimpse‑capture – snapshot the live frame into a transport‑ready JPEG.
//!
//! [`capture`] reads the surface's current frame at its *intrinsic*
//! resolution, converts NV12 → RGB into an offscreen buffer of exactly
//! that size, optionally downscales it and encodes it once. The buffer is
//! dropped as soon as the JPEG exists; no frame outlives a capture.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use glimpse_camera::{CameraSession, StreamState, VideoFrame};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GenericImageView, RgbImage};
use log::debug;
use resize::{new, Pixel, Type};
use rgb::FromSlice;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const JPEG_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera not ready: {0}")]
    NotReady(&'static str),
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },
    #[error("resize failed: {0}")]
    Resize(#[from] resize::Error),
    #[error("image encode/decode failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// JPEG quality, 1‑100.
    pub jpeg_quality: u8,
    /// Downscale so the longer edge is at most this many pixels.
    pub max_edge: Option<u32>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self { jpeg_quality: 85, max_edge: None }
    }
}

/// An encoded still plus the pixel size it was encoded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    mime: &'static str,
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl CapturedFrame {
    pub fn mime(&self) -> &str {
        self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encode an already decoded still, e.g. a file analyzed without a camera.
    pub fn from_image(image: &DynamicImage, options: &CaptureOptions) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CaptureError::NotReady("image has zero size"));
        }
        encode_rgb(image.to_rgb8(), options)
    }

    /// `data:<mime>;base64,<body>`
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Decode the payload back into pixels (compositing, debugging).
    pub fn decode(&self) -> Result<DynamicImage> {
        Ok(image::load_from_memory(&self.bytes)?)
    }
}

/// Snapshot the session's current frame.
///
/// `NotReady` when the session is no longer granted or the surface has not
/// shown a frame with pixels yet.
pub fn capture(session: &CameraSession, options: &CaptureOptions) -> Result<CapturedFrame> {
    if session.state() != StreamState::Granted {
        return Err(CaptureError::NotReady("camera session is not live"));
    }
    let frame = session
        .surface()
        .latest_frame()
        .ok_or(CaptureError::NotReady("video surface has no frame yet"))?;
    encode_frame(&frame, options)
}

/// Convert and encode one frame; the RGB buffer lives only inside this call.
pub fn encode_frame(frame: &VideoFrame, options: &CaptureOptions) -> Result<CapturedFrame> {
    let (w, h) = frame
        .intrinsic_size()
        .ok_or(CaptureError::NotReady("video surface has zero intrinsic size"))?;

    let rgb = frame_to_rgb(frame)?;
    let captured = encode_rgb(rgb, options)?;
    debug!(
        "captured {}x{} → {}x{} jpeg, {} bytes",
        w, h, captured.width, captured.height, captured.bytes.len()
    );
    Ok(captured)
}

fn encode_rgb(mut rgb: RgbImage, options: &CaptureOptions) -> Result<CapturedFrame> {
    if let Some(edge) = options.max_edge {
        if rgb.width().max(rgb.height()) > edge && edge > 0 {
            rgb = downscale(&rgb, edge)?;
        }
    }

    let mut bytes = Vec::new();
    let quality = options.jpeg_quality.clamp(1, 100);
    JpegEncoder::new_with_quality(&mut bytes, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;

    Ok(CapturedFrame {
        mime: JPEG_MIME,
        width: rgb.width(),
        height: rgb.height(),
        bytes,
    })
}

/// NV12 frame → offscreen RGB buffer of the frame's intrinsic size.
pub fn frame_to_rgb(frame: &VideoFrame) -> Result<RgbImage> {
    let w = frame.width as usize;
    let h = frame.height as usize;
    let stride = (frame.stride as usize).max(w);

    // Y plane and interleaved UV plane sizes
    let y_len = stride * h;
    let expected = y_len + stride * h.div_ceil(2);
    if frame.data.len() < expected {
        return Err(CaptureError::ShortFrame { expected, actual: frame.data.len() });
    }
    let (y_plane, uv_plane) = frame.data.split_at(y_len);

    let mut out = vec![0u8; w * h * 3];
    nv12_to_rgb(y_plane, uv_plane, w, h, stride, &mut out);
    RgbImage::from_raw(frame.width, frame.height, out)
        .ok_or(CaptureError::ShortFrame { expected: w * h * 3, actual: 0 })
}

/// Lanczos3 downscale so the longer edge equals `edge`, keeping aspect.
fn downscale(src: &RgbImage, edge: u32) -> Result<RgbImage> {
    let (w, h) = src.dimensions();
    let scale = edge as f32 / w.max(h) as f32;
    let dw = ((w as f32 * scale).round() as u32).max(1);
    let dh = ((h as f32 * scale).round() as u32).max(1);

    let mut dst = vec![0u8; (dw * dh * 3) as usize];
    let mut resizer = new(
        w as usize,
        h as usize,
        dw as usize,
        dh as usize,
        Pixel::RGB8,
        Type::Lanczos3,
    )?;
    resizer.resize(src.as_raw().as_rgb(), dst.as_rgb_mut())?;

    RgbImage::from_raw(dw, dh, dst).ok_or(CaptureError::ShortFrame {
        expected: (dw * dh * 3) as usize,
        actual: 0,
    })
}

/// Naive NV12 4:2:0 → RGB24 conversion (BT.601, full range).
fn nv12_to_rgb(y: &[u8], uv: &[u8], w: usize, h: usize, stride: usize, out: &mut [u8]) {
    for j in 0..h {
        for i in 0..w {
            let y_val = y[j * stride + i] as f32;
            let uv_idx = (j / 2) * stride + (i & !1);
            let u = *uv.get(uv_idx).unwrap_or(&128) as f32 - 128.0;
            let v = *uv.get(uv_idx + 1).unwrap_or(&128) as f32 - 128.0;

            let r = (y_val + 1.402 * v).clamp(0.0, 255.0);
            let g = (y_val - 0.344_13 * u - 0.714_14 * v).clamp(0.0, 255.0);
            let b = (y_val + 1.772 * u).clamp(0.0, 255.0);

            let base = (j * w + i) * 3;
            out[base]     = r as u8;
            out[base + 1] = g as u8;
            out[base + 2] = b as u8;
        }
    }
}
