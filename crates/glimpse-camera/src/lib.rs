// glimpse-camera/src/lib.rs
// ============================================================
// Stream lifecycle crate for Glimpse
// Owns the physical camera: acquires it (GStreamer pipeline),
// pumps NV12 frames into a single VideoSurface and releases
// every track on teardown.
// ------------------------------------------------------------
// Public API:
//   * StreamManager::acquire() – async, yields a CameraSession
//   * CameraSession::release() – idempotent teardown
//   * VideoSurface            – latest frame + first-frame wait
// ------------------------------------------------------------
// Build notes
//   * libcamerasrc is used when present and no device is
//     configured, v4l2src otherwise.
// ============================================================

//! Glimpse – camera lifecycle layer
//!
//! A [`StreamManager`] walks the `Uninitialized → Requesting →
//! {Granted, Denied}` state machine on [`StreamManager::acquire`]. A
//! granted [`CameraSession`] owns the device track exclusively and binds
//! it to one [`VideoSurface`] through a pump thread; capture and overlay
//! code only ever see the surface.
//!
//! Device access sits behind the [`CameraBackend`] / [`CameraTrack`]
//! traits so the lifecycle can be exercised without hardware. The
//! production backend is [`GstBackend`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

mod gst_backend;
mod session;
mod stream;
mod surface;

pub use gst_backend::GstBackend;
pub use session::{CameraSession, PermissionState, StreamManager, StreamState};
pub use surface::VideoSurface;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no camera device available: {0}")]
    DeviceUnavailable(String),
    #[error("a camera session is already live or being requested")]
    AlreadyAcquired,
    #[error("camera stream stopped")]
    Stopped,
    #[error("no frame produced within {0:?}")]
    FrameTimeout(Duration),
    #[error("GStreamer init failed: {0}")]
    GstInit(#[source] gst::glib::Error),
    #[error("Failed to parse pipeline: {0}")]
    ParsePipeline(#[source] gst::glib::Error),
    #[error("Pipeline is not a gst::Pipeline")]
    NotPipeline,
    #[error("AppSink element not found")]
    AppSinkNotFound,
    #[error("AppSink element downcast failed")]
    AppSinkDowncastFailed,
    #[error("Failed to set pipeline to Playing: {0}")]
    StateChange(#[source] gst::StateChangeError),
    #[error("Failed to pull sample: {0}")]
    PullSample(#[source] gst::glib::BoolError),
    #[error("Sample has no buffer")]
    MissingBuffer,
    #[error("Sample has no caps")]
    MissingCaps,
    #[error("Caps are not raw video: {0}")]
    VideoInfo(String),
    #[error("NV12 buffer too short: {0}")]
    ShortBuffer(String),
    #[error("Buffer map failed: {0}")]
    BufferMap(String),
    #[error("failed to start frame pump: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("camera open task failed: {0}")]
    Join(String),
}

impl CameraError {
    /// Permission and device errors block the feature; everything else is
    /// a pipeline fault.
    pub fn is_blocking(&self) -> bool {
        matches!(self, CameraError::PermissionDenied(_) | CameraError::DeviceUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CameraError>;

/// One NV12 frame copied out of the device: Y plane (`stride * height`)
/// followed by the interleaved UV plane.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pts: Duration,
}

impl VideoFrame {
    /// Intrinsic pixel dimensions; `None` until the device produced pixels.
    pub fn intrinsic_size(&self) -> Option<(u32, u32)> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some((self.width, self.height))
        }
    }
}

/// Requested capture format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// V4L2 device node. `None` prefers libcamera, then `/dev/video0`.
    pub device: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Opens the physical device. Called on the blocking pool.
pub trait CameraBackend: Send + Sync + 'static {
    fn open(&self, config: &CameraConfig) -> Result<Box<dyn CameraTrack>>;
}

/// A live device track.
///
/// `next_frame` blocks until the device delivers a frame; after `stop`
/// it must return an error rather than block forever.
pub trait CameraTrack: Send + Sync {
    fn next_frame(&self) -> Result<VideoFrame>;
    fn stop(&self);
}
