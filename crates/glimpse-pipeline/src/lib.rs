// glimpse-pipeline/src/lib.rs
// ============================================================
// glimpse-pipeline  –  end-to-end glue for Glimpse
// One Annotator per view: owns the camera session, snapshots
// frames on demand, runs them through the analysis service
// and keeps the overlay canvas matched to the latest result
// at the currently displayed size.
// ------------------------------------------------------------
// Public API
//   * Annotator::acquire / release
//   * Annotator::capture_and_analyze()  – one user-triggered shot
//   * Annotator::run_overlay(canvas)    – measure → recompute → paint
//   * GlimpseConfig::load(path)         – JSON config
// ============================================================

//! Glimpse – pipeline layer
//!
//! Data only flows one way: camera → capture → analyze → overlay. The UI
//! layer publishes the displayed size of the video surface through
//! [`Annotator::display_sizes`] and reads state through the `watch`
//! receivers returned by [`Annotator::results`] and [`Annotator::busy`].
//!
//! A failed analysis never blanks an overlay that already shows a
//! successful result; its cause is exposed by [`Annotator::last_error`].

use glimpse_analyze::AnalyzeError;
use glimpse_camera::CameraError;
use glimpse_capture::CaptureError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

mod annotator;
mod config;

pub use annotator::Annotator;
pub use config::GlimpseConfig;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("camera has not been acquired")]
    NotAcquired,
    #[error("camera produced no frame within {0:?}")]
    CameraNotReady(Duration),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzeError),
    #[error("failed to read config {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
