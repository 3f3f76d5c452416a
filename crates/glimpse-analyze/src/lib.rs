// glimpse-analyze/src/lib.rs
// ============================================================
// glimpse-analyze  –  analysis request stage for Glimpse
// Sends one captured frame to the external analysis service
// and normalizes whatever comes back into an AnalysisResult.
// ------------------------------------------------------------
// Pipeline: CapturedFrame → POST (data URI) → AnalysisResult
// ------------------------------------------------------------
// Public API
//   * HttpAnalyzer::new(cfg)       – reqwest-backed service client
//   * AnalysisCoordinator::analyze – single-flight, latest id wins
// ============================================================

//! Glimpse – analysis layer
//!
//! A backend-agnostic [`AnalysisBackend`] trait plus the HTTP
//! implementation [`HttpAnalyzer`]. Backends never return errors: every
//! transport or service failure is folded into an [`AnalysisResult`] with
//! `error_message` set, so callers only branch on that field.
//!
//! [`AnalysisCoordinator`] tags each request with a monotonically
//! increasing [`RequestId`] and applies a response to the shared latest
//! result only if no newer request has been issued since.

use glimpse_capture::CapturedFrame;
use std::future::Future;
use thiserror::Error;

mod coordinator;
mod http;
mod model;

pub use coordinator::{AnalysisCoordinator, Completion, RequestId};
pub use http::{AnalyzerConfig, HttpAnalyzer};
pub use model::{parse_response, AnalysisResult, BoundingBox, Detection};

/// Why a request produced no usable detections.
#[derive(Debug, Error)]
pub enum AnalysisFailure {
    #[error("could not reach the analysis service: {0}")]
    Transport(String),
    #[error("analysis service answered HTTP {0}")]
    Status(u16),
    #[error("unreadable analysis response: {0}")]
    MalformedBody(String),
    #[error("{0}")]
    Service(String),
}

impl AnalysisFailure {
    /// User-facing summary line for the failure shape.
    pub fn summary(&self) -> &'static str {
        match self {
            AnalysisFailure::Transport(_) => "Analysis failed: the analysis service could not be reached.",
            AnalysisFailure::Status(_) => "Analysis failed: the analysis service returned an error.",
            AnalysisFailure::MalformedBody(_) => "Analysis failed: the analysis service sent an unreadable response.",
            AnalysisFailure::Service(_) => "Analysis failed.",
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("invalid analysis endpoint {0:?}")]
    Endpoint(String),
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;

/// Trait for analysis services.
pub trait AnalysisBackend: Send + Sync {
    fn analyze(&self, frame: &CapturedFrame) -> impl Future<Output = AnalysisResult> + Send;
}
