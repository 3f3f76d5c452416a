use crate::{PipelineError, Result};
use glimpse_analyze::AnalyzerConfig;
use glimpse_camera::CameraConfig;
use glimpse_capture::CaptureOptions;
use glimpse_overlay::OverlayStyle;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Everything an [`Annotator`](crate::Annotator) needs, loadable from one
/// JSON file. Missing sections and fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlimpseConfig {
    pub camera: CameraConfig,
    pub capture: CaptureOptions,
    pub analyzer: AnalyzerConfig,
    pub overlay: OverlayStyle,
    /// How long `capture_and_analyze` waits for the first frame.
    pub ready_timeout_ms: u64,
}

impl Default for GlimpseConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            capture: CaptureOptions::default(),
            analyzer: AnalyzerConfig::default(),
            overlay: OverlayStyle::default(),
            ready_timeout_ms: 5_000,
        }
    }
}

impl GlimpseConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}
