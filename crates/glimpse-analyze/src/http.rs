use crate::{parse_response, AnalysisBackend, AnalysisFailure, AnalysisResult, AnalyzeError, Result};
use glimpse_capture::CapturedFrame;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where and how long to wait for the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/analyze".to_string(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    photo_data_uri: &'a str,
}

/// JSON-over-HTTP analysis client.
#[derive(Debug, Clone)]
pub struct HttpAnalyzer {
    client: Client,
    endpoint: String,
}

impl HttpAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        let endpoint = config.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(AnalyzeError::Endpoint(config.endpoint.clone()));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, endpoint: endpoint.to_string() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, frame: &CapturedFrame) -> std::result::Result<AnalysisResult, AnalysisFailure> {
        let data_uri = frame.to_data_uri();
        debug!(
            "POST {} ({}x{}, {} bytes encoded)",
            self.endpoint, frame.width(), frame.height(), data_uri.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnalyzeRequest { photo_data_uri: &data_uri })
            .send()
            .await
            .map_err(|e| AnalysisFailure::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AnalysisFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisFailure::Status(status.as_u16()));
        }
        Ok(parse_response(&body))
    }
}

impl AnalysisBackend for HttpAnalyzer {
    async fn analyze(&self, frame: &CapturedFrame) -> AnalysisResult {
        match self.call(frame).await {
            Ok(result) => {
                if let Some(err) = result.error_message() {
                    warn!("analysis service reported: {err}");
                }
                result
            }
            Err(failure) => {
                warn!("analysis request failed: {failure}");
                failure.into()
            }
        }
    }
}
