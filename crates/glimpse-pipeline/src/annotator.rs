use crate::{GlimpseConfig, PipelineError, Result};
use glimpse_analyze::{AnalysisBackend, AnalysisCoordinator, AnalysisResult, HttpAnalyzer};
use glimpse_camera::{CameraBackend, CameraError, CameraSession, GstBackend, StreamManager, StreamState};
use glimpse_capture::{capture, CaptureOptions};
use glimpse_overlay::{paint, render, Canvas, DisplaySize, OverlayStyle};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Camera, analyzer and overlay wired together for one view.
pub struct Annotator<C: CameraBackend, A: AnalysisBackend> {
    manager: StreamManager<C>,
    session: Mutex<Option<Arc<CameraSession>>>,
    coordinator: AnalysisCoordinator<A>,
    capture: CaptureOptions,
    style: OverlayStyle,
    ready_timeout: Duration,
    display: Arc<watch::Sender<DisplaySize>>,
    last_error: watch::Sender<Option<String>>,
}

impl Annotator<GstBackend, HttpAnalyzer> {
    /// GStreamer camera plus the HTTP analysis service.
    pub fn from_config(config: &GlimpseConfig) -> Result<Self> {
        let analyzer = HttpAnalyzer::new(&config.analyzer)?;
        Ok(Self::new(GstBackend, analyzer, config))
    }
}

impl<C: CameraBackend, A: AnalysisBackend> Annotator<C, A> {
    pub fn new(camera: C, analyzer: A, config: &GlimpseConfig) -> Self {
        let (display, _) = watch::channel(DisplaySize::default());
        let (last_error, _) = watch::channel(None);
        Self {
            manager: StreamManager::new(camera, config.camera.clone()),
            session: Mutex::new(None),
            coordinator: AnalysisCoordinator::new(analyzer),
            capture: config.capture.clone(),
            style: config.overlay.clone(),
            ready_timeout: config.ready_timeout(),
            display: Arc::new(display),
            last_error,
        }
    }

    /// Acquire the camera. A previous session, if any, is released first.
    pub async fn acquire(&self) -> Result<()> {
        self.release();
        let session = self.manager.acquire().await?;
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(session));
        Ok(())
    }

    /// Stop the camera. Safe to call when nothing is acquired.
    pub fn release(&self) {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(session) = session {
            session.release();
        }
    }

    pub fn session(&self) -> Option<Arc<CameraSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn stream_state(&self) -> StreamState {
        self.manager.state()
    }

    pub fn stream_states(&self) -> watch::Receiver<StreamState> {
        self.manager.subscribe()
    }

    /// Snapshot the current frame and run it through the analysis service.
    ///
    /// Service and transport failures come back as a result carrying an
    /// error message; only a missing or silent camera is an `Err`.
    pub async fn capture_and_analyze(&self) -> Result<Arc<AnalysisResult>> {
        let session = self.session().ok_or(PipelineError::NotAcquired)?;
        session
            .surface()
            .wait_ready(self.ready_timeout)
            .await
            .map_err(|e| match e {
                CameraError::FrameTimeout(t) => PipelineError::CameraNotReady(t),
                other => PipelineError::Camera(other),
            })?;

        let frame = capture(&session, &self.capture)?;
        drop(session);

        let completion = self.coordinator.analyze(frame).await;
        if completion.applied {
            match completion.result.error_message() {
                Some(cause) => {
                    warn!("analysis failed: {cause}");
                    self.last_error.send_replace(Some(cause.to_string()));
                }
                None => {
                    self.last_error.send_replace(None);
                }
            }
        }
        Ok(completion.result)
    }

    /// Latest applied result, failures included.
    pub fn results(&self) -> watch::Receiver<Option<Arc<AnalysisResult>>> {
        self.coordinator.results()
    }

    pub fn busy(&self) -> watch::Receiver<bool> {
        self.coordinator.busy()
    }

    /// Cause of the latest applied failure; cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn errors(&self) -> watch::Receiver<Option<String>> {
        self.last_error.subscribe()
    }

    /// Resize signal for the overlay: publish the video surface's displayed size.
    pub fn display_sizes(&self) -> Arc<watch::Sender<DisplaySize>> {
        Arc::clone(&self.display)
    }

    /// Publish a new displayed size; no-op if it did not change.
    pub fn set_display_size(&self, size: DisplaySize) {
        self.display.send_if_modified(|current| {
            if *current == size {
                return false;
            }
            *current = size;
            true
        });
    }

    /// Keep `canvas` in sync with the displayed size and the latest result.
    ///
    /// Repaints whenever either changes and returns once the camera is
    /// released or denied, leaving the canvas cleared.
    pub async fn run_overlay<K: Canvas + Send + ?Sized>(&self, canvas: &mut K) {
        let mut results = self.coordinator.results();
        let mut sizes = self.display.subscribe();
        let mut states = self.manager.subscribe();
        let mut shown: Option<Arc<AnalysisResult>> = None;
        let mut size = DisplaySize::default();

        loop {
            let state = *states.borrow_and_update();
            if matches!(state, StreamState::Released | StreamState::Denied) {
                break;
            }
            size = *sizes.borrow_and_update();
            let latest = results.borrow_and_update().clone();
            if let Some(latest) = latest {
                shown = Some(displayed(shown.take(), latest));
            }
            if state == StreamState::Granted {
                debug!("overlay repaint at {}x{}", size.width, size.height);
                paint(canvas, &render(size, shown.as_deref(), &self.style));
            }

            let alive = tokio::select! {
                r = results.changed() => r.is_ok(),
                r = sizes.changed() => r.is_ok(),
                r = states.changed() => r.is_ok(),
            };
            if !alive {
                break;
            }
        }

        paint(canvas, &render(size, None, &self.style));
        info!("overlay stopped");
    }
}

impl<C: CameraBackend, A: AnalysisBackend> Drop for Annotator<C, A> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A failure never replaces a displayed success; anything else does.
fn displayed(shown: Option<Arc<AnalysisResult>>, latest: Arc<AnalysisResult>) -> Arc<AnalysisResult> {
    match shown {
        Some(prev) if latest.is_failure() && !prev.is_failure() => prev,
        _ => latest,
    }
}
