// glimpse-camera/src/session.rs
use crate::stream::spawn_pump;
use crate::{CameraBackend, CameraConfig, CameraError, CameraTrack, Result, VideoSurface};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of the camera owned by a [`StreamManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Uninitialized,
    Requesting,
    Granted,
    Denied,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

impl StreamState {
    pub fn permission(self) -> PermissionState {
        match self {
            StreamState::Uninitialized | StreamState::Requesting => PermissionState::Unknown,
            StreamState::Granted | StreamState::Released => PermissionState::Granted,
            StreamState::Denied => PermissionState::Denied,
        }
    }
}

/// Acquires and hands out at most one live [`CameraSession`] at a time.
pub struct StreamManager<B: CameraBackend> {
    backend: Arc<B>,
    config: CameraConfig,
    state: Arc<watch::Sender<StreamState>>,
}

impl<B: CameraBackend> StreamManager<B> {
    pub fn new(backend: B, config: CameraConfig) -> Self {
        let (state, _) = watch::channel(StreamState::Uninitialized);
        Self {
            backend: Arc::new(backend),
            config,
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Observe state transitions, e.g. to show a blocking message on `Denied`.
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Open the device and bind it to a fresh [`VideoSurface`].
    ///
    /// Never retries: after `PermissionDenied` or `DeviceUnavailable` the
    /// state stays `Denied` until the caller asks again.
    ///
    /// Dropping the returned future while the device is opening rolls the
    /// state back, and a track that opens afterwards is stopped at once.
    pub async fn acquire(&self) -> Result<CameraSession> {
        let mut previous = None;
        self.state.send_if_modified(|s| match s {
            StreamState::Requesting | StreamState::Granted => false,
            _ => {
                previous = Some(*s);
                *s = StreamState::Requesting;
                true
            }
        });
        let Some(previous) = previous else {
            return Err(CameraError::AlreadyAcquired);
        };
        let mut pending = PendingRequest { state: &self.state, previous, settled: false };
        info!("requesting camera");

        let backend = Arc::clone(&self.backend);
        let config = self.config.clone();
        let opened = tokio::task::spawn_blocking(move || backend.open(&config).map(StopOnDrop::new))
            .await
            .map_err(|e| CameraError::Join(e.to_string()))
            .and_then(|r| r);

        let track: Arc<dyn CameraTrack> = match opened {
            Ok(track) => Arc::from(track.into_inner()),
            Err(e) => {
                warn!("camera unavailable: {e}");
                pending.settle(StreamState::Denied);
                return Err(e);
            }
        };

        let surface = Arc::new(VideoSurface::new());
        if let Err(e) = spawn_pump(Arc::clone(&track), Arc::clone(&surface)) {
            track.stop();
            pending.settle(StreamState::Denied);
            return Err(e);
        }

        pending.settle(StreamState::Granted);
        info!("camera granted");
        Ok(CameraSession {
            track,
            surface,
            state: Arc::clone(&self.state),
            released: AtomicBool::new(false),
        })
    }
}

/// An in-flight `acquire`. Unless settled, dropping it restores the state
/// the request started from.
struct PendingRequest<'a> {
    state: &'a watch::Sender<StreamState>,
    previous: StreamState,
    settled: bool,
}

impl PendingRequest<'_> {
    fn settle(&mut self, outcome: StreamState) {
        self.settled = true;
        self.state.send_replace(outcome);
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let previous = self.previous;
        self.state.send_if_modified(|s| {
            if *s != StreamState::Requesting {
                return false;
            }
            *s = previous;
            true
        });
        warn!("camera request abandoned before the device opened");
    }
}

/// A freshly opened track that nobody has claimed yet; stopped if dropped.
struct StopOnDrop(Option<Box<dyn CameraTrack>>);

impl StopOnDrop {
    fn new(track: Box<dyn CameraTrack>) -> Self {
        Self(Some(track))
    }

    fn into_inner(mut self) -> Box<dyn CameraTrack> {
        match self.0.take() {
            Some(track) => track,
            None => unreachable!("track taken twice"),
        }
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        if let Some(track) = self.0.take() {
            debug!("stopping a track nobody claimed");
            track.stop();
        }
    }
}

/// Exclusive ownership of a live camera track. Dropping releases it.
pub struct CameraSession {
    track: Arc<dyn CameraTrack>,
    surface: Arc<VideoSurface>,
    state: Arc<watch::Sender<StreamState>>,
    released: AtomicBool,
}

impl CameraSession {
    pub fn surface(&self) -> &Arc<VideoSurface> {
        &self.surface
    }

    pub fn state(&self) -> StreamState {
        if self.released.load(Ordering::Acquire) {
            StreamState::Released
        } else {
            StreamState::Granted
        }
    }

    pub fn permission(&self) -> PermissionState {
        self.state().permission()
    }

    /// Stop all tracks and close the surface. Safe to call repeatedly.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.surface.close();
        self.track.stop();
        self.state.send_replace(StreamState::Released);
        info!("camera released");
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("state", &self.state())
            .field("surface", &self.surface)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoFrame;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FakeTrack {
        stopped: AtomicBool,
        stops: Arc<AtomicUsize>,
    }

    impl CameraTrack for FakeTrack {
        fn next_frame(&self) -> Result<VideoFrame> {
            std::thread::sleep(Duration::from_millis(2));
            if self.stopped.load(Ordering::Acquire) {
                return Err(CameraError::Stopped);
            }
            Ok(VideoFrame { data: vec![0; 24], width: 4, height: 4, stride: 4, pts: Duration::ZERO })
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::Release);
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    enum Outcome {
        Grant,
        Deny,
        NoDevice,
        SlowGrant(Duration),
    }

    struct FakeBackend {
        outcome: Outcome,
        stops: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        fn new(outcome: Outcome) -> Self {
            Self { outcome, stops: Arc::new(AtomicUsize::new(0)) }
        }
    }

    impl CameraBackend for FakeBackend {
        fn open(&self, _config: &CameraConfig) -> Result<Box<dyn CameraTrack>> {
            if let Outcome::SlowGrant(delay) = self.outcome {
                std::thread::sleep(delay);
            }
            match self.outcome {
                Outcome::Grant | Outcome::SlowGrant(_) => Ok(Box::new(FakeTrack {
                    stopped: AtomicBool::new(false),
                    stops: Arc::clone(&self.stops),
                })),
                Outcome::Deny => Err(CameraError::PermissionDenied("user said no".into())),
                Outcome::NoDevice => Err(CameraError::DeviceUnavailable("none".into())),
            }
        }
    }

    #[tokio::test]
    async fn grant_then_release() {
        let manager = StreamManager::new(FakeBackend::new(Outcome::Grant), CameraConfig::default());
        assert_eq!(manager.state(), StreamState::Uninitialized);
        assert_eq!(manager.state().permission(), PermissionState::Unknown);

        let session = manager.acquire().await.unwrap();
        assert_eq!(manager.state(), StreamState::Granted);
        assert_eq!(session.permission(), PermissionState::Granted);
        session.surface().wait_ready(Duration::from_secs(2)).await.unwrap();

        session.release();
        assert_eq!(manager.state(), StreamState::Released);
        assert_eq!(session.state(), StreamState::Released);
        assert!(session.surface().latest_frame().is_none());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let backend = FakeBackend::new(Outcome::Grant);
        let stops = Arc::clone(&backend.stops);
        let manager = StreamManager::new(backend, CameraConfig::default());

        let session = manager.acquire().await.unwrap();
        session.release();
        session.release();
        drop(session);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_live_session_per_manager() {
        let manager = StreamManager::new(FakeBackend::new(Outcome::Grant), CameraConfig::default());
        let first = manager.acquire().await.unwrap();
        assert!(matches!(manager.acquire().await, Err(CameraError::AlreadyAcquired)));

        drop(first);
        let second = manager.acquire().await.unwrap();
        assert_eq!(second.state(), StreamState::Granted);
    }

    #[tokio::test]
    async fn denial_is_terminal_until_next_acquire() {
        let manager = StreamManager::new(FakeBackend::new(Outcome::Deny), CameraConfig::default());
        let mut states = manager.subscribe();

        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, CameraError::PermissionDenied(_)));
        assert!(err.is_blocking());
        assert_eq!(manager.state(), StreamState::Denied);
        assert_eq!(*states.borrow_and_update(), StreamState::Denied);

        // no polling: the state sits on Denied until asked again
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!states.has_changed().unwrap());
        assert!(manager.acquire().await.is_err());
    }

    #[tokio::test]
    async fn missing_device_is_denied_state() {
        let manager = StreamManager::new(FakeBackend::new(Outcome::NoDevice), CameraConfig::default());
        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, CameraError::DeviceUnavailable(_)));
        assert_eq!(manager.state().permission(), PermissionState::Denied);
    }

    #[tokio::test]
    async fn dropped_acquire_can_be_retried() {
        let backend = FakeBackend::new(Outcome::SlowGrant(Duration::from_millis(100)));
        let stops = Arc::clone(&backend.stops);
        let manager = StreamManager::new(backend, CameraConfig::default());

        let cancelled = tokio::time::timeout(Duration::from_millis(10), manager.acquire()).await;
        assert!(cancelled.is_err());
        assert_eq!(manager.state(), StreamState::Uninitialized);

        // the device finishes opening after the caller left; nobody owns it
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        let session = manager.acquire().await.unwrap();
        assert_eq!(manager.state(), StreamState::Granted);
        session.release();
    }
}
