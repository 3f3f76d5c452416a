// glimpse-camera/src/surface.rs
use crate::{CameraError, Result, VideoFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The single surface a live stream renders into.
///
/// Holds only the most recent frame. Once closed it never shows a frame
/// again, so nothing downstream can read pixels from a torn-down stream.
#[derive(Debug)]
pub struct VideoSurface {
    frame: watch::Sender<Option<Arc<VideoFrame>>>,
    closed: AtomicBool,
}

impl Default for VideoSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSurface {
    pub fn new() -> Self {
        let (frame, _) = watch::channel(None);
        Self { frame, closed: AtomicBool::new(false) }
    }

    /// Replace the displayed frame. Returns `false` once the surface is closed.
    pub fn present(&self, frame: VideoFrame) -> bool {
        // the watch write lock makes close/present mutually exclusive
        self.frame.send_if_modified(|slot| {
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            *slot = Some(Arc::new(frame));
            true
        })
    }

    /// Drop the current frame and refuse any further ones.
    pub fn close(&self) {
        self.frame.send_modify(|slot| {
            self.closed.store(true, Ordering::Release);
            *slot = None;
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.frame.borrow().clone()
    }

    /// Intrinsic dimensions of the current frame, if it has any pixels.
    pub fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.frame.borrow().as_ref().and_then(|f| f.intrinsic_size())
    }

    /// Wait until the surface shows a frame with non-zero dimensions.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.frame.subscribe();
        let ready = rx.wait_for(|slot| {
            self.is_closed() || slot.as_ref().is_some_and(|f| f.intrinsic_size().is_some())
        });
        // release the watch read guard before `rx` goes out of scope
        let outcome = tokio::time::timeout(timeout, ready).await.map(|r| r.is_ok());
        match outcome {
            Ok(true) if !self.is_closed() => Ok(()),
            Ok(_) => Err(CameraError::Stopped),
            Err(_) => Err(CameraError::FrameTimeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> VideoFrame {
        VideoFrame {
            data: vec![0; (width * height * 3 / 2) as usize],
            width,
            height,
            stride: width,
            pts: Duration::ZERO,
        }
    }

    #[test]
    fn closed_surface_rejects_frames() {
        let surface = VideoSurface::new();
        assert!(surface.present(frame(4, 2)));
        assert_eq!(surface.intrinsic_size(), Some((4, 2)));

        surface.close();
        assert!(surface.latest_frame().is_none());
        assert!(!surface.present(frame(4, 2)));
        assert!(surface.latest_frame().is_none());
    }

    #[test]
    fn empty_frame_has_no_intrinsic_size() {
        let surface = VideoSurface::new();
        surface.present(frame(0, 0));
        assert!(surface.latest_frame().is_some());
        assert_eq!(surface.intrinsic_size(), None);
    }

    #[tokio::test]
    async fn wait_ready_times_out_without_frames() {
        let surface = VideoSurface::new();
        let err = surface.wait_ready(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, CameraError::FrameTimeout(_)));
    }

    #[tokio::test]
    async fn wait_ready_sees_a_later_frame() {
        let surface = Arc::new(VideoSurface::new());
        let producer = Arc::clone(&surface);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.present(frame(8, 8));
        });
        surface.wait_ready(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn close_wakes_a_pending_wait() {
        let surface = Arc::new(VideoSurface::new());
        let closer = Arc::clone(&surface);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close();
        });
        let err = surface.wait_ready(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, CameraError::Stopped));
    }

    #[tokio::test]
    async fn wait_ready_fails_once_closed() {
        let surface = VideoSurface::new();
        surface.close();
        let err = surface.wait_ready(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CameraError::Stopped));
    }
}
