// glimpse-camera/src/stream.rs
use crate::{CameraError, CameraTrack, Result, VideoSurface};
use log::{debug, warn};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Move frames device → surface until either side shuts down.
pub(crate) fn spawn_pump(
    track: Arc<dyn CameraTrack>,
    surface: Arc<VideoSurface>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("glimpse-frame-pump".into())
        .spawn(move || {
            let mut frames: u64 = 0;
            loop {
                match track.next_frame() {
                    Ok(f) => {
                        if !surface.present(f) {
                            break; // surface closed
                        }
                        frames += 1;
                    }
                    Err(e) => {
                        if !surface.is_closed() {
                            warn!("camera stream ended unexpectedly: {e}");
                            surface.close();
                        }
                        break;
                    }
                }
            }
            debug!("frame pump exiting after {frames} frames");
        })
        .map_err(CameraError::Spawn)
}
