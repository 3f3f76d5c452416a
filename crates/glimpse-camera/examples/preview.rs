// examples/preview.rs
// ------------------------------------------------------------
// Acquire the camera, wait for frames and report what arrives.
// cargo run -p glimpse-camera --example preview -- [/dev/videoN]
// ------------------------------------------------------------
use glimpse_camera::{CameraConfig, GstBackend, StreamManager};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = CameraConfig {
        device: std::env::args().nth(1).map(Into::into),
        ..Default::default()
    };
    let manager = StreamManager::new(GstBackend, config);

    let session = match manager.acquire().await {
        Ok(session) => session,
        Err(e) if e.is_blocking() => {
            eprintln!("camera unusable: {e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    session.surface().wait_ready(Duration::from_secs(5)).await?;

    let start = Instant::now();
    let mut last_pts = None;
    let mut seen = 0u32;
    while start.elapsed() < Duration::from_secs(3) {
        if let Some(frame) = session.surface().latest_frame() {
            if last_pts != Some(frame.pts) {
                last_pts = Some(frame.pts);
                seen += 1;
                println!("frame {seen}: {}x{} pts {:?}", frame.width, frame.height, frame.pts);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    println!("{:.1} fps observed", seen as f64 / start.elapsed().as_secs_f64());
    session.release();
    Ok(())
}
