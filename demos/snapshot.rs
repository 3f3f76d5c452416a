//! Glimpse snapshot demo
//!
//! One user-triggered shot through the whole pipeline:
//! 1. Acquire the camera (or read a still with `--image`)
//! 2. Wait for the first frame and capture it as JPEG
//! 3. Send it to the analysis service
//! 4. Composite the overlay at the chosen display size and save a PNG
//!
//! Usage: cargo run -p demos --bin snapshot -- --endpoint http://host:8080/analyze

use anyhow::{bail, Context, Result};
use clap::Parser;
use glimpse_analyze::{AnalysisCoordinator, AnalysisResult, HttpAnalyzer};
use glimpse_camera::{GstBackend, StreamManager};
use glimpse_capture::{capture, CapturedFrame};
use glimpse_overlay::{paint, render, DisplaySize, RasterCanvas};
use glimpse_pipeline::GlimpseConfig;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use log::info;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(about = "Capture one frame, analyze it and save the annotated result")]
struct CliArgs {
    /// JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Analysis service endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Analyze this image file instead of the camera.
    #[arg(long)]
    image: Option<PathBuf>,

    /// V4L2 device node, e.g. /dev/video0.
    #[arg(long)]
    device: Option<PathBuf>,

    /// Displayed size the overlay is laid out for, as WIDTHxHEIGHT.
    /// Defaults to the captured frame size.
    #[arg(long, value_parser = parse_size)]
    display: Option<DisplaySize>,

    /// Downscale the transport JPEG so its longer edge fits.
    #[arg(long)]
    max_edge: Option<u32>,

    #[arg(long, default_value = "snapshot.png")]
    out: PathBuf,
}

fn parse_size(s: &str) -> std::result::Result<DisplaySize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let width = w.trim().parse::<u32>().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let height = h.trim().parse::<u32>().map_err(|e| format!("bad height {h:?}: {e}"))?;
    if width == 0 || height == 0 {
        return Err(format!("display size must be non-zero, got {s:?}"));
    }
    Ok(DisplaySize::new(width, height))
}

fn load_config(args: &CliArgs) -> Result<GlimpseConfig> {
    let mut config = match &args.config {
        Some(path) => GlimpseConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => GlimpseConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config.analyzer.endpoint = endpoint.clone();
    }
    if let Some(device) = &args.device {
        config.camera.device = Some(device.clone());
    }
    if args.max_edge.is_some() {
        config.capture.max_edge = args.max_edge;
    }
    Ok(config)
}

/// Grab one frame from the camera, released again before returning.
async fn frame_from_camera(config: &GlimpseConfig) -> Result<CapturedFrame> {
    let manager = StreamManager::new(GstBackend, config.camera.clone());
    println!("📷 Requesting camera...");
    let session = manager.acquire().await.context("camera unavailable")?;
    session
        .surface()
        .wait_ready(config.ready_timeout())
        .await
        .context("camera produced no frame")?;
    if let Some((w, h)) = session.surface().intrinsic_size() {
        println!("✅ Camera live at {w}×{h}");
    }
    let frame = capture(&session, &config.capture).context("capture failed")?;
    session.release();
    Ok(frame)
}

fn frame_from_file(path: &PathBuf, config: &GlimpseConfig) -> Result<CapturedFrame> {
    let img = image::open(path).with_context(|| format!("reading {}", path.display()))?;
    println!("🖼️  Loaded {} ({}×{})", path.display(), img.width(), img.height());
    CapturedFrame::from_image(&img, &config.capture).context("encoding still")
}

fn save_annotated(
    still: &DynamicImage,
    result: &AnalysisResult,
    size: DisplaySize,
    config: &GlimpseConfig,
    out: &PathBuf,
) -> Result<()> {
    let mut base = image::imageops::resize(&still.to_rgba8(), size.width, size.height, FilterType::Triangle);
    let mut canvas = RasterCanvas::new(size);
    paint(&mut canvas, &render(size, Some(result), &config.overlay));
    canvas.composite_onto(&mut base);
    base.save(out).with_context(|| format!("writing {}", out.display()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();
    let config = load_config(&args)?;

    let frame = match &args.image {
        Some(path) => frame_from_file(path, &config)?,
        None => frame_from_camera(&config).await?,
    };
    let still = frame.decode().context("decoding captured JPEG")?;
    let size = args
        .display
        .unwrap_or_else(|| DisplaySize::new(frame.width(), frame.height()));
    if size.is_empty() {
        bail!("captured frame has no pixels");
    }

    let analyzer = HttpAnalyzer::new(&config.analyzer)?;
    println!("🔍 Analyzing {}×{} frame via {}", frame.width(), frame.height(), analyzer.endpoint());
    let coordinator = AnalysisCoordinator::new(analyzer);
    let started = Instant::now();
    let completion = coordinator.analyze(frame).await;
    info!("analysis took {:?}", started.elapsed());

    let result = completion.result;
    println!("{}", result.describe());
    if result.is_failure() {
        eprintln!("❌ Analysis failed; nothing to annotate");
        return Ok(());
    }

    save_annotated(&still, &result, size, &config, &args.out)?;
    println!("✅ Saved annotated snapshot to {} ({}×{})", args.out.display(), size.width, size.height);
    Ok(())
}
