// glimpse-camera/src/gst_backend.rs
use crate::{CameraBackend, CameraConfig, CameraError, CameraTrack, Result, VideoFrame};
use gst::prelude::*;
use log::{debug, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DEVICE: &str = "/dev/video0";
// how long Playing may take before the device counts as unusable
const START_TIMEOUT_SECS: u64 = 5;

/// GStreamer backend: `<src> ! videoconvert ! NV12 ! appsink`.
#[derive(Debug, Default, Clone)]
pub struct GstBackend;

impl CameraBackend for GstBackend {
    fn open(&self, config: &CameraConfig) -> Result<Box<dyn CameraTrack>> {
        gst::init().map_err(CameraError::GstInit)?;

        let src = match &config.device {
            None if gst::ElementFactory::find("libcamerasrc").is_some() => {
                // Pi (libcamera) stack
                "libcamerasrc".to_string()
            }
            device => {
                let device = device.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE));
                check_device(&device)?;
                format!("v4l2src device={}", device.display())
            }
        };

        let pipe_str = format!(
            "{src} ! videoconvert ! video/x-raw,format=NV12,width={w},height={h},framerate={f}/1 \
            ! queue leaky=2 max-size-buffers=2 ! appsink name=sink sync=false max-buffers=1 drop=true",
            src = src, w = config.width, h = config.height, f = config.fps
        );
        debug!("camera pipeline: {pipe_str}");

        let pipeline = gst::parse::launch(&pipe_str)
            .map_err(CameraError::ParsePipeline)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::NotPipeline)?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or(CameraError::AppSinkNotFound)?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CameraError::AppSinkDowncastFailed)?;

        let track = GstTrack { pipeline, appsink };
        track
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(CameraError::StateChange)?;

        // Live sources go Playing asynchronously; a busy or vanished device
        // only shows up here.
        let (res, _, _) = track
            .pipeline
            .state(gst::ClockTime::from_seconds(START_TIMEOUT_SECS));
        if let Err(e) = res {
            return Err(CameraError::DeviceUnavailable(format!(
                "pipeline failed to start: {e}"
            )));
        }

        info!("camera started: {src} {}x{}@{}", config.width, config.height, config.fps);
        Ok(Box::new(track))
    }
}

/// Maps the device node's open error onto the permission/availability split.
fn check_device(path: &Path) -> Result<()> {
    match std::fs::OpenOptions::new().read(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(CameraError::PermissionDenied(
            format!("{}: {e}", path.display()),
        )),
        Err(e) => Err(CameraError::DeviceUnavailable(format!("{}: {e}", path.display()))),
    }
}

/// Pipeline handle – owns the pipeline and *appsink*.
struct GstTrack {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

impl GstTrack {
    /// Convert a `gst::Sample` into our [`VideoFrame`] wrapper.
    fn sample_to_frame(sample: gst::Sample) -> Result<VideoFrame> {
        let buffer = sample.buffer().ok_or(CameraError::MissingBuffer)?;
        let caps   = sample.caps().ok_or(CameraError::MissingCaps)?;
        let info   = gst_video::VideoInfo::from_caps(caps).map_err(|e| CameraError::VideoInfo(e.to_string()))?;
        let (width, height) = (info.width(), info.height());

        // a VideoMeta, when present, overrides the layout the caps imply
        let (strides, offsets) = match buffer.meta::<gst_video::VideoMeta>() {
            Some(meta) if meta.n_planes() >= 2 => (
                [meta.stride()[0], meta.stride()[1]],
                [meta.offset()[0], meta.offset()[1]],
            ),
            _ => ([info.stride()[0], info.stride()[1]], [info.offset()[0], info.offset()[1]]),
        };
        let planes = Nv12Planes {
            width: width as usize,
            height: height as usize,
            strides: [strides[0].max(0) as usize, strides[1].max(0) as usize],
            offsets,
        };

        let pts = buffer
            .pts()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or(Duration::ZERO);

        let map = buffer.map_readable().map_err(|e| CameraError::BufferMap(e.to_string()))?;
        let data = planes.pack(map.as_slice())?;   // one copy, then unmap
        drop(map);

        Ok(VideoFrame { data, width, height, stride: planes.strides[0] as u32, pts })
    }
}

/// Where the two NV12 planes sit inside a mapped buffer.
#[derive(Debug, Clone, Copy)]
struct Nv12Planes {
    width: usize,
    height: usize,
    strides: [usize; 2],
    offsets: [usize; 2],
}

impl Nv12Planes {
    /// Copy both planes into the layout [`VideoFrame`] carries: Y rows at
    /// `strides[0]`, immediately followed by the UV rows at the same stride.
    fn pack(&self, data: &[u8]) -> Result<Vec<u8>> {
        let stride = self.strides[0];
        if stride < self.width {
            return Err(CameraError::ShortBuffer(format!(
                "luma stride {stride} is narrower than {} pixels",
                self.width
            )));
        }
        let uv_rows = self.height.div_ceil(2);
        let y_len = stride * self.height;
        let len = y_len + stride * uv_rows;

        if self.offsets == [0, y_len] && self.strides[1] == stride && data.len() >= len {
            return Ok(data[..len].to_vec());
        }

        let mut out = vec![0u8; len];
        let uv_bytes = (self.width.div_ceil(2) * 2).min(stride);
        let planes = [
            (self.offsets[0], self.strides[0], self.height, self.width, 0),
            (self.offsets[1], self.strides[1], uv_rows, uv_bytes, y_len),
        ];
        for (offset, src_stride, rows, row_bytes, dst) in planes {
            for row in 0..rows {
                let start = offset + row * src_stride;
                let src = data.get(start..start + row_bytes).ok_or_else(|| {
                    CameraError::ShortBuffer(format!(
                        "{} bytes, row {row} needs {}",
                        data.len(),
                        start + row_bytes
                    ))
                })?;
                let at = dst + row * stride;
                out[at..at + row_bytes].copy_from_slice(src);
            }
        }
        Ok(out)
    }
}

impl CameraTrack for GstTrack {
    fn next_frame(&self) -> Result<VideoFrame> {
        let sample = self
            .appsink
            .pull_sample()
            .map_err(CameraError::PullSample)?;

        Self::sample_to_frame(sample)
    }

    fn stop(&self) {
        // Null flushes the appsink, unblocking a pending pull_sample.
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

impl Drop for GstTrack {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
