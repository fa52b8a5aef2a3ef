//! GStreamer-backed capture devices.
//!
//! Each device runs one live pipeline per session. Video (and microphone
//! audio, when requested) terminate in `appsink` elements whose callbacks
//! run on GStreamer's streaming threads, one per branch, and hand samples to
//! the [`SampleOutlet`]. Timestamps are pipeline running time plus base
//! time, i.e. the pipeline clock, so video and audio share one media clock.

use std::time::Duration;

use async_trait::async_trait;
use dualcap_common::error::CaptureError;
use dualcap_session_model::{CapturePreset, Dimensions, SampleKind, SourceKind};
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use crate::device::{AudioFormat, CaptureDevice, DeviceFormat, NegotiatedFormat, SampleOutlet};
use crate::pipeline::{element_available, init_gstreamer, launch_pipeline, pending_error, start_pipeline};
use crate::sample::Sample;

const PROBE_STATE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_FRAME_TIMEOUT_SECS: u64 = 3;
const STREAM_STATE_TIMEOUT: Duration = Duration::from_secs(10);

/// A platform screen or camera source.
pub struct GstCaptureDevice {
    kind: SourceKind,
    /// Launch fragment producing the raw source, resolved at acquire.
    source: Option<String>,
    native_screen: Option<Dimensions>,
    pipeline: Option<gst::Pipeline>,
}

impl GstCaptureDevice {
    pub fn screen() -> Self {
        Self::new(SourceKind::Screen)
    }

    pub fn camera() -> Self {
        Self::new(SourceKind::Camera)
    }

    fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            source: None,
            native_screen: None,
            pipeline: None,
        }
    }

    fn source(&self) -> Result<&str, CaptureError> {
        self.source.as_deref().ok_or_else(|| {
            CaptureError::device_unavailable(format!("{} device was not acquired", self.kind))
        })
    }

    /// Source fragment plus caps/decoder restricting it to `preset`.
    fn constrained_source(&self, preset: CapturePreset) -> Result<String, CaptureError> {
        let source = self.source()?;
        match (self.kind, preset.dimensions()) {
            (SourceKind::Camera, Some(dims)) => Ok(format!(
                "{source} ! capsfilter caps=\"video/x-raw,width={w},height={h};image/jpeg,width={w},height={h}\" ! decodebin",
                w = dims.width,
                h = dims.height
            )),
            (SourceKind::Camera, None) => Ok(format!("{source} ! decodebin")),
            (SourceKind::Screen, _) => Ok(source.to_string()),
        }
    }
}

#[async_trait]
impl CaptureDevice for GstCaptureDevice {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> String {
        match &self.source {
            Some(source) => format!("{} ({})", self.kind, source),
            None => self.kind.to_string(),
        }
    }

    async fn acquire(&mut self) -> Result<(), CaptureError> {
        init_gstreamer().map_err(CaptureError::device_unavailable)?;

        let source = match self.kind {
            SourceKind::Screen => screen_source_fragment()?,
            SourceKind::Camera => camera_source_fragment()?,
        };
        let factory = source.split_whitespace().next().unwrap_or_default();
        if !element_available(factory) {
            return Err(CaptureError::device_unavailable(format!(
                "GStreamer element '{factory}' is not installed"
            )));
        }

        tracing::info!(kind = %self.kind, %source, "Capture device acquired");
        self.source = Some(source);
        Ok(())
    }

    async fn configure(&mut self, preset: CapturePreset) -> Result<DeviceFormat, CaptureError> {
        if self.kind == SourceKind::Screen {
            // Screens deliver their native size for every preset; the
            // stream is scaled to the output size downstream.
            if let Some(native) = self.native_screen {
                return Ok(DeviceFormat { native });
            }
        }

        let source = self.constrained_source(preset)?;
        let kind = self.kind;
        let probed = tokio::task::spawn_blocking(move || probe_first_frame(&source))
            .await
            .map_err(|e| CaptureError::device_unavailable(format!("Probe task failed: {e}")))?;

        match probed {
            Ok(native) => {
                tracing::debug!(%kind, %preset, %native, "Capture preset probe succeeded");
                if kind == SourceKind::Screen {
                    self.native_screen = Some(native);
                }
                Ok(DeviceFormat { native })
            }
            Err(e) if kind == SourceKind::Screen => Err(CaptureError::device_unavailable(e)),
            Err(e) => Err(CaptureError::unsupported(preset, e)),
        }
    }

    async fn start_streaming(
        &mut self,
        format: &NegotiatedFormat,
        outlet: SampleOutlet,
    ) -> Result<(), CaptureError> {
        let source = self.constrained_source(format.preset)?;
        let audio = format.audio.filter(|_| outlet.wants_audio());
        let launch = stream_launch(&source, format, audio);
        tracing::debug!(kind = %self.kind, %launch, "Starting capture pipeline");

        let pipeline = launch_pipeline(&launch).map_err(CaptureError::device_unavailable)?;

        attach_sink(
            &pipeline,
            "video_sink",
            SampleKind::Video,
            outlet.clone(),
            DurationHint::Fixed(format.frame_duration_ns()),
        )
        .map_err(CaptureError::device_unavailable)?;
        if let Some(audio) = audio {
            attach_sink(
                &pipeline,
                "audio_sink",
                SampleKind::Audio,
                outlet,
                DurationHint::ByteRate(audio.byte_rate()),
            )
            .map_err(CaptureError::device_unavailable)?;
        }

        start_pipeline(&self.kind.to_string(), &pipeline, STREAM_STATE_TIMEOUT)
            .map_err(CaptureError::device_unavailable)?;
        if let Some(err) = pending_error(&pipeline) {
            pipeline.set_state(gst::State::Null).ok();
            return Err(CaptureError::device_unavailable(err));
        }

        tracing::info!(
            kind = %self.kind,
            dimensions = %format.dimensions,
            fps = format.fps,
            audio = audio.is_some(),
            "Capture streaming"
        );
        self.pipeline = Some(pipeline);
        Ok(())
    }

    async fn stop_streaming(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                tracing::warn!(kind = %self.kind, error = ?e, "Failed to stop capture pipeline");
            }
            tracing::info!(kind = %self.kind, "Capture stopped");
        }
    }
}

#[derive(Clone, Copy)]
enum DurationHint {
    Fixed(u64),
    ByteRate(u64),
}

fn attach_sink(
    pipeline: &gst::Pipeline,
    name: &str,
    kind: SampleKind,
    outlet: SampleOutlet,
    hint: DurationHint,
) -> Result<(), String> {
    let appsink = pipeline
        .by_name(name)
        .ok_or_else(|| format!("Capture pipeline has no {name}"))?
        .downcast::<gst_app::AppSink>()
        .map_err(|_| format!("{name} is not an appsink"))?;

    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let Some(buffer) = sample.buffer() else {
                    return Ok(gst::FlowSuccess::Ok);
                };
                let Ok(map) = buffer.map_readable() else {
                    return Ok(gst::FlowSuccess::Ok);
                };

                let base_ns = sink.base_time().map(|t| t.nseconds()).unwrap_or(0);
                let pts_ns = base_ns + buffer.pts().map(|t| t.nseconds()).unwrap_or(0);
                let duration_ns = buffer.duration().map(|t| t.nseconds()).unwrap_or(match hint {
                    DurationHint::Fixed(ns) => ns,
                    DurationHint::ByteRate(rate) => {
                        map.as_slice().len() as u64 * 1_000_000_000 / rate.max(1)
                    }
                });

                outlet.deliver(Sample {
                    kind,
                    pts_ns,
                    duration_ns,
                    data: map.as_slice().to_vec(),
                });
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
    Ok(())
}

/// Launch string for a streaming capture session.
fn stream_launch(source: &str, format: &NegotiatedFormat, audio: Option<AudioFormat>) -> String {
    let w = format.dimensions.width;
    let h = format.dimensions.height;
    let fps = format.fps.max(1);
    // leaky queue: when the consumer is slow, frames are dropped at the
    // source instead of stalling the capture element.
    let mut launch = format!(
        "{source} ! queue max-size-buffers=200 leaky=downstream ! videoconvert ! videoscale ! videorate \
         ! video/x-raw,format=I420,width={w},height={h},framerate={fps}/1 \
         ! appsink name=video_sink sync=false max-buffers=4 drop=true"
    );
    if let Some(audio) = audio {
        launch.push_str(&format!(
            " autoaudiosrc ! queue leaky=downstream ! audioconvert ! audioresample \
             ! audio/x-raw,format=S16LE,layout=interleaved,rate={},channels={} \
             ! appsink name=audio_sink sync=false max-buffers=32 drop=true",
            audio.sample_rate, audio.channels
        ));
    }
    launch
}

/// Open the source, wait for PLAYING and one frame, and report its size.
fn probe_first_frame(source: &str) -> Result<Dimensions, String> {
    let launch = format!(
        "{source} ! videoconvert ! appsink name=probe sync=false max-buffers=1 drop=true"
    );
    let pipeline = launch_pipeline(&launch)?;

    let result = (|| {
        let sink = pipeline
            .by_name("probe")
            .ok_or_else(|| "Probe pipeline has no sink".to_string())?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| "probe is not an appsink".to_string())?;

        start_pipeline("probe", &pipeline, PROBE_STATE_TIMEOUT)?;
        let sample = sink
            .try_pull_sample(gst::ClockTime::from_seconds(PROBE_FRAME_TIMEOUT_SECS))
            .ok_or_else(|| {
                pending_error(&pipeline).unwrap_or_else(|| "no frame within probe timeout".to_string())
            })?;
        sample
            .caps()
            .and_then(dimensions_from_caps)
            .ok_or_else(|| "probe frame has no dimensions".to_string())
    })();

    pipeline.set_state(gst::State::Null).ok();
    result
}

fn dimensions_from_caps(caps: &gst::CapsRef) -> Option<Dimensions> {
    let s = caps.structure(0)?;
    let width = s.get::<i32>("width").ok()?;
    let height = s.get::<i32>("height").ok()?;
    Some(Dimensions::new(
        u32::try_from(width).ok()?,
        u32::try_from(height).ok()?,
    ))
}

#[cfg(target_os = "linux")]
fn screen_source_fragment() -> Result<String, CaptureError> {
    if std::env::var("DISPLAY").is_err() {
        return Err(CaptureError::device_unavailable(
            "Screen capture needs an X11 display (DISPLAY is unset)",
        ));
    }
    // `use-damage=false` ensures full frame delivery rather than damage
    // rectangles that can miss regions.
    Ok("ximagesrc use-damage=false show-pointer=true".to_string())
}

#[cfg(target_os = "macos")]
fn screen_source_fragment() -> Result<String, CaptureError> {
    Ok("avfvideosrc capture-screen=true capture-screen-cursor=true".to_string())
}

#[cfg(target_os = "windows")]
fn screen_source_fragment() -> Result<String, CaptureError> {
    Ok("d3d11screencapturesrc show-cursor=true".to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn screen_source_fragment() -> Result<String, CaptureError> {
    Err(CaptureError::device_unavailable(
        "Screen capture is not supported on this platform",
    ))
}

#[cfg(target_os = "linux")]
fn camera_source_fragment() -> Result<String, CaptureError> {
    let device = detect_default_webcam_device().ok_or_else(|| {
        CaptureError::device_unavailable(
            "No camera found (expected /dev/video0 or another /dev/video* node)",
        )
    })?;
    if let Err(e) = std::fs::File::open(&device) {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            return Err(CaptureError::PermissionDenied {
                modality: dualcap_session_model::Modality::Camera,
            });
        }
        return Err(CaptureError::device_unavailable(format!("{device}: {e}")));
    }
    Ok(format!(
        "v4l2src device=\"{}\" do-timestamp=true",
        crate::pipeline::escape_path(std::path::Path::new(&device))
    ))
}

#[cfg(target_os = "macos")]
fn camera_source_fragment() -> Result<String, CaptureError> {
    Ok("avfvideosrc device-index=0".to_string())
}

#[cfg(target_os = "windows")]
fn camera_source_fragment() -> Result<String, CaptureError> {
    Ok("ksvideosrc device-index=0".to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn camera_source_fragment() -> Result<String, CaptureError> {
    Err(CaptureError::device_unavailable(
        "Camera capture is not supported on this platform",
    ))
}

/// Pick the most webcam-like V4L2 node.
///
/// Candidates are `/dev/video0` through `/dev/video15`, scored by their sysfs
/// name and, when `v4l2-ctl` is installed, by whether they report
/// Video Capture. Capture cards and tuners are skipped.
#[cfg(target_os = "linux")]
pub fn detect_default_webcam_device() -> Option<String> {
    let mut candidates: Vec<(String, u32)> = (0..16u32)
        .filter_map(|idx| {
            let dev_path = format!("/dev/video{idx}");
            std::path::Path::new(&dev_path)
                .exists()
                .then(|| {
                    let priority = webcam_device_priority(idx, &dev_path);
                    (dev_path, priority)
                })
        })
        .collect();

    // Stable sort keeps lower indices first among equal scores.
    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    let (best, priority) = candidates.into_iter().next()?;
    tracing::info!(device = %best, priority, "Selected camera device");
    Some(best)
}

#[cfg(target_os = "linux")]
fn webcam_device_priority(idx: u32, dev_path: &str) -> u32 {
    let device_name = std::fs::read_to_string(format!("/sys/class/video4linux/video{idx}/name"))
        .unwrap_or_default()
        .to_lowercase();
    score_webcam_name(&device_name, probe_v4l2_capture_capability(dev_path))
}

/// Score a V4L2 device name (higher is more webcam-like, 0 means skip).
#[cfg(any(test, target_os = "linux"))]
fn score_webcam_name(device_name: &str, supports_capture: Option<bool>) -> u32 {
    const WEBCAM_KEYWORDS: [&str; 9] = [
        "webcam", "camera", "cam", "facetime", "logitech", "microsoft", "razer", "elgato",
        "v4l2loopback",
    ];
    const NON_WEBCAM_KEYWORDS: [&str; 9] = [
        "tuner", "tv", "dvb", "hdmi", "capture", "encoder", "decoder", "hauppauge", "magewell",
    ];

    if NON_WEBCAM_KEYWORDS.iter().any(|kw| device_name.contains(kw)) {
        return 0;
    }
    let named = WEBCAM_KEYWORDS.iter().any(|kw| device_name.contains(kw));
    match (named, supports_capture) {
        (true, Some(true)) => 100,
        (true, _) => 80,
        (false, Some(true)) => 50,
        (false, Some(false)) => 0,
        (false, None) => 10,
    }
}

/// `Some(true)` if `v4l2-ctl` reports Video Capture, `None` without v4l2-ctl.
#[cfg(target_os = "linux")]
fn probe_v4l2_capture_capability(dev_path: &str) -> Option<bool> {
    let output = std::process::Command::new("v4l2-ctl")
        .args(["--device", dev_path, "--info"])
        .output()
        .ok()?;
    if !output.status.success() {
        return Some(false);
    }
    Some(
        String::from_utf8_lossy(&output.stdout)
            .to_lowercase()
            .contains("video capture"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(audio: bool) -> NegotiatedFormat {
        NegotiatedFormat {
            preset: CapturePreset::Hd720,
            dimensions: Dimensions::new(1280, 720),
            fps: 30,
            audio: audio.then(AudioFormat::default),
            downgraded: false,
        }
    }

    #[test]
    fn stream_launch_scales_to_output() {
        let launch = stream_launch("videotestsrc is-live=true", &format(false), None);
        assert!(launch.contains("format=I420,width=1280,height=720,framerate=30/1"));
        assert!(launch.contains("name=video_sink"));
        assert!(!launch.contains("audio_sink"));
    }

    #[test]
    fn stream_launch_adds_microphone_branch() {
        let launch = stream_launch(
            "videotestsrc is-live=true",
            &format(true),
            Some(AudioFormat::default()),
        );
        assert!(launch.contains("autoaudiosrc"));
        assert!(launch.contains("rate=48000,channels=2"));
    }

    #[test]
    fn camera_preset_constrains_caps() {
        let device = GstCaptureDevice {
            kind: SourceKind::Camera,
            source: Some("v4l2src".to_string()),
            native_screen: None,
            pipeline: None,
        };
        let fragment = device.constrained_source(CapturePreset::Hd1080).unwrap();
        assert!(fragment.contains("video/x-raw,width=1920,height=1080"));
        assert!(fragment.contains("image/jpeg,width=1920,height=1080"));
        let generic = device.constrained_source(CapturePreset::High).unwrap();
        assert_eq!(generic, "v4l2src ! decodebin");
    }

    #[test]
    fn webcam_scoring_prefers_named_capture_devices() {
        assert_eq!(score_webcam_name("hd pro webcam c920", Some(true)), 100);
        assert_eq!(score_webcam_name("integrated camera", None), 80);
        assert_eq!(score_webcam_name("hdmi capture", Some(true)), 0);
        assert_eq!(score_webcam_name("uvc device", None), 10);
    }
}
