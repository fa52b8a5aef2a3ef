//! Time-aligned picture-in-picture merge of a screen and a camera recording.
//!
//! ```text
//! screen.mov ──probe──┐                 ┌─ -ss/-t ─► [0:v] ─ scale ─────────────┐
//!                     ├─► SyncWindow ───┤                                       ├─ overlay ─┐
//! camera.mov ──probe──┘                 └─ -ss/-t ─► [1:v] ─ fit/fill ─ mask ───┘           │
//!                                                    color ─ ring ─ fade ───────── overlay ─┴─► merged.mov
//! ```
//!
//! The sync window comes from the intrinsic time ranges of both files.
//! Wall-clock start times are only logged.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dualcap_common::clock::DriftMeasurement;
use dualcap_common::error::MergeError;
use dualcap_session_model::{
    Dimensions, OverlaySpec, QualityPreset, RecordingArtifacts, SyncWindow,
};
use parking_lot::Mutex;

use crate::export::{run_job, FfmpegBackend, ProgressCallback, RenderBackend, RenderJob};
use crate::layout::{
    fit_within, CameraFit, OverlayLayout, PixelRect, BORDER_FADE_SECS, BORDER_FADE_START_SECS,
    BORDER_WIDTH, CORNER_RADIUS,
};
use crate::probe::{FfprobeInspector, MediaInfo, MediaInspector};

/// Frame rate of the composed output.
const OUTPUT_FPS: u32 = 30;
const BORDER_COLOR: &str = "white";

/// Encoder settings for merged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    pub quality: QualityPreset,
    pub audio_bitrate_kbps: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            quality: QualityPreset::High,
            audio_bitrate_kbps: 192,
        }
    }
}

impl From<&dualcap_common::config::ExportDefaults> for ExportSettings {
    fn from(defaults: &dualcap_common::config::ExportDefaults) -> Self {
        Self {
            quality: defaults.quality,
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
        }
    }
}

/// Inputs of one merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequest {
    pub screen: PathBuf,
    pub camera: PathBuf,
    pub output: PathBuf,
    pub overlay: OverlaySpec,
    pub screen_started_at: Option<DateTime<Utc>>,
    pub camera_started_at: Option<DateTime<Utc>>,
}

impl MergeRequest {
    pub fn new(
        screen: impl Into<PathBuf>,
        camera: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        overlay: OverlaySpec,
    ) -> Self {
        Self {
            screen: screen.into(),
            camera: camera.into(),
            output: output.into(),
            overlay,
            screen_started_at: None,
            camera_started_at: None,
        }
    }

    /// The merge for a finished recording, or `None` without a camera.
    pub fn for_session(artifacts: &RecordingArtifacts, overlay: OverlaySpec) -> Option<Self> {
        let camera = artifacts.camera.as_ref()?;
        Some(Self {
            screen: artifacts.screen.path.clone(),
            camera: camera.path.clone(),
            output: artifacts.merged_target(),
            overlay,
            screen_started_at: artifacts.screen.started_at,
            camera_started_at: camera.started_at,
        })
    }
}

/// Which input's audio the merged file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    Screen,
    Camera,
    None,
}

/// Everything decided before the encoder runs.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub window: SyncWindow,
    pub layout: OverlayLayout,
    pub audio: AudioSource,
    pub job: RenderJob,
}

/// Merges screen and camera recordings.
///
/// One merge per output path may run at a time.
pub struct Compositor {
    inspector: Arc<dyn MediaInspector>,
    backend: Arc<dyn RenderBackend>,
    settings: ExportSettings,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl Compositor {
    pub fn new(
        inspector: Arc<dyn MediaInspector>,
        backend: Arc<dyn RenderBackend>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            inspector,
            backend,
            settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// A compositor using the `ffprobe` and `ffmpeg` binaries.
    pub fn ffmpeg(settings: ExportSettings) -> Self {
        Self::new(
            Arc::new(FfprobeInspector::default()),
            Arc::new(FfmpegBackend::default()),
            settings,
        )
    }

    /// Probe both inputs and build the render job. Writes nothing.
    pub async fn plan(&self, request: &MergeRequest) -> Result<MergePlan, MergeError> {
        let (screen, camera) = tokio::join!(
            self.inspector.inspect(&request.screen),
            self.inspector.inspect(&request.camera)
        );
        let (screen, camera) = (screen?, camera?);

        let Some(window) = SyncWindow::compute(&screen.video.range, &camera.video.range) else {
            tracing::warn!(
                screen_start = screen.video.range.start_secs,
                screen_end = screen.video.range.end_secs,
                camera_start = camera.video.range.start_secs,
                camera_end = camera.video.range.end_secs,
                "Recordings do not overlap"
            );
            return Err(MergeError::NoOverlap {
                screen: request.screen.clone(),
                camera: request.camera.clone(),
            });
        };

        let canvas = fit_within(screen.video.dimensions, self.settings.quality.dimensions());
        let layout = OverlayLayout::compute(canvas, camera.video.dimensions, &request.overlay);
        let audio = pick_audio(&screen, &camera);
        let job = build_job(request, &window, &layout, audio, &self.settings);

        Ok(MergePlan {
            window,
            layout,
            audio,
            job,
        })
    }

    /// Merge into `request.output`.
    ///
    /// Source files are never modified. On failure any partial output is
    /// removed.
    pub async fn merge(
        &self,
        request: &MergeRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<PathBuf, MergeError> {
        let _guard = InFlight::claim(&self.in_flight, &request.output)?;

        log_wall_clock_skew(request);
        let plan = self.plan(request).await?;
        tracing::info!(
            screen = %request.screen.display(),
            camera = %request.camera.display(),
            output = %request.output.display(),
            window_start = plan.window.range.start_secs,
            window_end = plan.window.range.end_secs,
            duration_secs = plan.window.duration_secs(),
            screen_offset = plan.window.screen_offset_secs,
            camera_offset = plan.window.camera_offset_secs,
            canvas = %plan.layout.canvas,
            pip = ?plan.layout.pixel_rect(),
            audio = ?plan.audio,
            "Merge planned"
        );

        match run_job(self.backend.clone(), plan.job, progress).await {
            Ok(()) => {
                tracing::info!(output = %request.output.display(), "Merge finished");
                Ok(request.output.clone())
            }
            Err(e) => {
                tracing::error!(output = %request.output.display(), error = %e, "Merge failed");
                remove_partial(&request.output).await;
                Err(e.into())
            }
        }
    }
}

struct InFlight<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    output: PathBuf,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<PathBuf>>, output: &Path) -> Result<Self, MergeError> {
        if !set.lock().insert(output.to_path_buf()) {
            return Err(MergeError::export(format!(
                "a merge into {} is already running",
                output.display()
            )));
        }
        Ok(Self {
            set,
            output: output.to_path_buf(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.output);
    }
}

pub(crate) async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
    }
}

fn log_wall_clock_skew(request: &MergeRequest) {
    if let (Some(screen), Some(camera)) = (request.screen_started_at, request.camera_started_at) {
        let drift = DriftMeasurement::between(&screen, &camera);
        tracing::debug!(
            skew_ms = drift.drift_ms(),
            "Wall-clock origin skew (not used for alignment)"
        );
    }
}

/// Screen audio first, camera audio as fallback, never both.
pub fn pick_audio(screen: &MediaInfo, camera: &MediaInfo) -> AudioSource {
    if screen.has_audio() {
        AudioSource::Screen
    } else if camera.has_audio() {
        AudioSource::Camera
    } else {
        AudioSource::None
    }
}

fn secs(value: f64) -> String {
    format!("{value:.3}")
}

fn build_job(
    request: &MergeRequest,
    window: &SyncWindow,
    layout: &OverlayLayout,
    audio: AudioSource,
    settings: &ExportSettings,
) -> RenderJob {
    let duration = window.duration_secs();
    let mut args: Vec<String> = ["-y", "-nostdin", "-hide_banner", "-progress", "pipe:1", "-nostats"]
        .map(String::from)
        .to_vec();

    for (offset, input) in [
        (window.screen_offset_secs, &request.screen),
        (window.camera_offset_secs, &request.camera),
    ] {
        args.extend([
            "-ss".to_string(),
            secs(offset),
            "-t".to_string(),
            secs(duration),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
        ]);
    }

    args.extend([
        "-filter_complex".to_string(),
        filter_graph(layout, duration),
        "-map".to_string(),
        "[vout]".to_string(),
    ]);
    match audio {
        AudioSource::Screen => args.extend(["-map".to_string(), "0:a:0".to_string()]),
        AudioSource::Camera => args.extend(["-map".to_string(), "1:a:0".to_string()]),
        AudioSource::None => args.push("-an".to_string()),
    }

    args.extend(codec_args(settings, audio != AudioSource::None));
    args.extend([
        "-t".to_string(),
        secs(duration),
        request.output.to_string_lossy().into_owned(),
    ]);

    RenderJob {
        args,
        output_path: request.output.clone(),
        expected_duration_secs: duration,
        total_frames: (duration * OUTPUT_FPS as f64).ceil() as u64,
    }
}

fn codec_args(settings: &ExportSettings, with_audio: bool) -> Vec<String> {
    let mut args: Vec<String> = [
        "-c:v",
        "libx264",
        "-preset",
        "medium",
        "-profile:v",
        "high",
        "-pix_fmt",
        "yuv420p",
    ]
    .map(String::from)
    .to_vec();
    args.extend([
        "-b:v".to_string(),
        format!("{}k", settings.quality.bitrate_kbps()),
        "-r".to_string(),
        OUTPUT_FPS.to_string(),
    ]);
    if with_audio {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", settings.audio_bitrate_kbps.max(64)),
        ]);
    }
    args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    args
}

/// Alpha expression: inside a rounded rectangle of radius `r` inset by
/// `inset` from the frame edge.
fn rounded_rect_expr(r: u32, inset: u32) -> String {
    let (r, inset) = (r as f64, inset as f64);
    let dx = format!("max(abs(X-W/2)-(W/2-{inset}-{r}),0)");
    let dy = format!("max(abs(Y-H/2)-(H/2-{inset}-{r}),0)");
    format!("lte(abs(X-W/2),W/2-{inset})*lte(abs(Y-H/2),H/2-{inset})*lte(hypot({dx},{dy}),{r})")
}

/// Rounded clip mask for the camera.
pub fn mask_alpha_expr() -> String {
    format!("255*{}", rounded_rect_expr(CORNER_RADIUS, 0))
}

/// Border ring: inside the outer rounded rectangle, outside the inner one.
pub fn border_alpha_expr() -> String {
    let inner_radius = CORNER_RADIUS.saturating_sub(BORDER_WIDTH);
    format!(
        "255*{}*(1-{})",
        rounded_rect_expr(CORNER_RADIUS, 0),
        rounded_rect_expr(inner_radius, BORDER_WIDTH)
    )
}

fn camera_scale_filter(fit: CameraFit, size: Dimensions) -> String {
    let (w, h) = (size.width, size.height);
    match fit {
        CameraFit::Fit => format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease:flags=lanczos,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black"
        ),
        CameraFit::Fill => format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase:flags=lanczos,crop={w}:{h}"
        ),
    }
}

/// The ffmpeg filter graph: screen below, masked camera above, border on top.
pub fn filter_graph(layout: &OverlayLayout, duration_secs: f64) -> String {
    let PixelRect { x, y, size } = layout.pixel_rect();
    let canvas = layout.canvas;
    let copy_rgb = "r='r(X,Y)':g='g(X,Y)':b='b(X,Y)'";

    [
        format!(
            "[0:v]setpts=PTS-STARTPTS,scale={}:{}:flags=lanczos,fps={OUTPUT_FPS},format=yuv420p[base]",
            canvas.width, canvas.height
        ),
        format!(
            "[1:v]setpts=PTS-STARTPTS,fps={OUTPUT_FPS},{},format=rgba,geq={copy_rgb}:a='{}'[pip]",
            camera_scale_filter(layout.fit, size),
            mask_alpha_expr()
        ),
        format!(
            "color=c={BORDER_COLOR}:s={}x{}:r={OUTPUT_FPS}:d={},format=rgba,geq={copy_rgb}:a='{}',fade=t=in:st={}:d={}:alpha=1[border]",
            size.width,
            size.height,
            secs(duration_secs),
            border_alpha_expr(),
            secs(BORDER_FADE_START_SECS),
            secs(BORDER_FADE_SECS)
        ),
        format!("[base][pip]overlay=x={x}:y={y}:eof_action=pass[composed]"),
        format!("[composed][border]overlay=x={x}:y={y}:eof_action=pass,format=yuv420p[vout]"),
    ]
    .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualcap_session_model::{OverlayCorner, SizePolicy, TimeRange};

    use crate::probe::{AudioStreamInfo, VideoStreamInfo};

    fn info(path: &str, range: TimeRange, audio: bool) -> MediaInfo {
        MediaInfo {
            path: PathBuf::from(path),
            video: VideoStreamInfo {
                range,
                dimensions: Dimensions::new(1920, 1080),
            },
            audio: audio.then(|| AudioStreamInfo {
                range,
                codec: "aac".into(),
            }),
        }
    }

    #[test]
    fn audio_prefers_screen_then_camera() {
        let r = TimeRange::new(0.0, 1.0);
        assert_eq!(pick_audio(&info("s", r, true), &info("c", r, true)), AudioSource::Screen);
        assert_eq!(pick_audio(&info("s", r, false), &info("c", r, true)), AudioSource::Camera);
        assert_eq!(pick_audio(&info("s", r, false), &info("c", r, false)), AudioSource::None);
    }

    #[test]
    fn job_trims_both_inputs_to_the_window() {
        let request = MergeRequest::new("/s/screen.mov", "/s/cam.mov", "/s/merged.mov", OverlaySpec::default());
        let window =
            SyncWindow::compute(&TimeRange::new(0.0, 10.0), &TimeRange::new(1.0, 9.0)).unwrap();
        let layout = OverlayLayout::compute(
            Dimensions::new(1920, 1080),
            Dimensions::new(1280, 720),
            &request.overlay,
        );
        let job = build_job(&request, &window, &layout, AudioSource::Camera, &ExportSettings::default());

        let joined = job.args.join(" ");
        assert!(joined.contains("-ss 1.000 -t 8.000 -i /s/screen.mov"));
        assert!(joined.contains("-ss 0.000 -t 8.000 -i /s/cam.mov"));
        assert!(joined.contains("-map 1:a:0"));
        assert!(joined.contains("-b:v 8000k"));
        assert_eq!(job.args.last().map(String::as_str), Some("/s/merged.mov"));
        assert_eq!(job.expected_duration_secs, 8.0);
        assert_eq!(job.total_frames, 240);
    }

    #[test]
    fn silent_inputs_produce_no_audio_track() {
        let request = MergeRequest::new("a.mov", "b.mov", "c.mov", OverlaySpec::default());
        let window = SyncWindow::compute(&TimeRange::new(0.0, 2.0), &TimeRange::new(0.0, 2.0)).unwrap();
        let layout = OverlayLayout::compute(
            Dimensions::new(1280, 720),
            Dimensions::new(640, 480),
            &request.overlay,
        );
        let job = build_job(&request, &window, &layout, AudioSource::None, &ExportSettings::default());
        assert!(job.args.iter().any(|a| a == "-an"));
        assert!(!job.args.iter().any(|a| a == "-c:a"));
    }

    #[test]
    fn filter_graph_places_pip_at_corner() {
        let layout = OverlayLayout::compute(
            Dimensions::new(1920, 1080),
            Dimensions::new(1280, 720),
            &OverlaySpec {
                position: OverlayCorner::TopLeft,
                size_policy: SizePolicy::FourByThree,
                margin: 20,
            },
        );
        let graph = filter_graph(&layout, 8.0);
        assert!(graph.contains("[base][pip]overlay=x=20:y=20"));
        assert!(graph.contains("force_original_aspect_ratio=increase"));
        assert!(graph.contains("crop=480:360"));
        assert!(graph.contains("fade=t=in:st=0.100:d=0.250:alpha=1"));
        assert!(graph.ends_with("[vout]"));
    }

    #[test]
    fn auto_policy_letterboxes() {
        let layout = OverlayLayout::compute(
            Dimensions::new(1920, 1080),
            Dimensions::new(640, 480),
            &OverlaySpec::default(),
        );
        let graph = filter_graph(&layout, 1.0);
        assert!(graph.contains("force_original_aspect_ratio=decrease"));
        assert!(graph.contains("pad=480:360"));
    }

    #[test]
    fn border_ring_excludes_the_inner_rect() {
        let ring = border_alpha_expr();
        assert!(ring.contains(&format!("W/2-{BORDER_WIDTH}")));
        assert!(ring.contains("(1-"));
        assert!(mask_alpha_expr().starts_with("255*"));
    }

    #[test]
    fn session_request_needs_a_camera() {
        use dualcap_session_model::{ArtifactKind, ArtifactLayout, RecordingArtifact};
        let layout = ArtifactLayout::Session {
            dir: PathBuf::from("/rec/Recording_x"),
        };
        let mut artifacts = RecordingArtifacts {
            screen: RecordingArtifact::new(
                ArtifactKind::ScreenVideo,
                layout.path_for(ArtifactKind::ScreenVideo),
            ),
            camera: None,
            layout: layout.clone(),
        };
        assert!(MergeRequest::for_session(&artifacts, OverlaySpec::default()).is_none());

        artifacts.camera = Some(RecordingArtifact::new(
            ArtifactKind::CameraVideo,
            layout.path_for(ArtifactKind::CameraVideo),
        ));
        let request = MergeRequest::for_session(&artifacts, OverlaySpec::default()).unwrap();
        assert_eq!(request.output, PathBuf::from("/rec/Recording_x/merged_video.mov"));
    }
}
