//! Realtime container writers.
//!
//! A [`SampleWriter`] accepts raw samples and encodes them into one movie
//! file. The production writer is a GStreamer pipeline fed through `appsrc`:
//!
//! ```text
//! appsrc video_src ─► x264enc (zerolatency) ─► h264parse ─┐
//!                                                           ├─► qtmux ─► filesink
//! appsrc audio_src ─► avenc_aac ────────────► aacparse ───┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dualcap_common::clock::SessionOrigin;
use dualcap_common::error::CaptureError;
use dualcap_session_model::SampleKind;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use parking_lot::Mutex;

use crate::device::NegotiatedFormat;
use crate::pipeline::{
    drain_eos, escape_path, launch_pipeline, pending_error, start_pipeline, EOS_DRAIN_TIMEOUT,
};
use crate::sample::Sample;

/// An encode-and-write target for one recording.
pub trait SampleWriter: Send + Sync {
    /// Output file this writer produces.
    fn path(&self) -> &Path;

    /// Open the writer's session at `origin`. Appended samples are
    /// timestamped relative to it.
    ///
    /// Called exactly once, before the first append.
    fn start_session(&self, origin: &SessionOrigin) -> Result<(), CaptureError>;

    /// Whether the input for `kind` can take a sample right now.
    fn is_ready(&self, kind: SampleKind) -> bool;

    fn append(&self, sample: Sample) -> Result<(), CaptureError>;

    /// Flush pending samples and close the container. Blocks.
    fn finish(&self) -> Result<(), CaptureError>;
}

/// Opens writers for new capture sessions.
pub trait WriterFactory: Send + Sync {
    fn open(
        &self,
        path: &Path,
        format: &NegotiatedFormat,
        bitrate_bps: u64,
    ) -> Result<Arc<dyn SampleWriter>, CaptureError>;
}

/// Bytes the video input may hold before it reports not ready (~0.5 s at 30 fps).
const VIDEO_QUEUE_FRAMES: u64 = 15;
/// Bytes the audio input may hold before it reports not ready (~1 s).
const AUDIO_QUEUE_SECS: u64 = 1;
const AUDIO_BITRATE_BPS: u32 = 192_000;

/// Builds [`GstSampleWriter`]s.
#[derive(Debug, Clone, Default)]
pub struct GstWriterFactory;

impl WriterFactory for GstWriterFactory {
    fn open(
        &self,
        path: &Path,
        format: &NegotiatedFormat,
        bitrate_bps: u64,
    ) -> Result<Arc<dyn SampleWriter>, CaptureError> {
        Ok(Arc::new(GstSampleWriter::open(path, format, bitrate_bps)?))
    }
}

/// H.264/AAC `.mov` writer fed through `appsrc`.
pub struct GstSampleWriter {
    path: PathBuf,
    pipeline: gst::Pipeline,
    video_src: gst_app::AppSrc,
    audio_src: Option<gst_app::AppSrc>,
    state: Mutex<WriterState>,
}

#[derive(Debug, Default)]
struct WriterState {
    origin: Option<SessionOrigin>,
    appended: u64,
    finished: bool,
}

impl GstSampleWriter {
    pub fn open(
        path: &Path,
        format: &NegotiatedFormat,
        bitrate_bps: u64,
    ) -> Result<Self, CaptureError> {
        let launch = writer_launch(path, format, bitrate_bps);
        tracing::debug!(path = %path.display(), %launch, "Opening writer pipeline");

        let pipeline = launch_pipeline(&launch).map_err(|e| CaptureError::writer_open(path, e))?;
        let video_src = app_src(&pipeline, "video_src").map_err(|e| CaptureError::writer_open(path, e))?;
        let audio_src = if format.audio.is_some() {
            Some(app_src(&pipeline, "audio_src").map_err(|e| CaptureError::writer_open(path, e))?)
        } else {
            None
        };

        video_src.set_max_bytes(VIDEO_QUEUE_FRAMES * format.frame_bytes() as u64);
        if let (Some(src), Some(audio)) = (&audio_src, format.audio) {
            src.set_max_bytes(AUDIO_QUEUE_SECS * audio.byte_rate());
        }

        start_pipeline("writer", &pipeline, Duration::from_secs(5))
            .map_err(|e| CaptureError::writer_open(path, e))?;
        if let Some(err) = pending_error(&pipeline) {
            pipeline.set_state(gst::State::Null).ok();
            return Err(CaptureError::writer_open(path, err));
        }

        tracing::info!(
            path = %path.display(),
            dimensions = %format.dimensions,
            fps = format.fps,
            bitrate_kbps = bitrate_bps / 1000,
            audio = format.audio.is_some(),
            "Writer opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            pipeline,
            video_src,
            audio_src,
            state: Mutex::new(WriterState::default()),
        })
    }

    fn src_for(&self, kind: SampleKind) -> Option<&gst_app::AppSrc> {
        match kind {
            SampleKind::Video => Some(&self.video_src),
            SampleKind::Audio => self.audio_src.as_ref(),
        }
    }
}

impl SampleWriter for GstSampleWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn start_session(&self, origin: &SessionOrigin) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.finished {
            return Err(CaptureError::writer_finalize(
                &self.path,
                "session started after finish",
            ));
        }
        state.origin = Some(*origin);
        Ok(())
    }

    fn is_ready(&self, kind: SampleKind) -> bool {
        match self.src_for(kind) {
            Some(src) => src.current_level_bytes() < src.max_bytes(),
            None => false,
        }
    }

    fn append(&self, sample: Sample) -> Result<(), CaptureError> {
        let pts = {
            let mut state = self.state.lock();
            let Some(origin) = state.origin else {
                return Err(CaptureError::writer_finalize(
                    &self.path,
                    "sample appended before session start",
                ));
            };
            let Some(pts) = origin.session_time_ns(sample.pts_ns) else {
                return Err(CaptureError::writer_finalize(
                    &self.path,
                    "sample precedes session origin",
                ));
            };
            state.appended += 1;
            pts
        };

        let Some(src) = self.src_for(sample.kind) else {
            return Ok(());
        };

        let duration = sample.duration_ns;
        let mut buffer = gst::Buffer::from_mut_slice(sample.data);
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(pts));
            buffer.set_duration(gst::ClockTime::from_nseconds(duration));
        }

        src.push_buffer(buffer).map_err(|e| {
            CaptureError::writer_finalize(&self.path, format!("Failed to push buffer: {e:?}"))
        })?;
        Ok(())
    }

    fn finish(&self) -> Result<(), CaptureError> {
        let appended = {
            let mut state = self.state.lock();
            if state.finished {
                return Ok(());
            }
            state.finished = true;
            state.appended
        };

        self.video_src.end_of_stream().ok();
        if let Some(src) = &self.audio_src {
            src.end_of_stream().ok();
        }

        let drained = drain_eos("writer", &self.pipeline, EOS_DRAIN_TIMEOUT);
        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            CaptureError::writer_finalize(&self.path, format!("Failed to stop writer: {e:?}"))
        })?;

        match drained {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), samples = appended, "Writer finalized");
                Ok(())
            }
            Err(e) if appended == 0 => {
                tracing::warn!(path = %self.path.display(), error = %e, "Empty writer closed without samples");
                Ok(())
            }
            Err(e) => Err(CaptureError::writer_finalize(&self.path, e)),
        }
    }
}

fn app_src(pipeline: &gst::Pipeline, name: &str) -> Result<gst_app::AppSrc, String> {
    pipeline
        .by_name(name)
        .ok_or_else(|| format!("Writer pipeline has no {name}"))?
        .downcast::<gst_app::AppSrc>()
        .map_err(|_| format!("{name} is not an appsrc"))
}

/// Launch string for a writer pipeline.
pub fn writer_launch(path: &Path, format: &NegotiatedFormat, bitrate_bps: u64) -> String {
    let location = escape_path(path);
    let width = format.dimensions.width;
    let height = format.dimensions.height;
    let fps = format.fps.max(1);
    // Keyframe every 2 s.
    let keyint = fps.saturating_mul(2).max(2);
    let kbps = (bitrate_bps / 1000).max(1);

    let mut launch = format!(
        "appsrc name=video_src is-live=true format=time block=false \
         caps=\"video/x-raw,format=I420,width={width},height={height},framerate={fps}/1\" \
         ! queue max-size-buffers=8 ! videoconvert \
         ! x264enc tune=zerolatency speed-preset=veryfast bitrate={kbps} key-int-max={keyint} \
         ! video/x-h264,profile=high ! h264parse ! queue ! mux. "
    );
    if let Some(audio) = format.audio {
        launch.push_str(&format!(
            "appsrc name=audio_src is-live=true format=time block=false \
             caps=\"audio/x-raw,format=S16LE,layout=interleaved,rate={},channels={}\" \
             ! queue ! audioconvert ! audioresample ! avenc_aac bitrate={AUDIO_BITRATE_BPS} \
             ! aacparse ! queue ! mux. ",
            audio.sample_rate, audio.channels
        ));
    }
    launch.push_str(&format!("qtmux name=mux ! filesink location=\"{location}\""));
    launch
}
