//! One capture source: device, ingress queues, sink, and writer.
//!
//! ```text
//! device ──video──► [bounded queue] ──► drain task ─┐
//!        ──audio──► [bounded queue] ──► drain task ─┴─► MediaSink ─► SampleWriter
//! ```
//!
//! Screen and camera sources are the same type; only the device differs.

use std::path::PathBuf;
use std::sync::Arc;

use dualcap_common::clock::SessionOrigin;
use dualcap_common::error::CaptureError;
use dualcap_session_model::{ArtifactKind, QualityPreset, RecordingArtifact, SourceKind};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::device::{negotiate_format, AudioFormat, CaptureDevice, NegotiatedFormat, SampleOutlet};
use crate::sample::Sample;
use crate::sink::MediaSink;
use crate::writer::WriterFactory;

/// Video frames the ingress queue holds before dropping.
pub const VIDEO_QUEUE_CAPACITY: usize = 8;
/// Audio blocks the ingress queue holds before dropping.
pub const AUDIO_QUEUE_CAPACITY: usize = 64;

/// Per-session capture parameters.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub output_path: PathBuf,
    pub quality: QualityPreset,
    pub fps: u32,
    /// Record audio into this source's file.
    pub audio: Option<AudioFormat>,
}

pub struct CaptureSource {
    kind: SourceKind,
    device: Box<dyn CaptureDevice>,
    writers: Arc<dyn WriterFactory>,
    active: Option<ActiveCapture>,
}

struct ActiveCapture {
    sink: Arc<MediaSink>,
    format: NegotiatedFormat,
    drains: Vec<Drain>,
}

struct Drain {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CaptureSource {
    pub fn new(device: Box<dyn CaptureDevice>, writers: Arc<dyn WriterFactory>) -> Self {
        Self {
            kind: device.kind(),
            device,
            writers,
            active: None,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Format negotiated for the running session.
    pub fn format(&self) -> Option<NegotiatedFormat> {
        self.active.as_ref().map(|a| a.format)
    }

    pub fn session_origin(&self) -> Option<SessionOrigin> {
        self.active.as_ref().and_then(|a| a.sink.origin())
    }

    /// Acquire the device, negotiate a preset, open the writer, and begin
    /// streaming.
    pub async fn start(&mut self, config: SourceConfig) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::device_unavailable(format!(
                "{} source is already capturing",
                self.kind
            )));
        }

        tracing::info!(kind = %self.kind, path = %config.output_path.display(), quality = %config.quality, "Starting capture source");

        self.device.acquire().await?;
        let format =
            negotiate_format(self.device.as_mut(), config.quality, config.fps, config.audio).await?;

        let writer = self
            .writers
            .open(&config.output_path, &format, config.quality.bitrate_bps())?;
        let sink = Arc::new(MediaSink::new(writer));

        let (video_tx, video_rx) = mpsc::channel(VIDEO_QUEUE_CAPACITY);
        let mut drains = vec![spawn_drain(sink.clone(), video_rx)];
        let audio_tx = if format.audio.is_some() {
            let (tx, rx) = mpsc::channel(AUDIO_QUEUE_CAPACITY);
            drains.push(spawn_drain(sink.clone(), rx));
            Some(tx)
        } else {
            None
        };
        let outlet = SampleOutlet::new(video_tx, audio_tx, sink.clone());

        if let Err(e) = self.device.start_streaming(&format, outlet).await {
            tracing::error!(kind = %self.kind, error = %e, "Device failed to start streaming");
            shutdown_drains(drains).await;
            let kind = artifact_kind(self.kind);
            let finalize_sink = sink.clone();
            tokio::task::spawn_blocking(move || finalize_sink.finalize(kind))
                .await
                .ok();
            if let Err(rm) = tokio::fs::remove_file(sink.path()).await {
                tracing::debug!(path = %sink.path().display(), error = %rm, "No partial output to remove");
            }
            return Err(e);
        }

        self.active = Some(ActiveCapture {
            sink,
            format,
            drains,
        });
        Ok(())
    }

    /// Stop capture and finalize the file.
    ///
    /// Returns `Ok(None)` when the source was never started. Device capture
    /// stops immediately; the call then waits for queued samples to reach
    /// the writer and for the writer to close the container.
    pub async fn stop(&mut self) -> Result<Option<RecordingArtifact>, CaptureError> {
        let Some(active) = self.active.take() else {
            tracing::debug!(kind = %self.kind, "Stop on idle source; nothing to finalize");
            return Ok(None);
        };

        self.device.stop_streaming().await;
        shutdown_drains(active.drains).await;

        let kind = artifact_kind(self.kind);
        let sink = active.sink;
        let path = sink.path().to_path_buf();
        let artifact = tokio::task::spawn_blocking(move || sink.finalize(kind))
            .await
            .map_err(|e| CaptureError::writer_finalize(&path, format!("finalize task failed: {e}")))??;

        tracing::info!(
            kind = %self.kind,
            path = %artifact.path.display(),
            appended = artifact.stats.appended(),
            dropped = artifact.stats.dropped(),
            "Capture source stopped"
        );
        Ok(Some(artifact))
    }
}

fn artifact_kind(kind: SourceKind) -> ArtifactKind {
    match kind {
        SourceKind::Screen => ArtifactKind::ScreenVideo,
        SourceKind::Camera => ArtifactKind::CameraVideo,
    }
}

/// Consume one modality's queue into the sink, in arrival order.
///
/// On shutdown the queue is closed to new samples and whatever it already
/// holds is still pushed.
fn spawn_drain(sink: Arc<MediaSink>, mut rx: mpsc::Receiver<Sample>) -> Drain {
    let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                sample = rx.recv() => match sample {
                    Some(sample) => {
                        sink.push(sample);
                    }
                    None => return,
                },
            }
        }
        rx.close();
        while let Some(sample) = rx.recv().await {
            sink.push(sample);
        }
    });
    Drain { shutdown, task }
}

async fn shutdown_drains(drains: Vec<Drain>) {
    for drain in drains {
        drain.shutdown.send(()).ok();
        if let Err(e) = drain.task.await {
            tracing::warn!(error = %e, "Drain task ended abnormally");
        }
    }
}
