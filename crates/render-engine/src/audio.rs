//! Standalone audio track export.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dualcap_common::error::ExportError;

use crate::compositor::remove_partial;
use crate::export::{run_job, FfmpegBackend, ProgressCallback, RenderBackend, RenderJob};
use crate::probe::{FfprobeInspector, MediaInspector};

/// Copies the first audio track of a recording into an AAC `.m4a`.
pub struct AudioTrackExtractor {
    inspector: Arc<dyn MediaInspector>,
    backend: Arc<dyn RenderBackend>,
    bitrate_kbps: u32,
}

impl AudioTrackExtractor {
    pub fn new(
        inspector: Arc<dyn MediaInspector>,
        backend: Arc<dyn RenderBackend>,
        bitrate_kbps: u32,
    ) -> Self {
        Self {
            inspector,
            backend,
            bitrate_kbps,
        }
    }

    pub fn ffmpeg(bitrate_kbps: u32) -> Self {
        Self::new(
            Arc::new(FfprobeInspector::default()),
            Arc::new(FfmpegBackend::default()),
            bitrate_kbps,
        )
    }

    /// Re-encode the full audio track of `source` to `target`.
    ///
    /// Returns `Ok(None)` when `source` has no audio. An existing file at
    /// `target` is replaced.
    pub async fn extract(
        &self,
        source: &Path,
        target: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<Option<PathBuf>, ExportError> {
        let info = self.inspector.inspect(source).await?;
        let Some(audio) = info.audio else {
            tracing::info!(source = %source.display(), "No audio track; skipping audio export");
            return Ok(None);
        };

        match tokio::fs::remove_file(target).await {
            Ok(()) => tracing::debug!(target = %target.display(), "Replacing existing audio file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let duration = audio.range.duration_secs();
        tracing::info!(
            source = %source.display(),
            target = %target.display(),
            codec = %audio.codec,
            duration_secs = duration,
            "Extracting audio"
        );

        let job = RenderJob {
            args: extract_args(source, target, self.bitrate_kbps),
            output_path: target.to_path_buf(),
            expected_duration_secs: duration,
            total_frames: 0,
        };
        if let Err(e) = run_job(self.backend.clone(), job, progress).await {
            tracing::warn!(target = %target.display(), error = %e, "Audio extraction failed");
            remove_partial(target).await;
            return Err(e.into());
        }
        Ok(Some(target.to_path_buf()))
    }
}

fn extract_args(source: &Path, target: &Path, bitrate_kbps: u32) -> Vec<String> {
    vec![
        "-y".into(),
        "-nostdin".into(),
        "-hide_banner".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
        "-i".into(),
        source.to_string_lossy().into_owned(),
        "-map".into(),
        "0:a:0".into(),
        "-vn".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{}k", bitrate_kbps.max(64)),
        "-movflags".into(),
        "+faststart".into(),
        target.to_string_lossy().into_owned(),
    ]
}
