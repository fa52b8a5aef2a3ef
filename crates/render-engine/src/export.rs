//! Render backends and export progress.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dualcap_common::error::{ExportError, MergeError};

/// Seconds without progress before a stall warning.
const STALL_WARN_SECS: u64 = 10;

/// One encoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    /// Full ffmpeg argument list, output path last.
    pub args: Vec<String>,

    pub output_path: PathBuf,

    /// Duration of the output, used to turn encoder time into progress.
    pub expected_duration_secs: f64,

    /// Frames the output will contain (0 for audio-only jobs).
    pub total_frames: u64,
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("No render backend available: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),

    #[error("Render cancelled")]
    Cancelled,
}

impl From<RenderError> for MergeError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Cancelled => MergeError::ExportCancelled,
            other => MergeError::export(other.to_string()),
        }
    }
}

impl From<RenderError> for ExportError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Cancelled => ExportError::ExportCancelled,
            other => ExportError::export(other.to_string()),
        }
    }
}

/// Executes render jobs. Blocking; call through [`run_job`].
pub trait RenderBackend: Send + Sync {
    fn render(&self, job: &RenderJob, progress: Option<ProgressCallback>)
        -> Result<(), RenderError>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Run `job` on a blocking thread and wait for it.
pub async fn run_job(
    backend: Arc<dyn RenderBackend>,
    job: RenderJob,
    progress: Option<ProgressCallback>,
) -> Result<(), RenderError> {
    if !backend.is_available() {
        return Err(RenderError::Unavailable(format!(
            "{} not found in PATH",
            backend.name()
        )));
    }
    tracing::debug!(backend = backend.name(), output = %job.output_path.display(), "Running render job");
    tokio::task::spawn_blocking(move || backend.render(&job, progress))
        .await
        .map_err(|e| RenderError::Failed(format!("render task failed: {e}")))?
}

/// Renders by running the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: String,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegBackend {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl RenderBackend for FfmpegBackend {
    fn render(
        &self,
        job: &RenderJob,
        progress: Option<ProgressCallback>,
    ) -> Result<(), RenderError> {
        tracing::debug!(args = ?job.args, "Running ffmpeg");
        let mut cmd = Command::new(&self.binary);
        cmd.args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| RenderError::Failed(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            output = %job.output_path.display(),
            total_frames = job.total_frames,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RenderError::Failed("Failed to capture ffmpeg stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::Failed("Failed to capture ffmpeg stderr".into()))?;

        // ffmpeg blocks on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        if let Some(cb) = &progress {
            cb(ExportProgress {
                progress: 0.0,
                frames_rendered: 0,
                total_frames: job.total_frames,
                eta_secs: 0.0,
                stage: ExportStage::Preparing,
            });
        }

        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let mut latest = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = Instant::now();
        loop {
            line.clear();
            let bytes = reader
                .read_line(&mut line)
                .map_err(|e| RenderError::Failed(format!("Failed reading ffmpeg progress: {e}")))?;
            if bytes == 0 {
                break;
            }

            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            latest.update(key, value);
            if key != "progress" {
                continue;
            }

            if latest.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = latest.out_time_secs;
                last_progress_wall = Instant::now();
            }
            if let Some(cb) = &progress {
                cb(progress_report(
                    &latest,
                    job.total_frames,
                    job.expected_duration_secs,
                    start.elapsed().as_secs_f64(),
                ));
            }
            if last_progress_wall.elapsed() >= Duration::from_secs(STALL_WARN_SECS) {
                tracing::warn!(
                    out_time_secs = latest.out_time_secs,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "No ffmpeg progress advancement for {STALL_WARN_SECS}s"
                );
                last_progress_wall = Instant::now();
            }
        }

        let status = child
            .wait()
            .map_err(|e| RenderError::Failed(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if status.code().is_none() {
            tracing::warn!(status = %status, "ffmpeg terminated by signal");
            return Err(RenderError::Cancelled);
        }
        if !status.success() {
            return Err(RenderError::Failed(format!(
                "ffmpeg exited with {status}: {}",
                last_lines(&stderr_output, 8)
            )));
        }

        if let Some(cb) = &progress {
            cb(ExportProgress {
                progress: 1.0,
                frames_rendered: job.total_frames,
                total_frames: job.total_frames,
                eta_secs: 0.0,
                stage: ExportStage::Complete,
            });
        }
        tracing::info!(
            output = %job.output_path.display(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "ffmpeg finished"
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn name(&self) -> &str {
        &self.binary
    }
}

pub fn command_exists(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both names.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

fn progress_report(
    state: &ProgressState,
    total_frames: u64,
    expected_duration_secs: f64,
    elapsed_secs: f64,
) -> ExportProgress {
    let progress = if expected_duration_secs <= 0.0 {
        0.0
    } else {
        (state.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    };

    let frames_rendered = (progress * total_frames as f64).round() as u64;
    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    ExportProgress {
        progress: if state.complete { 1.0 } else { progress },
        frames_rendered,
        total_frames,
        eta_secs,
        stage: if state.complete {
            ExportStage::Finalizing
        } else {
            ExportStage::Rendering
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_tracks_encoder_time() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "4000000");
        state.update("progress", "continue");
        let report = progress_report(&state, 240, 8.0, 2.0);
        assert_eq!(report.progress, 0.5);
        assert_eq!(report.frames_rendered, 120);
        assert_eq!(report.eta_secs, 2.0);
        assert_eq!(report.stage, ExportStage::Rendering);

        state.update("progress", "end");
        let report = progress_report(&state, 240, 8.0, 4.0);
        assert_eq!(report.progress, 1.0);
        assert_eq!(report.stage, ExportStage::Finalizing);
    }

    #[test]
    fn zero_duration_reports_no_progress() {
        let mut state = ProgressState::default();
        state.update("out_time_ms", "1000000");
        let report = progress_report(&state, 0, 0.0, 1.0);
        assert_eq!(report.progress, 0.0);
        assert_eq!(report.eta_secs, 0.0);
    }

    #[test]
    fn cancelled_render_maps_to_cancelled_errors() {
        assert!(matches!(
            MergeError::from(RenderError::Cancelled),
            MergeError::ExportCancelled
        ));
        assert!(matches!(
            ExportError::from(RenderError::Failed("boom".into())),
            ExportError::ExportFailed { .. }
        ));
    }

    #[test]
    fn last_lines_keeps_the_tail() {
        assert_eq!(last_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("only", 5), "only");
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let backend: Arc<dyn RenderBackend> =
            Arc::new(FfmpegBackend::with_binary("dualcap-no-such-ffmpeg"));
        let job = RenderJob {
            args: vec![],
            output_path: PathBuf::from("out.mov"),
            expected_duration_secs: 1.0,
            total_frames: 30,
        };
        let err = run_job(backend, job, None).await.unwrap_err();
        assert!(matches!(err, RenderError::Unavailable(_)));
    }
}
