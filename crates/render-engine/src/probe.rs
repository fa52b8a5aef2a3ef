//! Media inspection: stream time ranges and frame sizes of finished files.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use dualcap_common::error::{ExportError, MergeError};
use dualcap_session_model::{Dimensions, TimeRange};
use serde::Deserialize;
use tokio::process::Command;

/// Failure to read a file's tracks.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to load tracks from {path}: {message}")]
pub struct ProbeError {
    pub path: PathBuf,
    pub message: String,
}

impl ProbeError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<ProbeError> for MergeError {
    fn from(e: ProbeError) -> Self {
        MergeError::track_load(e.path, e.message)
    }
}

impl From<ProbeError> for ExportError {
    fn from(e: ProbeError) -> Self {
        ExportError::track_load(e.path, e.message)
    }
}

/// The first video stream of a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoStreamInfo {
    pub range: TimeRange,
    pub dimensions: Dimensions,
}

/// The first audio stream of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    pub range: TimeRange,
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub video: VideoStreamInfo,
    pub audio: Option<AudioStreamInfo>,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Reads stream layout from container files.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    /// Fails if the file is unreadable or has no video stream.
    async fn inspect(&self, path: &Path) -> Result<MediaInfo, ProbeError>;
}

/// [`MediaInspector`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    binary: String,
}

impl Default for FfprobeInspector {
    fn default() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }
}

impl FfprobeInspector {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaInspector for FfprobeInspector {
    async fn inspect(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        if !path.exists() {
            return Err(ProbeError::new(path, "file does not exist"));
        }

        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "stream=index,codec_type,codec_name,width,height,start_time,duration:format=start_time,duration",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProbeError::new(path, format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::new(
                path,
                format!("{} failed: {}", self.binary, stderr.trim()),
            ));
        }

        let info = parse_ffprobe_json(path, &String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(
            path = %path.display(),
            video_start = info.video.range.start_secs,
            video_end = info.video.range.end_secs,
            dimensions = %info.video.dimensions,
            audio = info.has_audio(),
            "Probed media"
        );
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    start_time: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    start_time: Option<String>,
    duration: Option<String>,
}

/// ffprobe prints numbers as strings and "N/A" when unknown.
fn seconds(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// A stream without its own duration ends where the container ends.
fn stream_range(stream: &ProbeStream, format: Option<&ProbeFormat>) -> Option<TimeRange> {
    let format_start = format.and_then(|f| seconds(f.start_time.as_ref()));
    let start = seconds(stream.start_time.as_ref())
        .or(format_start)
        .unwrap_or(0.0);
    if let Some(duration) = seconds(stream.duration.as_ref()) {
        return Some(TimeRange::from_start_duration(start, duration));
    }
    let format_duration = format.and_then(|f| seconds(f.duration.as_ref()))?;
    let end = format_start.unwrap_or(0.0) + format_duration;
    (end > start).then(|| TimeRange::new(start, end))
}

/// Parse `ffprobe -of json` output for `path`.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<MediaInfo, ProbeError> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| ProbeError::new(path, format!("unreadable probe output: {e}")))?;
    let format = probe.format.as_ref();

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ProbeError::new(path, "no video track"))?;
    let video_range = stream_range(video_stream, format)
        .ok_or_else(|| ProbeError::new(path, "video track has no duration"))?;
    let dimensions = match (video_stream.width, video_stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Dimensions::new(w, h),
        _ => return Err(ProbeError::new(path, "video track has no frame size")),
    };

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| {
            let range = stream_range(s, format)?;
            Some(AudioStreamInfo {
                range,
                codec: s.codec_name.clone().unwrap_or_default(),
            })
        });

    Ok(MediaInfo {
        path: path.to_path_buf(),
        video: VideoStreamInfo {
            range: video_range,
            dimensions,
        },
        audio,
    })
}
