//! Post-capture finalization: audio export and merge, then one status line.

use std::fmt;
use std::path::{Path, PathBuf};

use dualcap_session_model::{OverlaySpec, RecordingArtifacts};
use serde::Serialize;

use crate::audio::AudioTrackExtractor;
use crate::compositor::{Compositor, MergeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Everything that was asked for was produced.
    Success,
    /// Raw recordings are safe but a post-processing step failed.
    Degraded,
    /// The recording itself failed.
    Failed,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionOutcome::Success => "success",
            SessionOutcome::Degraded => "degraded",
            SessionOutcome::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub screen: Option<PathBuf>,
    pub camera: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub merged: Option<PathBuf>,
    pub audio_error: Option<String>,
    pub merge_error: Option<String>,
    pub status_message: String,
}

impl SessionReport {
    /// Report for a recording that produced no usable files.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            outcome: SessionOutcome::Failed,
            screen: None,
            camera: None,
            audio: None,
            merged: None,
            audio_error: None,
            merge_error: None,
            status_message: format!("Recording failed: {message}"),
        }
    }
}

/// Run audio extraction and, when a camera was recorded, the merge.
///
/// The two jobs run concurrently and neither failure aborts the other.
pub async fn finalize_session(
    compositor: &Compositor,
    extractor: &AudioTrackExtractor,
    artifacts: &RecordingArtifacts,
    overlay: OverlaySpec,
) -> SessionReport {
    let screen = artifacts.screen.path.clone();
    let camera = artifacts.camera.as_ref().map(|c| c.path.clone());
    let audio_target = artifacts.audio_target();
    let merge_request = MergeRequest::for_session(artifacts, overlay);

    let merge = async {
        match &merge_request {
            Some(request) => Some(compositor.merge(request, None).await),
            None => {
                tracing::info!("Camera disabled; no merge");
                None
            }
        }
    };
    let (audio, merged) = tokio::join!(extractor.extract(&screen, &audio_target, None), merge);

    let (audio, audio_error) = match audio {
        Ok(path) => (path, None),
        Err(e) => {
            tracing::warn!(error = %e, "Audio extraction failed; recording kept");
            (None, Some(e.to_string()))
        }
    };
    let (merged, merge_error) = match merged {
        Some(Ok(path)) => (Some(path), None),
        Some(Err(e)) => {
            tracing::error!(error = %e, "Merge failed; individual recordings kept");
            (None, Some(e.to_string()))
        }
        None => (None, None),
    };

    let outcome = if audio_error.is_some() || merge_error.is_some() {
        SessionOutcome::Degraded
    } else {
        SessionOutcome::Success
    };

    let status_message = status_message(
        &screen,
        camera.as_deref(),
        merged.as_deref(),
        merge_error.as_deref(),
        audio_error.as_deref(),
    );
    tracing::info!(outcome = %outcome, status = %status_message, "Session finalized");

    SessionReport {
        outcome,
        screen: Some(screen),
        camera,
        audio,
        merged,
        audio_error,
        merge_error,
        status_message,
    }
}

fn status_message(
    screen: &Path,
    camera: Option<&Path>,
    merged: Option<&Path>,
    merge_error: Option<&str>,
    audio_error: Option<&str>,
) -> String {
    let mut message = match (camera, merged, merge_error) {
        (_, Some(merged), _) => format!("Saved to {}", merged.display()),
        (Some(camera), None, Some(err)) => format!(
            "Merge failed ({err}). Individual files: {} and {}",
            screen.display(),
            camera.display()
        ),
        _ => format!("Saved to {}", screen.display()),
    };
    if let Some(err) = audio_error {
        message.push_str(&format!(" (audio export failed: {err})"));
    }
    message
}
