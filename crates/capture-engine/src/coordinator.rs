//! Two-source recording coordinator.
//!
//! Owns the screen and camera [`CaptureSource`]s for the lifetime of the
//! recorder. A recording goes:
//!
//! 1. permission checks for every enabled modality, run concurrently
//! 2. one session folder (or flat naming when that is unavailable)
//! 3. screen and camera started concurrently, so their origins land as
//!    close together in wall-clock time as possible
//! 4. on stop, both sources finalize before anything else happens
//!
//! Progress is published through a single [`RecorderStatus`] watch channel.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, Utc};
use dualcap_common::clock::DriftMeasurement;
use dualcap_common::config::AppConfig;
use dualcap_common::error::{CaptureError, CoordinatorError};
use dualcap_session_model::{
    ArtifactKind, ArtifactLayout, Modality, QualityPreset, RecorderStatus, RecordingArtifacts,
};
use tokio::sync::watch;

use crate::device::AudioFormat;
use crate::permissions::{PermissionProbe, PermissionStatus};
use crate::source::{CaptureSource, SourceConfig};

/// Screen/camera origin skew above which a warning is logged.
const ORIGIN_SKEW_WARN_MS: f64 = 100.0;

/// Settings the coordinator needs from the application config.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub recordings_dir: PathBuf,
    pub quality: QualityPreset,
    pub screen_fps: u32,
    pub camera_fps: u32,
    pub audio: AudioFormat,
    /// Also record the microphone into the camera file.
    pub camera_audio: bool,
    pub session_folders: bool,
}

impl From<&AppConfig> for CoordinatorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            recordings_dir: config.recordings_dir.clone(),
            quality: config.recording.quality,
            screen_fps: config.recording.screen_fps,
            camera_fps: config.recording.camera_fps,
            audio: AudioFormat {
                sample_rate: config.recording.audio_sample_rate,
                channels: config.recording.audio_channels,
            },
            camera_audio: config.recording.camera_audio,
            session_folders: config.recording.session_folders,
        }
    }
}

struct ActiveSession {
    layout: ArtifactLayout,
    camera: bool,
}

pub struct CaptureCoordinator {
    config: CoordinatorConfig,
    permissions: Arc<dyn PermissionProbe>,
    screen: CaptureSource,
    camera: CaptureSource,
    status: watch::Sender<RecorderStatus>,
    session: Option<ActiveSession>,
}

impl CaptureCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        permissions: Arc<dyn PermissionProbe>,
        screen: CaptureSource,
        camera: CaptureSource,
    ) -> Self {
        let (status, _) = watch::channel(RecorderStatus::Idle);
        Self {
            config,
            permissions,
            screen,
            camera,
            status,
            session: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> RecorderStatus {
        self.status.borrow().clone()
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    fn publish(&self, status: RecorderStatus) {
        tracing::debug!(status = %status, "Recorder status");
        self.status.send_replace(status);
    }

    /// Start a recording.
    ///
    /// Nothing is left running if this fails: a source that started while
    /// its sibling failed is stopped again and its file removed.
    pub async fn start_all(
        &mut self,
        camera_enabled: bool,
        mic_enabled: bool,
    ) -> Result<ArtifactLayout, CoordinatorError> {
        if self.session.is_some() {
            return Err(CoordinatorError::AlreadyRecording);
        }

        match self.try_start(camera_enabled, mic_enabled).await {
            Ok(layout) => {
                self.publish(RecorderStatus::Recording {
                    session_dir: layout.dir().to_path_buf(),
                    camera: camera_enabled,
                });
                self.session = Some(ActiveSession {
                    layout: layout.clone(),
                    camera: camera_enabled,
                });
                Ok(layout)
            }
            Err(e) => {
                tracing::error!(error = %e, "Recording failed to start");
                self.publish(RecorderStatus::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn try_start(
        &mut self,
        camera_enabled: bool,
        mic_enabled: bool,
    ) -> Result<ArtifactLayout, CoordinatorError> {
        self.publish(RecorderStatus::CheckingPermissions);
        self.check_permissions(camera_enabled, mic_enabled).await?;

        self.publish(RecorderStatus::Starting);
        let layout = self.create_layout()?;
        tracing::info!(
            dir = %layout.dir().display(),
            session_folder = layout.is_session(),
            camera = camera_enabled,
            mic = mic_enabled,
            quality = %self.config.quality,
            "Starting recording"
        );

        let audio = mic_enabled.then_some(self.config.audio);
        let screen_config = SourceConfig {
            output_path: layout.path_for(ArtifactKind::ScreenVideo),
            quality: self.config.quality,
            fps: self.config.screen_fps,
            audio,
        };

        if !camera_enabled {
            if let Err(e) = self.screen.start(screen_config).await {
                discard_layout(&layout);
                return Err(e.into());
            }
            return Ok(layout);
        }

        let camera_config = SourceConfig {
            output_path: layout.path_for(ArtifactKind::CameraVideo),
            quality: self.config.quality,
            fps: self.config.camera_fps,
            audio: audio.filter(|_| self.config.camera_audio),
        };

        let (screen_started, camera_started) = tokio::join!(
            self.screen.start(screen_config),
            self.camera.start(camera_config)
        );

        match (screen_started, camera_started) {
            (Ok(()), Ok(())) => Ok(layout),
            (Err(e), other) | (other, Err(e)) => {
                if other.is_ok() {
                    self.abort_started_sources().await;
                }
                discard_layout(&layout);
                Err(e.into())
            }
        }
    }

    async fn check_permissions(
        &self,
        camera_enabled: bool,
        mic_enabled: bool,
    ) -> Result<(), CaptureError> {
        let probe = &self.permissions;
        let required = |enabled: bool, modality: Modality| async move {
            if enabled {
                Some(probe.check(modality).await)
            } else {
                None
            }
        };
        let (screen, camera, mic) = tokio::join!(
            required(true, Modality::Screen),
            required(camera_enabled, Modality::Camera),
            required(mic_enabled, Modality::Microphone)
        );

        for (modality, status) in [
            (Modality::Screen, screen),
            (Modality::Camera, camera),
            (Modality::Microphone, mic),
        ] {
            match status {
                None | Some(PermissionStatus::Granted) => {}
                Some(PermissionStatus::Denied) => {
                    return Err(CaptureError::PermissionDenied { modality });
                }
                Some(PermissionStatus::Unavailable { reason }) => {
                    return Err(CaptureError::device_unavailable(format!(
                        "{modality}: {reason}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn create_layout(&self) -> Result<ArtifactLayout, CoordinatorError> {
        let root = &self.config.recordings_dir;
        if self.config.session_folders {
            match ArtifactLayout::create_session(root, &Local::now().naive_local()) {
                Ok(layout) => return Ok(layout),
                Err(e) => {
                    tracing::warn!(
                        root = %root.display(),
                        error = %e,
                        "Session folder unavailable; falling back to flat file names"
                    );
                }
            }
        }
        ArtifactLayout::flat(root, &Utc::now()).map_err(|source| CoordinatorError::SessionFolder {
            path: root.clone(),
            source,
        })
    }

    /// Stop and delete whatever a half-failed start left running.
    async fn abort_started_sources(&mut self) {
        for source in [&mut self.screen, &mut self.camera] {
            match source.stop().await {
                Ok(Some(artifact)) => {
                    if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                        tracing::warn!(path = %artifact.path.display(), error = %e, "Failed to remove aborted recording");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(kind = %source.kind(), error = %e, "Failed to stop source after aborted start");
                }
            }
        }
    }

    /// Stop the recording and wait for every source to finalize.
    ///
    /// A camera failure does not cost the screen recording: the screen
    /// artifact is returned without a camera artifact.
    pub async fn stop_all(&mut self) -> Result<RecordingArtifacts, CoordinatorError> {
        let Some(session) = self.session.take() else {
            return Err(CoordinatorError::NotRecording);
        };
        self.publish(RecorderStatus::Stopping);

        let (screen, camera) = if session.camera {
            tokio::join!(self.screen.stop(), self.camera.stop())
        } else {
            (self.screen.stop().await, Ok(None))
        };

        let screen = match screen {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                self.publish(RecorderStatus::Failed {
                    message: "screen source was not running".to_string(),
                });
                return Err(CoordinatorError::NotRecording);
            }
            Err(e) => {
                tracing::error!(error = %e, "Screen recording failed to finalize");
                self.publish(RecorderStatus::Failed {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let camera = match camera {
            Ok(camera) => camera,
            Err(e) => {
                tracing::error!(error = %e, "Camera recording failed to finalize; keeping screen recording");
                None
            }
        };

        if let (Some(screen_start), Some(camera_start)) = (
            screen.started_at,
            camera.as_ref().and_then(|c| c.started_at),
        ) {
            let drift = DriftMeasurement::between(&screen_start, &camera_start);
            if drift.exceeds_threshold_ms(ORIGIN_SKEW_WARN_MS) {
                tracing::warn!(skew_ms = drift.drift_ms(), "Screen and camera origins far apart");
            } else {
                tracing::info!(skew_ms = drift.drift_ms(), "Screen and camera origin skew");
            }
        }

        self.publish(RecorderStatus::Stopped {
            screen: screen.path.clone(),
            camera: camera.as_ref().map(|c| c.path.clone()),
        });

        Ok(RecordingArtifacts {
            layout: session.layout,
            screen,
            camera,
        })
    }
}

fn discard_layout(layout: &ArtifactLayout) {
    match layout.remove_if_empty() {
        Ok(true) => tracing::debug!(dir = %layout.dir().display(), "Removed empty session folder"),
        Ok(false) => {}
        Err(e) => tracing::warn!(dir = %layout.dir().display(), error = %e, "Failed to remove session folder"),
    }
}
