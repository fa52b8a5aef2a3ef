//! Application configuration.

use dualcap_session_model::{OverlaySpec, QualityPreset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where recording sessions are stored.
    pub recordings_dir: PathBuf,

    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Picture-in-picture placement for merged exports.
    pub overlay: OverlaySpec,

    /// Post-capture export settings.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    pub quality: QualityPreset,

    pub camera_enabled: bool,

    pub mic_enabled: bool,

    /// Record the microphone into the camera file as well as the screen file.
    pub camera_audio: bool,

    pub screen_fps: u32,

    pub camera_fps: u32,

    pub audio_sample_rate: u32,

    pub audio_channels: u32,

    /// Group artifacts in a `Recording_<timestamp>` folder per session.
    pub session_folders: bool,
}

/// Merged video and standalone audio export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    pub quality: QualityPreset,

    pub audio_bitrate_kbps: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "dualcap=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recordings_dir: dirs_default_recordings(),
            recording: RecordingDefaults::default(),
            overlay: OverlaySpec::default(),
            export: ExportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            quality: QualityPreset::High,
            camera_enabled: true,
            mic_enabled: true,
            camera_audio: false,
            screen_fps: 30,
            camera_fps: 30,
            audio_sample_rate: 48000,
            audio_channels: 2,
            session_folders: true,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            quality: QualityPreset::High,
            audio_bitrate_kbps: 192,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("dualcap").join("config.json")
}

/// Default recordings directory.
fn dirs_default_recordings() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("dualcap").join("recordings")
}
