//! Error types shared across Dualcap crates.
//!
//! Each operation family gets its own enum so callers can match on the
//! kinds they recover from. [`DualcapError`] wraps all of them at the top.

use std::path::PathBuf;

use dualcap_session_model::{CapturePreset, Modality};

/// Failures of a single capture source.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Permission denied for {modality}")]
    PermissionDenied { modality: Modality },

    #[error("Capture device unavailable: {message}")]
    DeviceUnavailable { message: String },

    /// Absorbed by the preset fallback ladder; only surfaces when every
    /// rung is refused.
    #[error("Capture preset {preset} unsupported: {message}")]
    SessionConfigUnsupported {
        preset: CapturePreset,
        message: String,
    },

    #[error("Failed to open writer for {path}: {message}")]
    WriterOpenFailed { path: PathBuf, message: String },

    #[error("Failed to finalize {path}: {message}")]
    WriterFinalizeFailed { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn device_unavailable(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            message: msg.into(),
        }
    }

    pub fn unsupported(preset: CapturePreset, msg: impl Into<String>) -> Self {
        Self::SessionConfigUnsupported {
            preset,
            message: msg.into(),
        }
    }

    pub fn writer_open(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::WriterOpenFailed {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn writer_finalize(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::WriterFinalizeFailed {
            path: path.into(),
            message: msg.into(),
        }
    }
}

/// Failures of the two-source coordinator.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("No recording is in progress")]
    NotRecording,

    #[error("Failed to create session folder {path}: {source}")]
    SessionFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Failures of the compositor merge.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Recordings do not overlap in time: {screen} and {camera}")]
    NoOverlap { screen: PathBuf, camera: PathBuf },

    #[error("Failed to load tracks from {path}: {message}")]
    TrackLoadFailed { path: PathBuf, message: String },

    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    #[error("Export cancelled")]
    ExportCancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MergeError {
    pub fn track_load(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::TrackLoadFailed {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::ExportFailed {
            message: msg.into(),
        }
    }
}

/// Failures of standalone audio extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to load tracks from {path}: {message}")]
    TrackLoadFailed { path: PathBuf, message: String },

    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    #[error("Export cancelled")]
    ExportCancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExportError {
    pub fn track_load(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::TrackLoadFailed {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::ExportFailed {
            message: msg.into(),
        }
    }
}

/// Top-level error type for Dualcap operations.
#[derive(Debug, thiserror::Error)]
pub enum DualcapError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using DualcapError.
pub type DualcapResult<T> = Result<T, DualcapError>;

impl DualcapError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
