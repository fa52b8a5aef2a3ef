//! Recording artifacts and the on-disk layout of one recording session.
//!
//! A session normally lives in its own timestamped folder:
//!
//! ```text
//! Recording_2026-03-14_09-26-53/
//!   screen_record.mov
//!   person_video.mov      (camera enabled)
//!   session_audio.m4a     (screen recording had audio)
//!   merged_video.mov      (camera enabled and merge succeeded)
//! ```
//!
//! When no session folder is available, artifacts fall back to flat names
//! suffixed with the unix epoch of the recording start.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SESSION_FOLDER_PREFIX: &str = "Recording_";
pub const SESSION_FOLDER_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// What a recording artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ScreenVideo,
    CameraVideo,
    SessionAudio,
    MergedVideo,
}

impl ArtifactKind {
    /// File name inside a session folder.
    pub fn session_file_name(self) -> &'static str {
        match self {
            ArtifactKind::ScreenVideo => "screen_record.mov",
            ArtifactKind::CameraVideo => "person_video.mov",
            ArtifactKind::SessionAudio => "session_audio.m4a",
            ArtifactKind::MergedVideo => "merged_video.mov",
        }
    }

    /// File name used without a session folder.
    pub fn flat_file_name(self, epoch: i64) -> String {
        match self {
            ArtifactKind::ScreenVideo => format!("screen_recording_{epoch}.mov"),
            ArtifactKind::CameraVideo => format!("camera_recording_{epoch}.mov"),
            ArtifactKind::SessionAudio => format!("session_audio_{epoch}.m4a"),
            ArtifactKind::MergedVideo => format!("merged_recording_{epoch}.mov"),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::ScreenVideo => "screen recording",
            ArtifactKind::CameraVideo => "camera recording",
            ArtifactKind::SessionAudio => "session audio",
            ArtifactKind::MergedVideo => "merged video",
        };
        f.write_str(label)
    }
}

/// Where the artifacts of one recording are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ArtifactLayout {
    /// A dedicated `Recording_<timestamp>` folder.
    Session { dir: PathBuf },
    /// Epoch-suffixed files directly under `dir`.
    Flat { dir: PathBuf, epoch: i64 },
}

impl ArtifactLayout {
    /// Folder name for a session that started at `local_time`.
    pub fn session_folder_name(local_time: &NaiveDateTime) -> String {
        format!(
            "{SESSION_FOLDER_PREFIX}{}",
            local_time.format(SESSION_FOLDER_TIME_FORMAT)
        )
    }

    /// Create a fresh session folder under `root`.
    ///
    /// Never reuses an existing folder: a name collision within the same
    /// second gets a `_2`, `_3`, ... suffix.
    pub fn create_session(root: &Path, local_time: &NaiveDateTime) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let base = Self::session_folder_name(local_time);
        let mut attempt = 1u32;
        loop {
            let name = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let dir = root.join(name);
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok(ArtifactLayout::Session { dir }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 100 => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Flat layout under `root`, creating `root` if needed.
    pub fn flat(root: &Path, started_at: &DateTime<Utc>) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(ArtifactLayout::Flat {
            dir: root.to_path_buf(),
            epoch: started_at.timestamp(),
        })
    }

    pub fn dir(&self) -> &Path {
        match self {
            ArtifactLayout::Session { dir } | ArtifactLayout::Flat { dir, .. } => dir,
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, ArtifactLayout::Session { .. })
    }

    pub fn path_for(&self, kind: ArtifactKind) -> PathBuf {
        match self {
            ArtifactLayout::Session { dir } => dir.join(kind.session_file_name()),
            ArtifactLayout::Flat { dir, epoch } => dir.join(kind.flat_file_name(*epoch)),
        }
    }

    /// Remove the session folder if nothing was written into it.
    ///
    /// Flat layouts and non-empty folders are left alone. Returns whether a
    /// folder was removed.
    pub fn remove_if_empty(&self) -> io::Result<bool> {
        let ArtifactLayout::Session { dir } = self else {
            return Ok(false);
        };
        if std::fs::read_dir(dir)?.next().is_some() {
            return Ok(false);
        }
        std::fs::remove_dir(dir)?;
        Ok(true)
    }
}

/// Sample accounting for one sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkStats {
    pub video_samples_appended: u64,
    pub audio_samples_appended: u64,
    /// Writer input reported it was not ready.
    pub dropped_not_ready: u64,
    /// Ingress queue between device and sink was full.
    pub dropped_queue_full: u64,
    /// Timestamp preceded the session origin.
    pub dropped_before_origin: u64,
}

impl SinkStats {
    pub fn appended(&self) -> u64 {
        self.video_samples_appended + self.audio_samples_appended
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_not_ready + self.dropped_queue_full + self.dropped_before_origin
    }

    pub fn drop_rate(&self) -> f64 {
        let total = self.appended() + self.dropped();
        if total == 0 {
            return 0.0;
        }
        self.dropped() as f64 / total as f64
    }
}

/// A finalized container file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Wall-clock instant the first sample was accepted, if any was.
    pub started_at: Option<DateTime<Utc>>,
    pub stats: SinkStats,
}

impl RecordingArtifact {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            started_at: None,
            stats: SinkStats::default(),
        }
    }
}

/// Everything one recording session produced at stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingArtifacts {
    pub layout: ArtifactLayout,
    pub screen: RecordingArtifact,
    pub camera: Option<RecordingArtifact>,
}

impl RecordingArtifacts {
    pub fn audio_target(&self) -> PathBuf {
        self.layout.path_for(ArtifactKind::SessionAudio)
    }

    pub fn merged_target(&self) -> PathBuf {
        self.layout.path_for(ArtifactKind::MergedVideo)
    }
}
