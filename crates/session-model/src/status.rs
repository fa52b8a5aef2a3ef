//! Observable recorder state.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Single status value published by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecorderStatus {
    #[default]
    Idle,
    CheckingPermissions,
    Starting,
    Recording {
        session_dir: PathBuf,
        camera: bool,
    },
    Stopping,
    Stopped {
        screen: PathBuf,
        camera: Option<PathBuf>,
    },
    Failed {
        message: String,
    },
}

impl RecorderStatus {
    pub fn is_recording(&self) -> bool {
        matches!(self, RecorderStatus::Recording { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            RecorderStatus::CheckingPermissions
                | RecorderStatus::Starting
                | RecorderStatus::Recording { .. }
                | RecorderStatus::Stopping
        )
    }
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderStatus::Idle => f.write_str("Ready to record"),
            RecorderStatus::CheckingPermissions => f.write_str("Checking permissions..."),
            RecorderStatus::Starting => f.write_str("Starting capture..."),
            RecorderStatus::Recording { session_dir, camera } => {
                let what = if *camera { "screen and camera" } else { "screen" };
                write!(f, "Recording {what} to {}", session_dir.display())
            }
            RecorderStatus::Stopping => f.write_str("Finishing recording..."),
            RecorderStatus::Stopped { screen, camera } => match camera {
                Some(camera) => write!(
                    f,
                    "Saved screen to {} and camera to {}",
                    screen.display(),
                    camera.display()
                ),
                None => write!(f, "Saved to {}", screen.display()),
            },
            RecorderStatus::Failed { message } => write!(f, "Recording failed: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_only_stop_reports_screen_path() {
        let status = RecorderStatus::Stopped {
            screen: PathBuf::from("/r/screen_record.mov"),
            camera: None,
        };
        assert_eq!(status.to_string(), "Saved to /r/screen_record.mov");
        assert!(!status.is_busy());
    }

    #[test]
    fn recording_is_busy() {
        let status = RecorderStatus::Recording {
            session_dir: PathBuf::from("/r"),
            camera: true,
        };
        assert!(status.is_recording());
        assert!(status.is_busy());
        assert!(status.to_string().contains("screen and camera"));
    }
}
