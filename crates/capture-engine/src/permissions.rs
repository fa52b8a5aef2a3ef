//! Permission probing for screen, camera, and microphone capture.

use std::fmt;

use async_trait::async_trait;
use dualcap_session_model::Modality;

/// Whether a modality may be captured right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// No device or session exists to grant access to.
    Unavailable { reason: String },
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionStatus::Granted => f.write_str("granted"),
            PermissionStatus::Denied => f.write_str("denied"),
            PermissionStatus::Unavailable { reason } => write!(f, "unavailable ({reason})"),
        }
    }
}

/// Checks OS capture permissions.
#[async_trait]
pub trait PermissionProbe: Send + Sync {
    async fn check(&self, modality: Modality) -> PermissionStatus;
}

/// Permission checks against the running system.
///
/// Linux has no central consent store for these devices, so access is
/// inferred: a graphical session for the screen and an openable
/// `/dev/video*` node for the camera. The microphone is always granted;
/// a missing input device shows up when capture starts.
#[derive(Debug, Clone, Default)]
pub struct SystemPermissions;

#[async_trait]
impl PermissionProbe for SystemPermissions {
    async fn check(&self, modality: Modality) -> PermissionStatus {
        let status = tokio::task::spawn_blocking(move || check_blocking(modality))
            .await
            .unwrap_or_else(|e| PermissionStatus::Unavailable {
                reason: format!("permission check failed: {e}"),
            });
        tracing::debug!(%modality, %status, "Permission checked");
        status
    }
}

/// Grants everything. For synthetic devices, which need no OS access.
#[derive(Debug, Clone, Default)]
pub struct GrantAllPermissions;

#[async_trait]
impl PermissionProbe for GrantAllPermissions {
    async fn check(&self, _modality: Modality) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

fn check_blocking(modality: Modality) -> PermissionStatus {
    match modality {
        Modality::Screen => check_screen(),
        Modality::Camera => check_camera(),
        Modality::Microphone => check_microphone(),
    }
}

fn check_screen() -> PermissionStatus {
    if cfg!(target_os = "linux")
        && std::env::var("DISPLAY").is_err()
        && std::env::var("WAYLAND_DISPLAY").is_err()
    {
        return PermissionStatus::Unavailable {
            reason: "no graphical session".to_string(),
        };
    }
    PermissionStatus::Granted
}

fn check_camera() -> PermissionStatus {
    if !cfg!(target_os = "linux") {
        return PermissionStatus::Granted;
    }

    let nodes: Vec<String> = (0..16)
        .map(|idx| format!("/dev/video{idx}"))
        .filter(|path| std::path::Path::new(path).exists())
        .collect();
    if nodes.is_empty() {
        return PermissionStatus::Unavailable {
            reason: "no /dev/video* device".to_string(),
        };
    }

    let mut denied = false;
    for node in &nodes {
        match std::fs::File::open(node) {
            Ok(_) => return PermissionStatus::Granted,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => denied = true,
            Err(_) => {}
        }
    }
    if denied {
        PermissionStatus::Denied
    } else {
        PermissionStatus::Unavailable {
            reason: "no camera device could be opened".to_string(),
        }
    }
}

fn check_microphone() -> PermissionStatus {
    // Desktop Linux exposes the microphone to every session user.
    PermissionStatus::Granted
}
