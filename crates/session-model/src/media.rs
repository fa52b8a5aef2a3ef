//! Capture sources, permission modalities, and sample kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two independently clocked video sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Screen,
    Camera,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Screen => "screen",
            SourceKind::Camera => "camera",
        }
    }

    /// The permission a source of this kind needs for its video.
    pub fn modality(self) -> Modality {
        match self {
            SourceKind::Screen => Modality::Screen,
            SourceKind::Camera => Modality::Camera,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability gated by an OS permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Screen,
    Camera,
    Microphone,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Screen => "screen recording",
            Modality::Camera => "camera",
            Modality::Microphone => "microphone",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media type of a captured sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    Video,
    Audio,
}

impl SampleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleKind::Video => "video",
            SampleKind::Audio => "audio",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
