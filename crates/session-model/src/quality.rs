//! Recording quality tiers and capture presets.
//!
//! A [`QualityPreset`] is what the caller picks. It maps to a target bitrate,
//! target output dimensions, and the [`CapturePreset`] a device is asked to
//! open. Devices that refuse the preset are walked down a fallback ladder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height. Degenerate sizes report 1.0.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        self.width as f64 / self.height as f64
    }

    /// Round both sides down to even values (4:2:0 encoders need this).
    pub fn even(self) -> Self {
        Self {
            width: (self.width & !1).max(2),
            height: (self.height & !1).max(2),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Caller-selected recording quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    /// 1280x720 at 3 Mbps.
    Standard,
    /// 1920x1080 at 8 Mbps.
    #[default]
    High,
    /// 2560x1440 at 15 Mbps, captured through the 4K preset.
    Ultra,
    /// 3840x2160 at 30 Mbps.
    Max,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 4] = [
        QualityPreset::Standard,
        QualityPreset::High,
        QualityPreset::Ultra,
        QualityPreset::Max,
    ];

    /// Target encoder bitrate in bits per second.
    pub fn bitrate_bps(self) -> u64 {
        match self {
            QualityPreset::Standard => 3_000_000,
            QualityPreset::High => 8_000_000,
            QualityPreset::Ultra => 15_000_000,
            QualityPreset::Max => 30_000_000,
        }
    }

    pub fn bitrate_kbps(self) -> u32 {
        (self.bitrate_bps() / 1000) as u32
    }

    /// Requested output dimensions.
    pub fn dimensions(self) -> Dimensions {
        match self {
            QualityPreset::Standard => Dimensions::new(1280, 720),
            QualityPreset::High => Dimensions::new(1920, 1080),
            QualityPreset::Ultra => Dimensions::new(2560, 1440),
            QualityPreset::Max => Dimensions::new(3840, 2160),
        }
    }

    /// The capture preset devices are asked to open for this tier.
    pub fn capture_preset(self) -> CapturePreset {
        match self {
            QualityPreset::Standard => CapturePreset::Hd720,
            QualityPreset::High => CapturePreset::Hd1080,
            QualityPreset::Ultra | QualityPreset::Max => CapturePreset::Uhd2160,
        }
    }

    /// Output dimensions once a device accepted `accepted`.
    ///
    /// The requested tier keeps its own dimensions. A downgraded preset
    /// records at the preset's size, and the generic preset records at
    /// whatever the device delivers natively.
    pub fn output_dimensions(self, accepted: CapturePreset, native: Dimensions) -> Dimensions {
        if accepted == self.capture_preset() {
            return self.dimensions();
        }
        accepted.dimensions().unwrap_or(native)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityPreset::Standard => "standard",
            QualityPreset::High => "high",
            QualityPreset::Ultra => "ultra",
            QualityPreset::Max => "max",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "720p" => Ok(QualityPreset::Standard),
            "high" | "1080p" => Ok(QualityPreset::High),
            "ultra" | "1440p" => Ok(QualityPreset::Ultra),
            "max" | "4k" | "2160p" => Ok(QualityPreset::Max),
            other => Err(format!(
                "Unknown quality: {other}. Use: standard, high, ultra, max"
            )),
        }
    }
}

/// A device capture preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePreset {
    Hd720,
    Hd1080,
    Uhd2160,
    /// The device's own high quality mode, with no fixed dimensions.
    High,
}

impl CapturePreset {
    /// Fixed capture dimensions, or `None` for the generic preset.
    pub fn dimensions(self) -> Option<Dimensions> {
        match self {
            CapturePreset::Hd720 => Some(Dimensions::new(1280, 720)),
            CapturePreset::Hd1080 => Some(Dimensions::new(1920, 1080)),
            CapturePreset::Uhd2160 => Some(Dimensions::new(3840, 2160)),
            CapturePreset::High => None,
        }
    }

    /// Presets to try, in order, when `self` is requested.
    ///
    /// The ladder is requested, 1080p, 720p, generic. Rungs larger than the
    /// request are skipped so a fallback never asks for more pixels.
    pub fn fallback_ladder(self) -> Vec<CapturePreset> {
        let mut ladder = vec![self];
        let ceiling = self.dimensions().map(|d| d.height).unwrap_or(0);
        for rung in [CapturePreset::Hd1080, CapturePreset::Hd720] {
            let Some(dims) = rung.dimensions() else {
                continue;
            };
            if dims.height < ceiling && !ladder.contains(&rung) {
                ladder.push(rung);
            }
        }
        if !ladder.contains(&CapturePreset::High) {
            ladder.push(CapturePreset::High);
        }
        ladder
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CapturePreset::Hd720 => "720p",
            CapturePreset::Hd1080 => "1080p",
            CapturePreset::Uhd2160 => "2160p",
            CapturePreset::High => "high",
        }
    }
}

impl fmt::Display for CapturePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
