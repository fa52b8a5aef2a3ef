//! Picture-in-picture overlay configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Screen corner the camera overlay is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

impl OverlayCorner {
    pub const ALL: [OverlayCorner; 4] = [
        OverlayCorner::TopLeft,
        OverlayCorner::TopRight,
        OverlayCorner::BottomLeft,
        OverlayCorner::BottomRight,
    ];

    pub fn is_left(self) -> bool {
        matches!(self, OverlayCorner::TopLeft | OverlayCorner::BottomLeft)
    }

    pub fn is_top(self) -> bool {
        matches!(self, OverlayCorner::TopLeft | OverlayCorner::TopRight)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverlayCorner::TopLeft => "top-left",
            OverlayCorner::TopRight => "top-right",
            OverlayCorner::BottomLeft => "bottom-left",
            OverlayCorner::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for OverlayCorner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlayCorner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" | "tl" => Ok(OverlayCorner::TopLeft),
            "top-right" | "tr" => Ok(OverlayCorner::TopRight),
            "bottom-left" | "bl" => Ok(OverlayCorner::BottomLeft),
            "bottom-right" | "br" => Ok(OverlayCorner::BottomRight),
            other => Err(format!(
                "Unknown corner: {other}. Use: top-left, top-right, bottom-left, bottom-right"
            )),
        }
    }
}

/// How the overlay height is derived from its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizePolicy {
    /// Keep the camera's native aspect ratio.
    #[default]
    Auto,
    Square,
    FourByThree,
    SixteenByNine,
}

impl SizePolicy {
    pub const ALL: [SizePolicy; 4] = [
        SizePolicy::Auto,
        SizePolicy::Square,
        SizePolicy::FourByThree,
        SizePolicy::SixteenByNine,
    ];

    /// Height as a multiple of width, or `None` under `Auto`.
    pub fn fixed_height_ratio(self) -> Option<f64> {
        match self {
            SizePolicy::Auto => None,
            SizePolicy::Square => Some(1.0),
            SizePolicy::FourByThree => Some(3.0 / 4.0),
            SizePolicy::SixteenByNine => Some(9.0 / 16.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SizePolicy::Auto => "auto",
            SizePolicy::Square => "1:1",
            SizePolicy::FourByThree => "4:3",
            SizePolicy::SixteenByNine => "16:9",
        }
    }
}

impl fmt::Display for SizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SizePolicy::Auto),
            "1:1" | "square" => Ok(SizePolicy::Square),
            "4:3" => Ok(SizePolicy::FourByThree),
            "16:9" => Ok(SizePolicy::SixteenByNine),
            other => Err(format!("Unknown size: {other}. Use: auto, 1:1, 4:3, 16:9")),
        }
    }
}

pub const DEFAULT_OVERLAY_MARGIN: u32 = 20;

/// Overlay placement, resolved once per merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlaySpec {
    pub position: OverlayCorner,
    pub size_policy: SizePolicy,
    /// Inset from both screen edges, in pixels.
    pub margin: u32,
}

impl Default for OverlaySpec {
    fn default() -> Self {
        Self {
            position: OverlayCorner::default(),
            size_policy: SizePolicy::default(),
            margin: DEFAULT_OVERLAY_MARGIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_overlay_is_bottom_right_auto() {
        let spec = OverlaySpec::default();
        assert_eq!(spec.position, OverlayCorner::BottomRight);
        assert_eq!(spec.size_policy, SizePolicy::Auto);
        assert_eq!(spec.margin, 20);
    }

    #[test]
    fn fixed_ratios() {
        assert_eq!(SizePolicy::Auto.fixed_height_ratio(), None);
        assert_eq!(SizePolicy::FourByThree.fixed_height_ratio(), Some(0.75));
        assert_eq!(SizePolicy::SixteenByNine.fixed_height_ratio(), Some(0.5625));
    }

    #[test]
    fn corners_parse_with_either_separator() {
        assert_eq!(
            "top_left".parse::<OverlayCorner>().unwrap(),
            OverlayCorner::TopLeft
        );
        assert_eq!("BR".parse::<OverlayCorner>().unwrap(), OverlayCorner::BottomRight);
        assert!("middle".parse::<OverlayCorner>().is_err());
    }

    #[test]
    fn overlay_spec_serializes_snake_case() {
        let spec = OverlaySpec {
            position: OverlayCorner::TopRight,
            size_policy: SizePolicy::FourByThree,
            margin: 12,
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"top_right\""));
        assert!(json.contains("\"four_by_three\""));
        let back: OverlaySpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
