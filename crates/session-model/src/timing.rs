//! Media time ranges and the sync window shared by two recordings.

use serde::{Deserialize, Serialize};

/// A half-open span of media time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TimeRange {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }

    pub fn from_start_duration(start_secs: f64, duration_secs: f64) -> Self {
        Self::new(start_secs, start_secs + duration_secs)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }

    /// The common part of two ranges, or `None` when it is empty or
    /// non-positive.
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start_secs.max(other.start_secs);
        let end = self.end_secs.min(other.end_secs);
        if end > start {
            Some(TimeRange::new(start, end))
        } else {
            None
        }
    }
}

/// Time range common to the screen and camera recordings.
///
/// The offsets locate the window inside each file's own timeline, so an
/// input trimmed at its offset for `range.duration_secs()` lands at zero on
/// the composed timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub range: TimeRange,
    pub screen_offset_secs: f64,
    pub camera_offset_secs: f64,
}

impl SyncWindow {
    pub fn compute(screen: &TimeRange, camera: &TimeRange) -> Option<SyncWindow> {
        let range = screen.intersect(camera)?;
        Some(SyncWindow {
            range,
            screen_offset_secs: range.start_secs - screen.start_secs,
            camera_offset_secs: range.start_secs - camera.start_secs,
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.range.duration_secs()
    }
}
