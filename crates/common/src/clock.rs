//! Clock and timing utilities for stream synchronization.
//!
//! Every capture device stamps samples on its own monotonic media clock.
//! A recording session is zero-based at the first accepted sample (its
//! [`SessionOrigin`]), and the wall-clock instant of that sample is kept
//! so the skew between two sources can be measured after the fact.

use std::time::Instant;

use chrono::{DateTime, Utc};

/// A monotonic media clock reporting nanoseconds since an epoch.
///
/// `offset_ns` shifts the reported value, which lets independent devices
/// run on clocks that do not start at zero.
#[derive(Debug, Clone)]
pub struct MediaClock {
    epoch: Instant,
    offset_ns: u64,
}

impl MediaClock {
    /// Create a clock anchored to now.
    pub fn start() -> Self {
        Self::with_offset(0)
    }

    pub fn with_offset(offset_ns: u64) -> Self {
        Self {
            epoch: Instant::now(),
            offset_ns,
        }
    }

    /// Current media time in nanoseconds.
    pub fn now_ns(&self) -> u64 {
        self.offset_ns + self.epoch.elapsed().as_nanos() as u64
    }

    /// Convert a nanosecond value to seconds.
    pub fn ns_to_secs(ns: u64) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs * 1_000_000_000.0) as u64
    }
}

/// The moment a recording session began, on both clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOrigin {
    /// Presentation timestamp of the first accepted sample.
    pub media_pts_ns: u64,
    /// Wall-clock instant that sample was accepted.
    pub wall_clock: DateTime<Utc>,
}

impl SessionOrigin {
    pub fn new(media_pts_ns: u64, wall_clock: DateTime<Utc>) -> Self {
        Self {
            media_pts_ns,
            wall_clock,
        }
    }

    /// Session-relative time of `pts_ns`, or `None` if it precedes the origin.
    pub fn session_time_ns(&self, pts_ns: u64) -> Option<u64> {
        pts_ns.checked_sub(self.media_pts_ns)
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: i64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: i64,
}

impl DriftMeasurement {
    /// Skew between two wall-clock origins.
    pub fn between(reference: &DateTime<Utc>, measured: &DateTime<Utc>) -> Self {
        Self {
            reference_ns: reference.timestamp_nanos_opt().unwrap_or(i64::MAX),
            measured_ns: measured.timestamp_nanos_opt().unwrap_or(i64::MAX),
        }
    }

    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns.saturating_sub(self.reference_ns)
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}
