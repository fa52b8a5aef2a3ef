//! Time-stamped media samples flowing from devices to sinks.

use dualcap_session_model::SampleKind;

/// One unit of captured media.
///
/// Video samples carry one raw I420 frame. Audio samples carry interleaved
/// S16LE PCM. `pts_ns` is on the producing device's monotonic media clock.
#[derive(Debug, Clone)]
pub struct Sample {
    pub kind: SampleKind,
    pub pts_ns: u64,
    pub duration_ns: u64,
    pub data: Vec<u8>,
}

impl Sample {
    pub fn video(pts_ns: u64, duration_ns: u64, data: Vec<u8>) -> Self {
        Self {
            kind: SampleKind::Video,
            pts_ns,
            duration_ns,
            data,
        }
    }

    pub fn audio(pts_ns: u64, duration_ns: u64, data: Vec<u8>) -> Self {
        Self {
            kind: SampleKind::Audio,
            pts_ns,
            duration_ns,
            data,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == SampleKind::Video
    }
}
