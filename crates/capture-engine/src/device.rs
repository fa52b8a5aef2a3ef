//! Capture device abstraction and preset negotiation.
//!
//! A device is an asynchronous sample producer. It pushes samples into a
//! [`SampleOutlet`], which fans them into one bounded queue per modality so
//! a stalled audio consumer never blocks video and vice versa. A full queue
//! drops the sample on the spot.

use std::sync::Arc;

use async_trait::async_trait;
use dualcap_common::error::CaptureError;
use dualcap_session_model::{CapturePreset, Dimensions, QualityPreset, SampleKind, SourceKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::sample::Sample;
use crate::sink::MediaSink;

/// Raw audio layout delivered by devices and accepted by writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

impl AudioFormat {
    /// Bytes per second of interleaved S16LE.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * 2
    }
}

/// What a device reports for a preset it accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    /// Frame size the device delivers before any scaling.
    pub native: Dimensions,
}

/// The settled capture configuration for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedFormat {
    pub preset: CapturePreset,
    /// Frame size delivered to the writer.
    pub dimensions: Dimensions,
    pub fps: u32,
    pub audio: Option<AudioFormat>,
    /// The device refused the requested preset and a lower rung was used.
    pub downgraded: bool,
}

impl NegotiatedFormat {
    pub fn frame_duration_ns(&self) -> u64 {
        1_000_000_000 / self.fps.max(1) as u64
    }

    /// Size of one I420 frame at these dimensions.
    pub fn frame_bytes(&self) -> usize {
        let w = self.dimensions.width as usize;
        let h = self.dimensions.height as usize;
        w * h + 2 * (w.div_ceil(2) * h.div_ceil(2))
    }
}

/// A hardware (or synthetic) capture device.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn name(&self) -> String;

    /// Claim the device. Fails with `PermissionDenied` or `DeviceUnavailable`.
    async fn acquire(&mut self) -> Result<(), CaptureError>;

    /// Try to open one capture preset.
    ///
    /// Refusal is `SessionConfigUnsupported`, which the caller answers by
    /// trying the next rung of the fallback ladder.
    async fn configure(&mut self, preset: CapturePreset) -> Result<DeviceFormat, CaptureError>;

    /// Begin delivering samples in `format` into `outlet`.
    async fn start_streaming(
        &mut self,
        format: &NegotiatedFormat,
        outlet: SampleOutlet,
    ) -> Result<(), CaptureError>;

    /// Tear down capture immediately. Samples already queued stay queued.
    async fn stop_streaming(&mut self);
}

/// Walk the preset ladder until the device accepts one.
///
/// Any error other than `SessionConfigUnsupported` aborts the walk. The
/// returned format records output dimensions for the accepted preset.
pub async fn negotiate_format(
    device: &mut dyn CaptureDevice,
    quality: QualityPreset,
    fps: u32,
    audio: Option<AudioFormat>,
) -> Result<NegotiatedFormat, CaptureError> {
    let requested = quality.capture_preset();
    let mut last_refusal = None;

    for preset in requested.fallback_ladder() {
        match device.configure(preset).await {
            Ok(device_format) => {
                let dimensions = quality
                    .output_dimensions(preset, device_format.native)
                    .even();
                let downgraded = preset != requested;
                if downgraded {
                    tracing::warn!(
                        device = %device.name(),
                        requested = %requested,
                        accepted = %preset,
                        %dimensions,
                        "Capture preset downgraded"
                    );
                } else {
                    tracing::debug!(device = %device.name(), preset = %preset, %dimensions, "Capture preset accepted");
                }
                return Ok(NegotiatedFormat {
                    preset,
                    dimensions,
                    fps,
                    audio,
                    downgraded,
                });
            }
            Err(e @ CaptureError::SessionConfigUnsupported { .. }) => {
                tracing::debug!(device = %device.name(), preset = %preset, error = %e, "Preset refused");
                last_refusal = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_refusal.unwrap_or_else(|| {
        CaptureError::unsupported(requested, "device accepted no capture preset")
    }))
}

/// Per-modality ingress queues between a device and its sink.
#[derive(Clone)]
pub struct SampleOutlet {
    video: mpsc::Sender<Sample>,
    audio: Option<mpsc::Sender<Sample>>,
    sink: Arc<MediaSink>,
}

impl SampleOutlet {
    pub fn new(
        video: mpsc::Sender<Sample>,
        audio: Option<mpsc::Sender<Sample>>,
        sink: Arc<MediaSink>,
    ) -> Self {
        Self { video, audio, sink }
    }

    pub fn wants_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Hand a sample to its queue without waiting.
    ///
    /// Returns false if the sample was dropped. Safe to call from any thread,
    /// including GStreamer streaming threads.
    pub fn deliver(&self, sample: Sample) -> bool {
        let kind = sample.kind;
        let queue = match kind {
            SampleKind::Video => &self.video,
            SampleKind::Audio => match &self.audio {
                Some(queue) => queue,
                None => return false,
            },
        };
        match queue.try_send(sample) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.sink.record_queue_drop(kind);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i420_frame_size() {
        let format = NegotiatedFormat {
            preset: CapturePreset::Hd720,
            dimensions: Dimensions::new(1280, 720),
            fps: 30,
            audio: None,
            downgraded: false,
        };
        assert_eq!(format.frame_bytes(), 1280 * 720 * 3 / 2);
        assert_eq!(format.frame_duration_ns(), 33_333_333);
    }

    #[test]
    fn audio_byte_rate() {
        assert_eq!(AudioFormat::default().byte_rate(), 192_000);
    }
}
