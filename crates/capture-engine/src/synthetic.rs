//! A software capture device.
//!
//! Produces I420 frames and S16LE audio blocks on its own [`MediaClock`],
//! so two synthetic devices behave like two independently clocked pieces
//! of hardware. Which presets it accepts, and whether it is authorized or
//! present at all, are configurable.

use std::time::Duration;

use async_trait::async_trait;
use dualcap_common::clock::MediaClock;
use dualcap_common::error::CaptureError;
use dualcap_session_model::{CapturePreset, Dimensions, SourceKind};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::device::{CaptureDevice, DeviceFormat, NegotiatedFormat, SampleOutlet};
use crate::sample::Sample;

const AUDIO_BLOCK: Duration = Duration::from_millis(20);

pub struct SyntheticDevice {
    kind: SourceKind,
    accepted: Vec<CapturePreset>,
    native: Dimensions,
    authorized: bool,
    available: bool,
    clock_offset: Duration,
    acquire_delay: Duration,
    configure_calls: Vec<CapturePreset>,
    streaming: Option<Streaming>,
}

struct Streaming {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SyntheticDevice {
    /// A screen that accepts every preset.
    pub fn screen() -> Self {
        Self::new(
            SourceKind::Screen,
            vec![
                CapturePreset::Uhd2160,
                CapturePreset::Hd1080,
                CapturePreset::Hd720,
                CapturePreset::High,
            ],
        )
    }

    /// A camera that tops out at 1080p.
    pub fn camera() -> Self {
        Self::new(
            SourceKind::Camera,
            vec![CapturePreset::Hd1080, CapturePreset::Hd720, CapturePreset::High],
        )
    }

    fn new(kind: SourceKind, accepted: Vec<CapturePreset>) -> Self {
        Self {
            kind,
            accepted,
            native: Dimensions::new(1280, 720),
            authorized: true,
            available: true,
            clock_offset: Duration::ZERO,
            acquire_delay: Duration::ZERO,
            configure_calls: Vec::new(),
            streaming: None,
        }
    }

    pub fn accepting(mut self, presets: &[CapturePreset]) -> Self {
        self.accepted = presets.to_vec();
        self
    }

    /// Frame size reported for the generic preset.
    pub fn with_native(mut self, native: Dimensions) -> Self {
        self.native = native;
        self
    }

    pub fn unauthorized(mut self) -> Self {
        self.authorized = false;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Start this device's media clock at `offset` instead of zero.
    pub fn with_clock_offset(mut self, offset: Duration) -> Self {
        self.clock_offset = offset;
        self
    }

    /// Take `delay` to open, like hardware that is slow to wake up.
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Presets passed to `configure`, in call order.
    pub fn configure_calls(&self) -> &[CapturePreset] {
        &self.configure_calls
    }
}

#[async_trait]
impl CaptureDevice for SyntheticDevice {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> String {
        format!("synthetic {}", self.kind)
    }

    async fn acquire(&mut self) -> Result<(), CaptureError> {
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }
        if !self.authorized {
            return Err(CaptureError::PermissionDenied {
                modality: self.kind.modality(),
            });
        }
        if !self.available {
            return Err(CaptureError::device_unavailable(format!(
                "synthetic {} is disconnected",
                self.kind
            )));
        }
        Ok(())
    }

    async fn configure(&mut self, preset: CapturePreset) -> Result<DeviceFormat, CaptureError> {
        self.configure_calls.push(preset);
        if !self.accepted.contains(&preset) {
            return Err(CaptureError::unsupported(
                preset,
                format!("synthetic {} cannot open {preset}", self.kind),
            ));
        }
        Ok(DeviceFormat {
            native: preset.dimensions().unwrap_or(self.native),
        })
    }

    async fn start_streaming(
        &mut self,
        format: &NegotiatedFormat,
        outlet: SampleOutlet,
    ) -> Result<(), CaptureError> {
        if self.streaming.is_some() {
            return Err(CaptureError::device_unavailable(format!(
                "synthetic {} is already streaming",
                self.kind
            )));
        }

        let clock = MediaClock::with_offset(self.clock_offset.as_nanos() as u64);
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(produce(*format, clock, outlet, stop_rx));
        self.streaming = Some(Streaming { stop, task });
        tracing::debug!(kind = %self.kind, dimensions = %format.dimensions, "Synthetic device streaming");
        Ok(())
    }

    async fn stop_streaming(&mut self) {
        if let Some(streaming) = self.streaming.take() {
            streaming.stop.send(()).ok();
            streaming.task.await.ok();
        }
    }
}

async fn produce(
    format: NegotiatedFormat,
    clock: MediaClock,
    outlet: SampleOutlet,
    mut stop: oneshot::Receiver<()>,
) {
    let frame_duration = Duration::from_nanos(format.frame_duration_ns());
    let mut video_tick = tokio::time::interval(frame_duration);
    let mut audio_tick = tokio::time::interval(AUDIO_BLOCK);
    let audio = format.audio.filter(|_| outlet.wants_audio());
    let audio_block_bytes = audio
        .map(|a| (a.byte_rate() * AUDIO_BLOCK.as_millis() as u64 / 1000) as usize)
        .unwrap_or(0);
    let mut frame_index: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = video_tick.tick() => {
                let frame = synthetic_frame(&format, frame_index);
                frame_index += 1;
                outlet.deliver(Sample::video(clock.now_ns(), format.frame_duration_ns(), frame));
            }
            _ = audio_tick.tick(), if audio.is_some() => {
                outlet.deliver(Sample::audio(
                    clock.now_ns(),
                    AUDIO_BLOCK.as_nanos() as u64,
                    vec![0; audio_block_bytes],
                ));
            }
        }
    }
}

/// A flat I420 frame whose brightness cycles with the frame index.
fn synthetic_frame(format: &NegotiatedFormat, index: u64) -> Vec<u8> {
    let luma_len = (format.dimensions.width * format.dimensions.height) as usize;
    let mut frame = vec![128u8; format.frame_bytes()];
    let level = 16 + (index % 220) as u8;
    frame[..luma_len].fill(level);
    frame
}
