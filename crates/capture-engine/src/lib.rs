//! Dualcap Capture Engine
//!
//! Records the screen and a camera as two independent, independently
//! clocked sessions, each written to its own movie file in real time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   CaptureCoordinator                     │
//! │   permissions ─► session folder ─► concurrent start      │
//! │  ┌────────────────────────┐  ┌────────────────────────┐  │
//! │  │  CaptureSource(screen) │  │  CaptureSource(camera) │  │
//! │  │  device ─► queues      │  │  device ─► queues      │  │
//! │  │     ─► MediaSink       │  │     ─► MediaSink       │  │
//! │  │     ─► SampleWriter    │  │     ─► SampleWriter    │  │
//! │  └───────────┬────────────┘  └───────────┬────────────┘  │
//! │              ▼                           ▼               │
//! │      screen_record.mov            person_video.mov       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here aligns the two files; that happens after the fact in the
//! render engine, from the files' own time ranges.

pub mod coordinator;
pub mod device;
pub mod gst_device;
pub mod permissions;
pub mod pipeline;
pub mod sample;
pub mod sink;
pub mod source;
pub mod synthetic;
pub mod writer;

pub use coordinator::{CaptureCoordinator, CoordinatorConfig};
pub use device::{AudioFormat, CaptureDevice, DeviceFormat, NegotiatedFormat, SampleOutlet};
pub use gst_device::GstCaptureDevice;
pub use permissions::{GrantAllPermissions, PermissionProbe, PermissionStatus, SystemPermissions};
pub use sample::Sample;
pub use sink::{MediaSink, PushOutcome};
pub use source::{CaptureSource, SourceConfig};
pub use synthetic::SyntheticDevice;
pub use writer::{GstSampleWriter, GstWriterFactory, SampleWriter, WriterFactory};
