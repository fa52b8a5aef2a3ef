//! Dualcap Render Engine
//!
//! Turns the raw screen and camera recordings of a session into final
//! artifacts: a time-aligned picture-in-picture merge and a standalone
//! audio file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! screen_record.mov ──┬── MediaInspector ──┐
//!                     │                    ├── SyncWindow + OverlayLayout
//! person_video.mov ───┼── MediaInspector ──┘            │
//!                     │                                 ▼
//!                     │                      Compositor ─► RenderBackend ─► merged_video.mov
//!                     │
//!                     └── AudioTrackExtractor ─► RenderBackend ─► session_audio.m4a
//! ```

pub mod audio;
pub mod compositor;
pub mod export;
pub mod layout;
pub mod probe;
pub mod session;

pub use audio::AudioTrackExtractor;
pub use compositor::{AudioSource, Compositor, ExportSettings, MergePlan, MergeRequest};
pub use export::*;
pub use layout::{CameraFit, OverlayLayout, PipRect, PixelRect};
pub use probe::{FfprobeInspector, MediaInfo, MediaInspector, ProbeError};
pub use session::{finalize_session, SessionOutcome, SessionReport};
