//! Dualcap Session Model
//!
//! Defines the data contracts shared by the capture and render crates:
//! - **Media:** capture sources, modalities, and sample kinds
//! - **Quality:** named recording tiers and the capture preset ladder
//! - **Overlay:** picture-in-picture corner, size policy, and margin
//! - **Timing:** media time ranges and the sync window between two recordings
//! - **Artifacts:** session folder layout and finalized recording files
//! - **Status:** recorder lifecycle status shown to callers
//!
//! Times are expressed in seconds on each recording's own media timeline.
//! Two recordings only share a timeline after a [`SyncWindow`] is computed.

pub mod artifact;
pub mod media;
pub mod overlay;
pub mod quality;
pub mod status;
pub mod timing;

pub use artifact::*;
pub use media::*;
pub use overlay::*;
pub use quality::*;
pub use status::*;
pub use timing::*;
