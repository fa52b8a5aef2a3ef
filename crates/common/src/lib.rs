//! Dualcap Common Utilities
//!
//! Shared infrastructure for all Dualcap crates:
//! - Error taxonomy for capture, coordination, merge and export
//! - Media clocks, session origins and origin skew measurement
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
