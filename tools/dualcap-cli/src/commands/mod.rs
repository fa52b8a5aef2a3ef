pub mod check;
pub mod extract_audio;
pub mod info;
pub mod merge;
pub mod record;

use dualcap_render_engine::{ExportProgress, ProgressCallback};

/// Prints a single updating progress line.
pub fn progress_printer(label: &'static str) -> ProgressCallback {
    Box::new(move |p: ExportProgress| {
        eprint!(
            "\r  {label}: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.progress * 100.0,
            p.frames_rendered,
            p.total_frames,
            p.eta_secs,
        );
    })
}
