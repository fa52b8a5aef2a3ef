//! Merge a screen and a camera recording.

use std::path::PathBuf;

use dualcap_common::config::ExportDefaults;
use dualcap_render_engine::{Compositor, ExportSettings, MergeRequest};
use dualcap_session_model::{ArtifactKind, OverlaySpec};

use super::progress_printer;

pub async fn run(
    screen: PathBuf,
    camera: PathBuf,
    output: Option<PathBuf>,
    overlay: OverlaySpec,
    export: &ExportDefaults,
) -> anyhow::Result<()> {
    let output = output
        .unwrap_or_else(|| screen.with_file_name(ArtifactKind::MergedVideo.session_file_name()));

    println!("Merging recordings");
    println!("  Screen: {}", screen.display());
    println!("  Camera: {}", camera.display());
    println!("  Output: {}", output.display());
    println!("  Overlay: {} {} (margin {}px)", overlay.position, overlay.size_policy, overlay.margin);
    println!("  Quality: {}", export.quality);

    let compositor = Compositor::ffmpeg(ExportSettings::from(export));
    let request = MergeRequest::new(screen.clone(), camera.clone(), output, overlay);
    match compositor.merge(&request, Some(progress_printer("Merging"))).await {
        Ok(path) => {
            eprintln!();
            println!("Merge complete: {}", path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!();
            tracing::error!(error = %e, "Merge failed");
            anyhow::bail!(
                "Merge failed: {e}. The individual recordings are still at {} and {}",
                screen.display(),
                camera.display()
            )
        }
    }
}
