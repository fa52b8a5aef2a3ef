//! Export the audio track of a recording.

use std::path::PathBuf;

use dualcap_render_engine::AudioTrackExtractor;
use dualcap_session_model::ArtifactKind;

use super::progress_printer;

pub async fn run(source: PathBuf, output: Option<PathBuf>, bitrate_kbps: u32) -> anyhow::Result<()> {
    let target = output
        .unwrap_or_else(|| source.with_file_name(ArtifactKind::SessionAudio.session_file_name()));

    let extractor = AudioTrackExtractor::ffmpeg(bitrate_kbps);
    let result = extractor
        .extract(&source, &target, Some(progress_printer("Exporting audio")))
        .await;
    eprintln!();

    match result? {
        Some(path) => println!("Audio saved to {}", path.display()),
        None => println!("{} has no audio track; nothing exported", source.display()),
    }
    Ok(())
}
