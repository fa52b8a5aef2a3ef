//! Show stream information for recordings.

use std::path::PathBuf;

use dualcap_render_engine::{FfprobeInspector, MediaInspector};
use dualcap_session_model::SyncWindow;

pub async fn run(paths: Vec<PathBuf>, json: bool) -> anyhow::Result<()> {
    let inspector = FfprobeInspector::default();
    let mut infos = Vec::with_capacity(paths.len());
    for path in &paths {
        infos.push(inspector.inspect(path).await?);
    }

    let window = match infos.as_slice() {
        [screen, camera] => SyncWindow::compute(&screen.video.range, &camera.video.range),
        _ => None,
    };

    if json {
        let files: Vec<serde_json::Value> = infos
            .iter()
            .map(|info| {
                serde_json::json!({
                    "path": info.path,
                    "video": {
                        "range": info.video.range,
                        "width": info.video.dimensions.width,
                        "height": info.video.dimensions.height,
                    },
                    "audio": info.audio.as_ref().map(|a| serde_json::json!({
                        "range": a.range,
                        "codec": a.codec,
                    })),
                })
            })
            .collect();
        let report = serde_json::json!({ "files": files, "sync_window": window });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for info in &infos {
        println!("{}", info.path.display());
        println!(
            "  Video: {} [{:.3}s .. {:.3}s] ({:.2}s)",
            info.video.dimensions,
            info.video.range.start_secs,
            info.video.range.end_secs,
            info.video.range.duration_secs()
        );
        match &info.audio {
            Some(audio) => println!(
                "  Audio: {} [{:.3}s .. {:.3}s]",
                audio.codec, audio.range.start_secs, audio.range.end_secs
            ),
            None => println!("  Audio: none"),
        }
    }

    if infos.len() == 2 {
        println!();
        match window {
            Some(w) => println!(
                "Sync window: [{:.3}s .. {:.3}s] ({:.2}s); screen offset {:.3}s, camera offset {:.3}s",
                w.range.start_secs,
                w.range.end_secs,
                w.duration_secs(),
                w.screen_offset_secs,
                w.camera_offset_secs
            ),
            None => println!("Sync window: none (recordings do not overlap)"),
        }
    }
    Ok(())
}
