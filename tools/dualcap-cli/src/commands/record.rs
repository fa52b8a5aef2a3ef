//! Record screen and camera until Ctrl+C, then finalize the session.

use std::sync::Arc;

use dualcap_capture_engine::{
    CaptureCoordinator, CaptureDevice, CaptureSource, CoordinatorConfig, GrantAllPermissions,
    GstCaptureDevice, GstWriterFactory, PermissionProbe, SyntheticDevice, SystemPermissions,
    WriterFactory,
};
use dualcap_common::config::AppConfig;
use dualcap_render_engine::{
    finalize_session, AudioTrackExtractor, Compositor, ExportSettings, SessionReport,
};

pub async fn run(config: AppConfig, synthetic: bool, finalize: bool) -> anyhow::Result<()> {
    let rec = &config.recording;
    println!("Starting recording");
    println!("  Output: {}", config.recordings_dir.display());
    println!("  Quality: {}", rec.quality);
    println!("  Camera: {}", rec.camera_enabled);
    println!("  Mic: {}", rec.mic_enabled);
    if rec.camera_enabled {
        println!("  Overlay: {} {} (margin {}px)", config.overlay.position, config.overlay.size_policy, config.overlay.margin);
    }
    if synthetic {
        println!("  Sources: synthetic");
    }
    println!();

    let (screen, camera, permissions): (Box<dyn CaptureDevice>, Box<dyn CaptureDevice>, Arc<dyn PermissionProbe>) =
        if synthetic {
            (
                Box::new(SyntheticDevice::screen()),
                Box::new(SyntheticDevice::camera()),
                Arc::new(GrantAllPermissions),
            )
        } else {
            (
                Box::new(GstCaptureDevice::screen()),
                Box::new(GstCaptureDevice::camera()),
                Arc::new(SystemPermissions),
            )
        };
    let writers: Arc<dyn WriterFactory> = Arc::new(GstWriterFactory);

    let mut coordinator = CaptureCoordinator::new(
        CoordinatorConfig::from(&config),
        permissions,
        CaptureSource::new(screen, writers.clone()),
        CaptureSource::new(camera, writers),
    );

    let mut status = coordinator.subscribe();
    let status_printer = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            println!("[{}]", current);
        }
    });

    if let Err(e) = coordinator
        .start_all(rec.camera_enabled, rec.mic_enabled)
        .await
    {
        status_printer.abort();
        anyhow::bail!("{}", SessionReport::failed(e.to_string()).status_message);
    }

    println!("Press Ctrl+C to stop recording...");
    tokio::signal::ctrl_c().await?;
    println!();

    let artifacts = match coordinator.stop_all().await {
        Ok(artifacts) => artifacts,
        Err(e) => {
            status_printer.abort();
            anyhow::bail!("{}", SessionReport::failed(e.to_string()).status_message);
        }
    };
    drop(coordinator);
    status_printer.await.ok();

    for artifact in std::iter::once(&artifacts.screen).chain(artifacts.camera.as_ref()) {
        println!(
            "  {}: {} ({} samples, {:.1}% dropped)",
            artifact.kind,
            artifact.path.display(),
            artifact.stats.appended(),
            artifact.stats.drop_rate() * 100.0
        );
    }

    if !finalize {
        println!("Saved to {}", artifacts.layout.dir().display());
        return Ok(());
    }

    println!();
    println!("Finalizing...");
    let compositor = Compositor::ffmpeg(ExportSettings::from(&config.export));
    let extractor = AudioTrackExtractor::ffmpeg(config.export.audio_bitrate_kbps);
    let report = finalize_session(&compositor, &extractor, &artifacts, config.overlay).await;
    tracing::info!(
        outcome = %report.outcome,
        dir = %artifacts.layout.dir().display(),
        "Session finalized"
    );

    if let Some(audio) = &report.audio {
        println!("  Audio: {}", audio.display());
    }
    if let Some(merged) = &report.merged {
        println!("  Merged: {}", merged.display());
    }
    println!("{}", report.status_message);
    Ok(())
}
