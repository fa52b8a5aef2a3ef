mod common;

use std::sync::Arc;
use std::time::Duration;

use dualcap_capture_engine::device::negotiate_format;
use dualcap_capture_engine::{AudioFormat, CaptureSource, SourceConfig, SyntheticDevice};
use dualcap_common::error::CaptureError;
use dualcap_session_model::{CapturePreset, Dimensions, QualityPreset, SampleKind};

use common::MemoryWriterFactory;

fn config(dir: &std::path::Path, quality: QualityPreset, audio: bool) -> SourceConfig {
    SourceConfig {
        output_path: dir.join("out.mov"),
        quality,
        fps: 30,
        audio: audio.then(AudioFormat::default),
    }
}

#[tokio::test]
async fn stop_without_start_is_a_no_op() {
    let mut source = CaptureSource::new(
        Box::new(SyntheticDevice::screen()),
        Arc::new(MemoryWriterFactory::default()),
    );
    assert!(source.stop().await.unwrap().is_none());
    assert!(source.stop().await.unwrap().is_none());
}

#[tokio::test]
async fn camera_without_4k_falls_back_to_1080p() {
    let dir = tempfile::tempdir().unwrap();
    let writers = MemoryWriterFactory::default();
    let mut source = CaptureSource::new(Box::new(SyntheticDevice::camera()), Arc::new(writers.clone()));

    source
        .start(config(dir.path(), QualityPreset::Max, false))
        .await
        .unwrap();
    let format = source.format().unwrap();
    assert_eq!(format.preset, CapturePreset::Hd1080);
    assert_eq!(format.dimensions, Dimensions::new(1920, 1080));

    let log = writers.log(&dir.path().join("out.mov")).unwrap();
    assert_eq!(log.format.unwrap().dimensions, Dimensions::new(1920, 1080));
    assert_eq!(log.bitrate_bps, 30_000_000);
    source.stop().await.unwrap();
}

#[tokio::test]
async fn ladder_walks_down_to_720p() {
    let mut device = SyntheticDevice::camera().accepting(&[CapturePreset::Hd720]);

    let format = negotiate_format(&mut device, QualityPreset::Max, 30, None)
        .await
        .unwrap();
    assert_eq!(
        device.configure_calls(),
        &[CapturePreset::Uhd2160, CapturePreset::Hd1080, CapturePreset::Hd720]
    );
    assert_eq!(format.preset, CapturePreset::Hd720);
    assert_eq!(format.dimensions, Dimensions::new(1280, 720));
    assert!(format.downgraded);
}

#[tokio::test]
async fn accepted_request_is_not_a_downgrade() {
    let mut device = SyntheticDevice::camera();

    let format = negotiate_format(&mut device, QualityPreset::High, 30, None)
        .await
        .unwrap();
    assert_eq!(device.configure_calls(), &[CapturePreset::Hd1080]);
    assert!(!format.downgraded);
}

#[tokio::test]
async fn camera_accepting_only_720p_records_at_720p() {
    let dir = tempfile::tempdir().unwrap();
    let writers = MemoryWriterFactory::default();
    let device = SyntheticDevice::camera().accepting(&[CapturePreset::Hd720]);
    let mut source = CaptureSource::new(Box::new(device), Arc::new(writers.clone()));

    source
        .start(config(dir.path(), QualityPreset::Max, false))
        .await
        .unwrap();
    let format = source.format().unwrap();
    assert_eq!(format.preset, CapturePreset::Hd720);
    assert!(format.downgraded);

    let log = writers.log(&dir.path().join("out.mov")).unwrap();
    assert_eq!(log.format.unwrap().dimensions, Dimensions::new(1280, 720));
    source.stop().await.unwrap();
}

#[tokio::test]
async fn camera_with_only_generic_preset_uses_native_size() {
    let dir = tempfile::tempdir().unwrap();
    let device = SyntheticDevice::camera()
        .accepting(&[CapturePreset::High])
        .with_native(Dimensions::new(640, 480));
    let mut source = CaptureSource::new(Box::new(device), Arc::new(MemoryWriterFactory::default()));

    source
        .start(config(dir.path(), QualityPreset::Ultra, false))
        .await
        .unwrap();
    let format = source.format().unwrap();
    assert_eq!(format.preset, CapturePreset::High);
    assert_eq!(format.dimensions, Dimensions::new(640, 480));
    source.stop().await.unwrap();
}

#[tokio::test]
async fn device_refusing_every_preset_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let device = SyntheticDevice::camera().accepting(&[]);
    let mut source = CaptureSource::new(Box::new(device), Arc::new(MemoryWriterFactory::default()));

    let err = source
        .start(config(dir.path(), QualityPreset::High, false))
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::SessionConfigUnsupported { .. }));
    assert!(!source.is_active());
    assert!(!dir.path().join("out.mov").exists());
}

#[tokio::test]
async fn streamed_samples_start_at_the_session_origin() {
    let dir = tempfile::tempdir().unwrap();
    let writers = MemoryWriterFactory::default();
    let device = SyntheticDevice::screen().with_clock_offset(Duration::from_secs(42));
    let mut source = CaptureSource::new(Box::new(device), Arc::new(writers.clone()));

    source
        .start(config(dir.path(), QualityPreset::Standard, true))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    let artifact = source.stop().await.unwrap().expect("artifact");

    assert!(artifact.started_at.is_some());
    assert!(artifact.stats.video_samples_appended > 0);
    assert!(artifact.stats.audio_samples_appended > 0);

    let log = writers.log(&artifact.path).unwrap();
    assert!(log.finished);
    assert_eq!(log.session_origins.len(), 1);
    let origin = log.session_origins[0];
    assert!(origin >= 42_000_000_000);
    assert!(log.appended.iter().all(|(_, pts)| *pts >= origin));

    for kind in [SampleKind::Video, SampleKind::Audio] {
        let pts: Vec<u64> = log
            .appended
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, pts)| *pts)
            .collect();
        assert!(pts.windows(2).all(|w| w[0] <= w[1]), "{kind} appended out of order");
    }
}

#[tokio::test]
async fn stop_then_restart_opens_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let writers = MemoryWriterFactory::default();
    let mut source = CaptureSource::new(Box::new(SyntheticDevice::screen()), Arc::new(writers.clone()));

    source
        .start(config(dir.path(), QualityPreset::Standard, false))
        .await
        .unwrap();
    source.stop().await.unwrap();
    assert!(source.stop().await.unwrap().is_none());

    let mut second = config(dir.path(), QualityPreset::Standard, false);
    second.output_path = dir.path().join("second.mov");
    source.start(second).await.unwrap();
    let artifact = source.stop().await.unwrap().unwrap();
    assert_eq!(artifact.path, dir.path().join("second.mov"));
}
