mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dualcap_capture_engine::{
    AudioFormat, CaptureCoordinator, CaptureSource, CoordinatorConfig, PermissionStatus,
    SyntheticDevice,
};
use dualcap_common::error::{CaptureError, CoordinatorError};
use dualcap_session_model::{ArtifactLayout, Dimensions, Modality, QualityPreset, RecorderStatus};

use common::{MemoryWriterFactory, StaticPermissions};

struct Rig {
    coordinator: CaptureCoordinator,
    writers: MemoryWriterFactory,
}

fn config(root: &Path, quality: QualityPreset) -> CoordinatorConfig {
    CoordinatorConfig {
        recordings_dir: root.to_path_buf(),
        quality,
        screen_fps: 30,
        camera_fps: 30,
        audio: AudioFormat::default(),
        camera_audio: false,
        session_folders: true,
    }
}

fn rig(
    config: CoordinatorConfig,
    permissions: StaticPermissions,
    screen: SyntheticDevice,
    camera: SyntheticDevice,
) -> Rig {
    let writers = MemoryWriterFactory::default();
    let factory = Arc::new(writers.clone());
    let coordinator = CaptureCoordinator::new(
        config,
        Arc::new(permissions),
        CaptureSource::new(Box::new(screen), factory.clone()),
        CaptureSource::new(Box::new(camera), factory),
    );
    Rig {
        coordinator,
        writers,
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn records_screen_and_camera_into_one_session_folder() {
    let root = tempfile::tempdir().unwrap();
    let mut rig = rig(
        config(root.path(), QualityPreset::High),
        StaticPermissions::granted(),
        SyntheticDevice::screen().with_clock_offset(Duration::from_secs(10)),
        SyntheticDevice::camera().with_clock_offset(Duration::from_secs(3)),
    );

    let layout = rig.coordinator.start_all(true, true).await.unwrap();
    assert!(layout.is_session());
    assert!(rig.coordinator.is_recording());
    assert!(matches!(
        rig.coordinator.status(),
        RecorderStatus::Recording { camera: true, .. }
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let artifacts = rig.coordinator.stop_all().await.unwrap();
    assert!(!rig.coordinator.is_recording());

    let camera = artifacts.camera.as_ref().expect("camera artifact");
    assert_eq!(artifacts.screen.path, layout.dir().join("screen_record.mov"));
    assert_eq!(camera.path, layout.dir().join("person_video.mov"));
    assert!(artifacts.screen.path.exists());
    assert!(camera.path.exists());
    assert!(artifacts.screen.started_at.is_some());
    assert!(camera.started_at.is_some());

    let folder = layout.dir().file_name().unwrap().to_string_lossy().into_owned();
    assert!(folder.starts_with("Recording_"));
    assert_eq!(entries(root.path()), vec![folder]);

    // Mic goes to the screen file only unless camera audio is enabled.
    let screen_log = rig.writers.log(&artifacts.screen.path).unwrap();
    let camera_log = rig.writers.log(&camera.path).unwrap();
    assert!(screen_log.format.unwrap().audio.is_some());
    assert!(camera_log.format.unwrap().audio.is_none());
    assert_eq!(camera_log.format.unwrap().dimensions, Dimensions::new(1920, 1080));
}

#[tokio::test]
async fn camera_disabled_records_screen_only() {
    let root = tempfile::tempdir().unwrap();
    let mut rig = rig(
        config(root.path(), QualityPreset::Standard),
        StaticPermissions::granted().with(Modality::Camera, PermissionStatus::Denied),
        SyntheticDevice::screen(),
        SyntheticDevice::camera(),
    );

    let layout = rig.coordinator.start_all(false, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let artifacts = rig.coordinator.stop_all().await.unwrap();

    assert!(artifacts.camera.is_none());
    assert_eq!(entries(layout.dir()), vec!["screen_record.mov".to_string()]);
    assert_eq!(rig.writers.paths().len(), 1);

    let status = rig.coordinator.status();
    assert_eq!(
        status,
        RecorderStatus::Stopped {
            screen: artifacts.screen.path.clone(),
            camera: None,
        }
    );
    assert!(status.to_string().starts_with("Saved to "));
}

#[tokio::test]
async fn denied_camera_permission_aborts_before_anything_starts() {
    let root = tempfile::tempdir().unwrap();
    let mut rig = rig(
        config(root.path(), QualityPreset::High),
        StaticPermissions::granted().with(Modality::Camera, PermissionStatus::Denied),
        SyntheticDevice::screen(),
        SyntheticDevice::camera(),
    );

    let err = rig.coordinator.start_all(true, true).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Capture(CaptureError::PermissionDenied {
            modality: Modality::Camera
        })
    ));
    assert!(!rig.coordinator.is_recording());
    assert!(entries(root.path()).is_empty());
    assert!(rig.writers.paths().is_empty());
    assert!(matches!(rig.coordinator.status(), RecorderStatus::Failed { .. }));
}

#[tokio::test]
async fn missing_screen_session_reports_unavailable() {
    let root = tempfile::tempdir().unwrap();
    let mut rig = rig(
        config(root.path(), QualityPreset::High),
        StaticPermissions::granted().with(
            Modality::Screen,
            PermissionStatus::Unavailable {
                reason: "no graphical session".into(),
            },
        ),
        SyntheticDevice::screen(),
        SyntheticDevice::camera(),
    );

    let err = rig.coordinator.start_all(false, false).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Capture(CaptureError::DeviceUnavailable { .. })
    ));
}

#[tokio::test]
async fn failing_camera_stops_the_screen_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let mut rig = rig(
        config(root.path(), QualityPreset::High),
        StaticPermissions::granted(),
        SyntheticDevice::screen(),
        SyntheticDevice::camera().unavailable(),
    );

    let err = rig.coordinator.start_all(true, true).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Capture(CaptureError::DeviceUnavailable { .. })
    ));
    assert!(!rig.coordinator.is_recording());
    assert!(entries(root.path()).is_empty());

    // The screen source was released, so a screen-only recording works.
    rig.coordinator.start_all(false, false).await.unwrap();
    let artifacts = rig.coordinator.stop_all().await.unwrap();
    assert!(artifacts.screen.path.exists());
}

#[tokio::test]
async fn start_twice_and_stop_idle_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let mut rig = rig(
        config(root.path(), QualityPreset::Standard),
        StaticPermissions::granted(),
        SyntheticDevice::screen(),
        SyntheticDevice::camera(),
    );

    assert!(matches!(
        rig.coordinator.stop_all().await,
        Err(CoordinatorError::NotRecording)
    ));

    rig.coordinator.start_all(false, false).await.unwrap();
    assert!(matches!(
        rig.coordinator.start_all(false, false).await,
        Err(CoordinatorError::AlreadyRecording)
    ));
    rig.coordinator.stop_all().await.unwrap();
    assert!(matches!(
        rig.coordinator.stop_all().await,
        Err(CoordinatorError::NotRecording)
    ));
}

#[tokio::test]
async fn flat_naming_when_session_folders_are_off() {
    let root = tempfile::tempdir().unwrap();
    let mut cfg = config(root.path(), QualityPreset::Standard);
    cfg.session_folders = false;
    let mut rig = rig(
        cfg,
        StaticPermissions::granted(),
        SyntheticDevice::screen(),
        SyntheticDevice::camera(),
    );

    let layout = rig.coordinator.start_all(true, false).await.unwrap();
    assert!(matches!(layout, ArtifactLayout::Flat { .. }));
    let artifacts = rig.coordinator.stop_all().await.unwrap();

    let screen = artifacts.screen.path.file_name().unwrap().to_string_lossy().into_owned();
    let camera = artifacts.camera.unwrap().path;
    assert!(screen.starts_with("screen_recording_"));
    assert!(camera
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("camera_recording_"));
    assert_eq!(artifacts.screen.path.parent(), Some(root.path()));
}

#[tokio::test]
async fn status_channel_sees_the_lifecycle() {
    let root = tempfile::tempdir().unwrap();
    let mut rig = rig(
        config(root.path(), QualityPreset::Standard),
        StaticPermissions::granted(),
        SyntheticDevice::screen(),
        SyntheticDevice::camera(),
    );
    let mut status = rig.coordinator.subscribe();
    assert_eq!(*status.borrow_and_update(), RecorderStatus::Idle);

    rig.coordinator.start_all(false, true).await.unwrap();
    assert!(status.has_changed().unwrap());
    assert!(status.borrow_and_update().is_recording());

    rig.coordinator.stop_all().await.unwrap();
    assert!(matches!(
        *status.borrow_and_update(),
        RecorderStatus::Stopped { camera: None, .. }
    ));
}

#[tokio::test]
async fn screen_and_camera_start_concurrently() {
    let root = tempfile::tempdir().unwrap();
    let delay = Duration::from_millis(400);
    let mut rig = rig(
        config(root.path(), QualityPreset::Standard),
        StaticPermissions::granted(),
        SyntheticDevice::screen().with_acquire_delay(delay),
        SyntheticDevice::camera().with_acquire_delay(delay),
    );

    let started = std::time::Instant::now();
    rig.coordinator.start_all(true, false).await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= delay);
    assert!(elapsed < delay * 2, "sources started one after the other: {elapsed:?}");

    rig.coordinator.stop_all().await.unwrap();
}
