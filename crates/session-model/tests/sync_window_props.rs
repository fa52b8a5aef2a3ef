use dualcap_session_model::{SyncWindow, TimeRange};
use proptest::prelude::*;

fn range() -> impl Strategy<Value = TimeRange> {
    (0.0f64..600.0, 0.0f64..600.0).prop_map(|(start, len)| TimeRange::from_start_duration(start, len))
}

proptest! {
    #[test]
    fn window_is_max_of_starts_to_min_of_ends(screen in range(), camera in range()) {
        let start = screen.start_secs.max(camera.start_secs);
        let end = screen.end_secs.min(camera.end_secs);

        match SyncWindow::compute(&screen, &camera) {
            Some(window) => {
                prop_assert!(end > start);
                prop_assert_eq!(window.range.start_secs, start);
                prop_assert_eq!(window.range.end_secs, end);
                prop_assert!(window.screen_offset_secs >= 0.0);
                prop_assert!(window.camera_offset_secs >= 0.0);
                prop_assert!(window.screen_offset_secs + window.duration_secs() <= screen.duration_secs() + 1e-9);
                prop_assert!(window.camera_offset_secs + window.duration_secs() <= camera.duration_secs() + 1e-9);
            }
            None => prop_assert!(end <= start),
        }
    }

    #[test]
    fn window_is_symmetric(a in range(), b in range()) {
        let ab = SyncWindow::compute(&a, &b).map(|w| w.range);
        let ba = SyncWindow::compute(&b, &a).map(|w| w.range);
        prop_assert_eq!(ab, ba);
    }
}

#[test]
fn camera_started_late_and_stopped_early() {
    let window = SyncWindow::compute(&TimeRange::new(0.0, 10.0), &TimeRange::new(1.0, 9.0))
        .expect("ranges overlap");
    assert_eq!(window.range, TimeRange::new(1.0, 9.0));
    assert_eq!(window.duration_secs(), 8.0);
}
