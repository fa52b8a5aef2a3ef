//! Check system capabilities.

use dualcap_capture_engine::pipeline::{element_available, init_gstreamer};
use dualcap_capture_engine::{PermissionProbe, SystemPermissions};
use dualcap_render_engine::command_exists;
use dualcap_session_model::Modality;

const WRITER_ELEMENTS: &[&str] = &["appsrc", "x264enc", "avenc_aac", "qtmux", "filesink"];
const DEVICE_ELEMENTS: &[&str] = &["appsink", "videoconvert", "videoscale", "autoaudiosrc"];

pub async fn run() -> anyhow::Result<()> {
    println!("Dualcap System Check");
    println!("{}", "=".repeat(50));

    let mut required_ok = true;

    match init_gstreamer() {
        Ok(()) => {
            println!("[OK] GStreamer initialized");
            for element in WRITER_ELEMENTS.iter().chain(DEVICE_ELEMENTS) {
                if element_available(element) {
                    println!("[OK] GStreamer element: {element}");
                } else {
                    println!("[MISSING] GStreamer element: {element}");
                    required_ok = false;
                }
            }
        }
        Err(e) => {
            println!("[MISSING] GStreamer: {e}");
            required_ok = false;
        }
    }

    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else {
            println!("[MISSING] {binary} (needed for merge and audio export)");
            required_ok = false;
        }
    }

    println!();
    let permissions = SystemPermissions;
    for modality in [Modality::Screen, Modality::Camera, Modality::Microphone] {
        let status = permissions.check(modality).await;
        let tag = if status.is_granted() { "OK" } else { "WARN" };
        println!("[{tag}] {modality}: {status}");
        if modality == Modality::Screen && !status.is_granted() {
            required_ok = false;
        }
    }

    #[cfg(target_os = "linux")]
    match dualcap_capture_engine::gst_device::detect_default_webcam_device() {
        Some(device) => println!("[OK] Default webcam: {device}"),
        None => println!("[WARN] No webcam detected; use `record --no-camera`"),
    }

    println!();
    if required_ok {
        println!("All required capabilities are available. Dualcap is ready.");
    } else {
        println!("Some required capabilities are missing. See above.");
    }
    Ok(())
}
