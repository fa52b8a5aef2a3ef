//! Shared GStreamer pipeline plumbing.
//!
//! Both the capture devices (appsink side) and the container writers
//! (appsrc side) are built from launch strings and torn down the same way:
//! drive to PLAYING, and on shutdown push EOS and drain the bus so muxers
//! can finalize their output.

use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;

/// How long to wait for EOS to propagate through a pipeline on shutdown.
pub const EOS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Initialize GStreamer once per process.
pub fn init_gstreamer() -> Result<(), String> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    GST_INIT
        .get_or_init(|| gst::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(|e| format!("Failed to initialize GStreamer: {e}"))
}

/// Whether an element factory is installed.
pub fn element_available(factory: &str) -> bool {
    init_gstreamer().is_ok() && gst::ElementFactory::find(factory).is_some()
}

/// Parse a launch string into a pipeline.
pub fn launch_pipeline(launch: &str) -> Result<gst::Pipeline, String> {
    init_gstreamer()?;

    let element =
        gst::parse::launch(launch).map_err(|e| format!("Failed to build pipeline: {e}"))?;

    element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| "Launch string did not produce a pipeline".to_string())
}

/// Set a pipeline PLAYING and wait for the state change to settle.
pub fn start_pipeline(name: &str, pipeline: &gst::Pipeline, timeout: Duration) -> Result<(), String> {
    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| format!("Failed to start {name} pipeline: {e:?}"))?;

    // Live sources report NoPreroll; anything else must actually reach PLAYING
    // before the caller relies on the source being open.
    let wait = pipeline.state(gst::ClockTime::from_nseconds(timeout.as_nanos() as u64));
    match wait {
        (Ok(gst::StateChangeSuccess::NoPreroll), _, _) => Ok(()),
        (Ok(_), gst::State::Playing, _) => Ok(()),
        (Ok(_), state, _) => {
            tracing::warn!(
                pipeline = %name,
                ?state,
                "Pipeline did not reach Playing state within timeout"
            );
            Ok(())
        }
        (Err(e), _, _) => {
            pipeline.set_state(gst::State::Null).ok();
            Err(format!("{name} pipeline failed to reach Playing state: {e:?}"))
        }
    }
}

/// Wait for EOS on the pipeline bus.
///
/// Returns the first error message posted while draining, if any.
pub fn drain_eos(name: &str, pipeline: &gst::Pipeline, deadline: Duration) -> Result<(), String> {
    let Some(bus) = pipeline.bus() else {
        return Ok(());
    };

    let start = Instant::now();
    loop {
        let timeout = {
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                tracing::warn!(pipeline = %name, "EOS drain timed out after {:?}", deadline);
                return Err(format!("{name} pipeline did not drain within {deadline:?}"));
            }
            gst::ClockTime::from_nseconds((deadline - elapsed).as_nanos() as u64)
        };
        match bus.timed_pop(timeout) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(_) => {
                    tracing::debug!(pipeline = %name, "EOS received; pipeline drained");
                    return Ok(());
                }
                gst::MessageView::Error(e) => {
                    tracing::warn!(
                        pipeline = %name,
                        error = %e.error(),
                        "Pipeline error during EOS drain"
                    );
                    return Err(e.error().to_string());
                }
                _ => {}
            },
            None => {
                tracing::warn!(pipeline = %name, "EOS drain timed out after {:?}", deadline);
                return Err(format!("{name} pipeline did not drain within {deadline:?}"));
            }
        }
    }
}

/// First error already posted on the bus, without blocking.
pub fn pending_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(msg) = bus.pop() {
        if let gst::MessageView::Error(e) = msg.view() {
            return Some(e.error().to_string());
        }
    }
    None
}

pub fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_path_quotes() {
        assert_eq!(
            escape_path(Path::new("/tmp/a \"b\".mov")),
            "/tmp/a \\\"b\\\".mov"
        );
    }
}
