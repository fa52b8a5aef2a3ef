//! The per-source media sink.
//!
//! A [`MediaSink`] sits between the ingress queues and a [`SampleWriter`].
//! The first sample to arrive, video or audio, fixes the session origin and
//! opens the writer's session at that timestamp. The check and the assignment
//! happen under one lock, so concurrently delivered video and audio samples
//! can never both believe they are first.
//!
//! After the origin is set, samples are appended only when the writer input
//! for their kind reports ready. Everything else is dropped and counted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dualcap_common::clock::SessionOrigin;
use dualcap_common::error::CaptureError;
use dualcap_session_model::{ArtifactKind, RecordingArtifact, SampleKind, SinkStats};
use parking_lot::Mutex;

use crate::sample::Sample;
use crate::writer::SampleWriter;

/// What happened to a pushed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Appended,
    /// Writer input was not ready.
    DroppedNotReady,
    /// Timestamp precedes the session origin.
    DroppedBeforeOrigin,
    /// The writer failed earlier; nothing more is accepted.
    Rejected,
}

pub struct MediaSink {
    writer: Arc<dyn SampleWriter>,
    path: PathBuf,
    origin: Mutex<Option<SessionOrigin>>,
    stats: Mutex<SinkStats>,
    failure: Mutex<Option<String>>,
}

impl MediaSink {
    pub fn new(writer: Arc<dyn SampleWriter>) -> Self {
        let path = writer.path().to_path_buf();
        Self {
            writer,
            path,
            origin: Mutex::new(None),
            stats: Mutex::new(SinkStats::default()),
            failure: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> Option<SessionOrigin> {
        *self.origin.lock()
    }

    pub fn stats(&self) -> SinkStats {
        *self.stats.lock()
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Count a sample lost because its ingress queue was full.
    pub fn record_queue_drop(&self, kind: SampleKind) {
        self.stats.lock().dropped_queue_full += 1;
        tracing::trace!(path = %self.path.display(), %kind, "Ingress queue full; sample dropped");
    }

    pub fn push(&self, sample: Sample) -> PushOutcome {
        if self.failure.lock().is_some() {
            return PushOutcome::Rejected;
        }

        let origin = match self.establish_origin(sample.pts_ns) {
            Ok(origin) => origin,
            Err(e) => {
                self.fail(e.to_string());
                return PushOutcome::Rejected;
            }
        };

        if origin.session_time_ns(sample.pts_ns).is_none() {
            self.stats.lock().dropped_before_origin += 1;
            tracing::debug!(
                path = %self.path.display(),
                kind = %sample.kind,
                pts_ns = sample.pts_ns,
                origin_ns = origin.media_pts_ns,
                "Sample precedes session origin; dropped"
            );
            return PushOutcome::DroppedBeforeOrigin;
        }

        let kind = sample.kind;
        if !self.writer.is_ready(kind) {
            self.stats.lock().dropped_not_ready += 1;
            tracing::debug!(path = %self.path.display(), %kind, "Writer not ready; sample dropped");
            return PushOutcome::DroppedNotReady;
        }

        match self.writer.append(sample) {
            Ok(()) => {
                let mut stats = self.stats.lock();
                match kind {
                    SampleKind::Video => stats.video_samples_appended += 1,
                    SampleKind::Audio => stats.audio_samples_appended += 1,
                }
                PushOutcome::Appended
            }
            Err(e) => {
                self.fail(e.to_string());
                PushOutcome::Rejected
            }
        }
    }

    /// Compare-and-set of the session origin.
    ///
    /// The writer session is started while the lock is held, so no sample
    /// can reach `append` before `start_session` has returned.
    fn establish_origin(&self, pts_ns: u64) -> Result<SessionOrigin, CaptureError> {
        let mut origin = self.origin.lock();
        if let Some(existing) = *origin {
            return Ok(existing);
        }

        let established = SessionOrigin::new(pts_ns, Utc::now());
        self.writer.start_session(&established)?;
        *origin = Some(established);
        tracing::info!(
            path = %self.path.display(),
            media_pts_ns = pts_ns,
            wall_clock = %established.wall_clock.to_rfc3339(),
            "Session origin established"
        );
        Ok(established)
    }

    fn fail(&self, message: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            tracing::error!(path = %self.path.display(), error = %message, "Writer failed; rejecting further samples");
            *failure = Some(message);
        }
    }

    /// Close the writer and describe the finished artifact. Blocks.
    ///
    /// A writer failure recorded while samples were flowing surfaces here
    /// as `WriterFinalizeFailed`.
    pub fn finalize(&self, kind: ArtifactKind) -> Result<RecordingArtifact, CaptureError> {
        let finished = self.writer.finish();
        let stats = self.stats();

        tracing::info!(
            path = %self.path.display(),
            appended = stats.appended(),
            dropped_not_ready = stats.dropped_not_ready,
            dropped_queue_full = stats.dropped_queue_full,
            dropped_before_origin = stats.dropped_before_origin,
            drop_rate = %format!("{:.2}%", stats.drop_rate() * 100.0),
            "Sink finalized"
        );

        if let Some(message) = self.failure() {
            return Err(CaptureError::writer_finalize(&self.path, message));
        }
        finished?;

        Ok(RecordingArtifact {
            kind,
            path: self.path.clone(),
            started_at: self.origin().map(|o| o.wall_clock),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeWriter {
        sessions: Mutex<Vec<u64>>,
        appended: Mutex<Vec<(SampleKind, u64)>>,
        audio_busy: AtomicBool,
        fail_appends: AtomicBool,
    }

    impl SampleWriter for FakeWriter {
        fn path(&self) -> &Path {
            Path::new("/tmp/fake.mov")
        }

        fn start_session(&self, origin: &SessionOrigin) -> Result<(), CaptureError> {
            self.sessions.lock().push(origin.media_pts_ns);
            Ok(())
        }

        fn is_ready(&self, kind: SampleKind) -> bool {
            !(kind == SampleKind::Audio && self.audio_busy.load(Ordering::SeqCst))
        }

        fn append(&self, sample: Sample) -> Result<(), CaptureError> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(CaptureError::writer_finalize("/tmp/fake.mov", "disk full"));
            }
            self.appended.lock().push((sample.kind, sample.pts_ns));
            Ok(())
        }

        fn finish(&self) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    #[test]
    fn first_sample_sets_origin_once() {
        let writer = Arc::new(FakeWriter::default());
        let sink = MediaSink::new(writer.clone());

        assert_eq!(sink.push(Sample::audio(500, 10, vec![0; 4])), PushOutcome::Appended);
        assert_eq!(sink.push(Sample::video(700, 10, vec![0; 4])), PushOutcome::Appended);

        assert_eq!(*writer.sessions.lock(), vec![500]);
        assert_eq!(sink.origin().map(|o| o.media_pts_ns), Some(500));
    }

    #[test]
    fn late_stamped_sample_is_dropped() {
        let writer = Arc::new(FakeWriter::default());
        let sink = MediaSink::new(writer.clone());

        sink.push(Sample::video(1_000, 10, vec![]));
        assert_eq!(
            sink.push(Sample::audio(999, 10, vec![])),
            PushOutcome::DroppedBeforeOrigin
        );
        assert_eq!(writer.appended.lock().len(), 1);
        assert_eq!(sink.stats().dropped_before_origin, 1);
    }

    #[test]
    fn not_ready_input_drops_without_retry() {
        let writer = Arc::new(FakeWriter::default());
        writer.audio_busy.store(true, Ordering::SeqCst);
        let sink = MediaSink::new(writer.clone());

        sink.push(Sample::video(0, 10, vec![]));
        assert_eq!(sink.push(Sample::audio(5, 10, vec![])), PushOutcome::DroppedNotReady);
        writer.audio_busy.store(false, Ordering::SeqCst);
        sink.push(Sample::audio(15, 10, vec![]));

        let appended = writer.appended.lock().clone();
        assert_eq!(appended, vec![(SampleKind::Video, 0), (SampleKind::Audio, 15)]);
        assert_eq!(sink.stats().dropped_not_ready, 1);
    }

    #[test]
    fn append_failure_surfaces_at_finalize() {
        let writer = Arc::new(FakeWriter::default());
        writer.fail_appends.store(true, Ordering::SeqCst);
        let sink = MediaSink::new(writer);

        assert_eq!(sink.push(Sample::video(0, 10, vec![])), PushOutcome::Rejected);
        assert_eq!(sink.push(Sample::video(10, 10, vec![])), PushOutcome::Rejected);

        let err = sink.finalize(ArtifactKind::ScreenVideo).unwrap_err();
        assert!(matches!(err, CaptureError::WriterFinalizeFailed { .. }));
    }

    #[test]
    fn empty_sink_finalizes_without_origin() {
        let sink = MediaSink::new(Arc::new(FakeWriter::default()));
        let artifact = sink.finalize(ArtifactKind::CameraVideo).unwrap();
        assert_eq!(artifact.started_at, None);
        assert_eq!(artifact.stats.appended(), 0);
    }

    #[test]
    fn concurrent_first_samples_start_one_session() {
        for _ in 0..50 {
            let writer = Arc::new(FakeWriter::default());
            let sink = Arc::new(MediaSink::new(writer.clone()));
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let handles: Vec<_> = [SampleKind::Video, SampleKind::Audio]
                .into_iter()
                .map(|kind| {
                    let sink = sink.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        let sample = match kind {
                            SampleKind::Video => Sample::video(100, 1, vec![]),
                            SampleKind::Audio => Sample::audio(100, 1, vec![]),
                        };
                        sink.push(sample)
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), PushOutcome::Appended);
            }
            assert_eq!(writer.sessions.lock().len(), 1);
        }
    }
}
