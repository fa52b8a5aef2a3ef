#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dualcap_capture_engine::{
    NegotiatedFormat, PermissionProbe, PermissionStatus, Sample, SampleWriter, WriterFactory,
};
use dualcap_common::clock::SessionOrigin;
use dualcap_common::error::CaptureError;
use dualcap_session_model::{Modality, SampleKind};
use parking_lot::Mutex;

/// What one in-memory writer saw.
#[derive(Debug, Clone, Default)]
pub struct WriterLog {
    pub format: Option<NegotiatedFormat>,
    pub bitrate_bps: u64,
    pub session_origins: Vec<u64>,
    pub appended: Vec<(SampleKind, u64)>,
    pub finished: bool,
}

/// Writers that record calls instead of encoding.
#[derive(Clone, Default)]
pub struct MemoryWriterFactory {
    logs: Arc<Mutex<HashMap<PathBuf, WriterLog>>>,
}

impl MemoryWriterFactory {
    pub fn log(&self, path: &Path) -> Option<WriterLog> {
        self.logs.lock().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.logs.lock().keys().cloned().collect()
    }
}

impl WriterFactory for MemoryWriterFactory {
    fn open(
        &self,
        path: &Path,
        format: &NegotiatedFormat,
        bitrate_bps: u64,
    ) -> Result<Arc<dyn SampleWriter>, CaptureError> {
        std::fs::write(path, b"").map_err(|e| CaptureError::writer_open(path, e.to_string()))?;
        self.logs.lock().insert(
            path.to_path_buf(),
            WriterLog {
                format: Some(*format),
                bitrate_bps,
                ..WriterLog::default()
            },
        );
        Ok(Arc::new(MemoryWriter {
            path: path.to_path_buf(),
            logs: self.logs.clone(),
        }))
    }
}

struct MemoryWriter {
    path: PathBuf,
    logs: Arc<Mutex<HashMap<PathBuf, WriterLog>>>,
}

impl MemoryWriter {
    fn with_log<T>(&self, f: impl FnOnce(&mut WriterLog) -> T) -> T {
        let mut logs = self.logs.lock();
        f(logs.entry(self.path.clone()).or_default())
    }
}

impl SampleWriter for MemoryWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn start_session(&self, origin: &SessionOrigin) -> Result<(), CaptureError> {
        self.with_log(|log| log.session_origins.push(origin.media_pts_ns));
        Ok(())
    }

    fn is_ready(&self, _kind: SampleKind) -> bool {
        true
    }

    fn append(&self, sample: Sample) -> Result<(), CaptureError> {
        self.with_log(|log| log.appended.push((sample.kind, sample.pts_ns)));
        Ok(())
    }

    fn finish(&self) -> Result<(), CaptureError> {
        self.with_log(|log| log.finished = true);
        std::fs::write(&self.path, b"moov")
            .map_err(|e| CaptureError::writer_finalize(&self.path, e.to_string()))
    }
}

/// Fixed answers per modality; anything unlisted is granted.
#[derive(Default)]
pub struct StaticPermissions {
    answers: HashMap<Modality, PermissionStatus>,
}

impl StaticPermissions {
    pub fn granted() -> Self {
        Self::default()
    }

    pub fn with(mut self, modality: Modality, status: PermissionStatus) -> Self {
        self.answers.insert(modality, status);
        self
    }
}

#[async_trait]
impl PermissionProbe for StaticPermissions {
    async fn check(&self, modality: Modality) -> PermissionStatus {
        self.answers
            .get(&modality)
            .cloned()
            .unwrap_or(PermissionStatus::Granted)
    }
}
