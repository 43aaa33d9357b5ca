//! Per-operation views handed to [`Operation::run`](super::Operation::run).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use crate::file::format_percent;
use crate::registry::{Admission, FileRegistry};

/// The file an operation is working on.
#[derive(Debug)]
pub struct JobFile {
    path: PathBuf,
    relative_path: PathBuf,
    created: DateTime<Utc>,
    operation_index: usize,
    /// Staged metadata, committed to the registry only on success.
    metadata: Mutex<Map<String, Value>>,
}

impl JobFile {
    pub fn new(
        path: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
        operation_index: usize,
    ) -> Self {
        Self {
            path: path.into(),
            relative_path: relative_path.into(),
            created: Utc::now(),
            operation_index,
            metadata: Mutex::new(Map::new()),
        }
    }

    pub(crate) fn from_admission(admission: &Admission, operation_index: usize) -> Self {
        Self {
            path: admission.path.clone(),
            relative_path: admission.relative_path.clone(),
            created: admission.created,
            operation_index,
            metadata: Mutex::new(Map::new()),
        }
    }

    /// Absolute path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the monitored directory.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Pipeline index of the operation this view was built for.
    pub fn operation_index(&self) -> usize {
        self.operation_index
    }

    /// Stage a metadata entry under this operation's pipeline index.
    pub fn insert_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.lock().insert(key.into(), value.into());
    }

    /// Metadata staged so far.
    pub fn metadata(&self) -> Map<String, Value> {
        self.metadata.lock().clone()
    }

    pub(crate) fn take_metadata(&self) -> Map<String, Value> {
        std::mem::take(&mut *self.metadata.lock())
    }
}

struct SinkTarget {
    registry: Arc<FileRegistry>,
    generation: u64,
    path: PathBuf,
}

/// Progress channel for one operation of one job.
///
/// Percentages are clamped to `0..=100` and never go backwards.
pub struct ProgressSink {
    target: Option<SinkTarget>,
    operation_index: usize,
    last: Mutex<Option<f32>>,
}

impl ProgressSink {
    pub(crate) fn new(
        registry: Arc<FileRegistry>,
        generation: u64,
        path: impl Into<PathBuf>,
        operation_index: usize,
    ) -> Self {
        Self {
            target: Some(SinkTarget {
                registry,
                generation,
                path: path.into(),
            }),
            operation_index,
            last: Mutex::new(None),
        }
    }

    /// A sink that is not attached to any registry.
    pub fn detached(operation_index: usize) -> Self {
        Self {
            target: None,
            operation_index,
            last: Mutex::new(None),
        }
    }

    pub fn operation_index(&self) -> usize {
        self.operation_index
    }

    /// Last accepted percentage.
    pub fn last(&self) -> Option<f32> {
        *self.last.lock()
    }

    /// Report progress with the default `"42.0 %"` text.
    pub fn report_percent(&self, percent: f32) -> bool {
        let percent = percent.clamp(0.0, 100.0);
        self.report(percent, format_percent(percent))
    }

    /// Report progress. Returns `false` when the update was dropped.
    pub fn report(&self, percent: f32, text: impl Into<String>) -> bool {
        if percent.is_nan() {
            return false;
        }
        let percent = percent.clamp(0.0, 100.0);

        let mut last = self.last.lock();
        if let Some(previous) = *last
            && percent < previous
        {
            trace!(
                operation_index = self.operation_index,
                previous, percent, "Ignoring decreasing progress"
            );
            return false;
        }
        *last = Some(percent);

        match &self.target {
            Some(target) => target.registry.update_progress(
                target.generation,
                &target.path,
                self.operation_index,
                percent,
                &text.into(),
            ),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let sink = ProgressSink::detached(0);
        assert!(sink.report_percent(10.0));
        assert!(sink.report_percent(30.0));
        assert!(!sink.report_percent(20.0));
        assert_eq!(sink.last(), Some(30.0));
        // equal values are allowed, e.g. to update the text
        assert!(sink.report(30.0, "verifying"));
    }

    #[test]
    fn test_progress_is_clamped() {
        let sink = ProgressSink::detached(0);
        assert!(sink.report_percent(-5.0));
        assert_eq!(sink.last(), Some(0.0));
        assert!(sink.report_percent(250.0));
        assert_eq!(sink.last(), Some(100.0));
        assert!(!sink.report(f32::NAN, "nan"));
    }

    #[test]
    fn test_progress_reaches_registry() {
        let registry = Arc::new(FileRegistry::new(["op"], 16));
        let generation = registry.start_session("/watch");
        let path = Path::new("/watch/a");
        registry.register_created(path).unwrap();
        registry.mark_saved(path).unwrap();
        registry.admit(1);

        let sink = ProgressSink::new(registry.clone(), generation, path, 0);
        assert!(sink.report_percent(42.0));
        let file = registry.get(path).unwrap();
        assert_eq!(file.operations[&0].percent, 42.0);
        assert_eq!(file.operations[&0].text, "42.0 %");
    }

    #[test]
    fn test_job_file_metadata() {
        let file = JobFile::new("/watch/a", "a", 1);
        file.insert_metadata("destination", "/backup/a");
        assert_eq!(file.metadata()["destination"], "/backup/a");
        assert_eq!(file.operation_index(), 1);

        let taken = file.take_metadata();
        assert_eq!(taken.len(), 1);
        assert!(file.metadata().is_empty());
    }
}
