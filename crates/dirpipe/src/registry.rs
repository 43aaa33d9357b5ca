//! Thread-safe registry of tracked files.
//!
//! A single mutex guards the file map, every file's mutable fields, the
//! running-job counter and the session generation. Status transitions and
//! slot accounting therefore always happen in the same critical section.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::events::MonitorEvent;
use crate::file::{FileStatus, TrackedFile};
use crate::pipeline::JobOutcome;
use crate::{Error, Result};

/// A file the scheduler has just moved into `Running`.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub created: DateTime<Utc>,
    /// Session generation the slot was acquired under.
    pub generation: u64,
}

#[derive(Default)]
struct RegistryInner {
    root: Option<PathBuf>,
    /// Insertion-ordered records; never removed individually.
    files: Vec<TrackedFile>,
    index: HashMap<PathBuf, usize>,
    running: usize,
    generation: u64,
}

impl RegistryInner {
    fn get(&self, path: &Path) -> Option<&TrackedFile> {
        let i = *self.index.get(path)?;
        self.files.get(i)
    }

    fn get_mut(&mut self, path: &Path) -> Option<&mut TrackedFile> {
        let i = *self.index.get(path)?;
        self.files.get_mut(i)
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        self.root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .or_else(|| path.file_name().map(PathBuf::from))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

fn transition(file: &mut TrackedFile, next: FileStatus) -> Result<FileStatus> {
    let old = file.status;
    if !old.can_transition_to(next) {
        return Err(Error::invalid_transition(old, next));
    }
    file.status = next;
    Ok(old)
}

/// Registry of every file observed during the current monitoring session.
pub struct FileRegistry {
    inner: Mutex<RegistryInner>,
    /// Display names of the configured operations, in pipeline order.
    operation_names: Vec<String>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl FileRegistry {
    pub fn new<I, S>(operation_names: I, event_capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Mutex::new(RegistryInner::default()),
            operation_names: operation_names.into_iter().map(Into::into).collect(),
            event_tx,
        }
    }

    /// Subscribe to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    pub fn operation_names(&self) -> &[String] {
        &self.operation_names
    }

    /// Begin a new session rooted at `root`, discarding anything left over.
    /// Returns the new session generation.
    pub fn start_session(&self, root: impl Into<PathBuf>) -> u64 {
        let mut inner = self.inner.lock();
        inner.files.clear();
        inner.index.clear();
        inner.running = 0;
        inner.generation += 1;
        inner.root = Some(root.into());
        inner.generation
    }

    /// Drop every tracked file, reset the running counter and invalidate the
    /// current generation so late job updates are ignored.
    pub fn clear(&self) -> u64 {
        let mut inner = self.inner.lock();
        let dropped = inner.files.len();
        let running = inner.running;
        inner.files.clear();
        inner.index.clear();
        inner.running = 0;
        inner.generation += 1;
        inner.root = None;
        info!(dropped, running, "Cleared file registry");
        inner.generation
    }

    /// Record a newly observed regular file.
    ///
    /// Fails with [`Error::Inactive`] between [`clear`](Self::clear) and the
    /// next [`start_session`](Self::start_session).
    pub fn register_created(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.root.is_none() {
            return Err(Error::Inactive(path.to_path_buf()));
        }
        if inner.index.contains_key(path) {
            return Err(Error::DuplicateCreation(path.to_path_buf()));
        }

        let relative_path = inner.relative_path(path);
        let file = TrackedFile::new(
            path.to_path_buf(),
            relative_path.clone(),
            self.operation_names.iter().cloned(),
        );
        debug!(path = %path.display(), "New file created");
        self.emit(MonitorEvent::FileCreated {
            path: path.to_path_buf(),
            relative_path,
            timestamp: file.created,
        });

        let i = inner.files.len();
        inner.files.push(file);
        inner.index.insert(path.to_path_buf(), i);
        Ok(())
    }

    /// Record that a file has been fully written.
    pub fn mark_saved(&self, path: &Path) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.root.is_none() {
            return Err(Error::Inactive(path.to_path_buf()));
        }
        let Some(file) = inner.get_mut(path) else {
            return Err(Error::SavedBeforeCreated(path.to_path_buf()));
        };
        if file.status != FileStatus::Created {
            return Err(Error::DuplicateSave(path.to_path_buf()));
        }

        let old = transition(file, FileStatus::Saved)?;
        debug!(path = %path.display(), "File has been saved");
        self.emit(MonitorEvent::FileStatusChanged {
            path: path.to_path_buf(),
            old_status: old,
            new_status: FileStatus::Saved,
        });
        Ok(())
    }

    /// Apply a validated status transition outside of the running slot.
    ///
    /// Edges into or out of `Running` are rejected: only [`admit`](Self::admit)
    /// and [`finish`](Self::finish) move a file through a slot, so the running
    /// counter and single-job ownership stay consistent. Returns the previous
    /// status.
    pub fn set_status(
        &self,
        path: &Path,
        status: FileStatus,
        error: Option<String>,
    ) -> Result<FileStatus> {
        let mut inner = self.inner.lock();
        let file = inner
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))?;

        if file.status == FileStatus::Running || status == FileStatus::Running {
            return Err(Error::invalid_transition(file.status, status));
        }
        let old = transition(file, status)?;
        if error.is_some() {
            file.error = error;
        }
        if status.is_terminal() {
            file.finished = Some(Utc::now());
        }

        self.emit(MonitorEvent::FileStatusChanged {
            path: path.to_path_buf(),
            old_status: old,
            new_status: status,
        });
        Ok(old)
    }

    /// One admission pass.
    ///
    /// Walks the files in insertion order. Each `Saved` or `Queued` file is
    /// moved to `Running` while fewer than `cap` files are running; the rest
    /// are marked `Queued`.
    pub fn admit(&self, cap: usize) -> Vec<Admission> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let generation = inner.generation;
        let mut admitted = Vec::new();

        for file in inner.files.iter_mut() {
            match file.status {
                FileStatus::Created => {
                    trace!(path = %file.path.display(), "Waiting for file to be saved");
                }
                status if status.is_eligible() => {
                    let old = status;
                    if inner.running < cap {
                        file.status = FileStatus::Running;
                        inner.running += 1;
                        info!(
                            path = %file.path.display(),
                            running = inner.running,
                            "Launching job"
                        );
                        self.emit(MonitorEvent::FileStatusChanged {
                            path: file.path.clone(),
                            old_status: old,
                            new_status: FileStatus::Running,
                        });
                        admitted.push(Admission {
                            path: file.path.clone(),
                            relative_path: file.relative_path.clone(),
                            created: file.created,
                            generation,
                        });
                    } else if old == FileStatus::Saved {
                        file.status = FileStatus::Queued;
                        debug!(path = %file.path.display(), "Queued for future processing");
                        self.emit(MonitorEvent::FileStatusChanged {
                            path: file.path.clone(),
                            old_status: old,
                            new_status: FileStatus::Queued,
                        });
                    }
                }
                _ => {}
            }
        }

        admitted
    }

    /// Record progress for one operation of a running file.
    ///
    /// Returns `false` when the update belongs to a previous session or the
    /// file is no longer running.
    pub fn update_progress(
        &self,
        generation: u64,
        path: &Path,
        operation_index: usize,
        percent: f32,
        text: &str,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            trace!(path = %path.display(), "Dropping progress from a previous session");
            return false;
        }
        let Some(file) = inner.get_mut(path) else {
            return false;
        };
        if file.status != FileStatus::Running {
            return false;
        }
        let Some(entry) = file.operations.get_mut(&operation_index) else {
            return false;
        };

        entry.percent = percent;
        entry.text = text.to_string();
        self.emit(MonitorEvent::OperationProgress {
            path: path.to_path_buf(),
            operation_index,
            percent,
            text: text.to_string(),
        });
        true
    }

    /// Store metadata written by a successful operation.
    pub fn commit_metadata(
        &self,
        generation: u64,
        path: &Path,
        operation_index: usize,
        metadata: Map<String, Value>,
    ) -> bool {
        if metadata.is_empty() {
            return true;
        }
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        let Some(file) = inner.get_mut(path) else {
            return false;
        };
        file.metadata
            .entry(operation_index)
            .or_default()
            .extend(metadata);
        true
    }

    /// Finalize a running file and release its slot.
    ///
    /// Returns `false` (and changes nothing) for completions from a previous
    /// session; the counter was already reset when that session ended.
    pub fn finish(&self, generation: u64, path: &Path, outcome: &JobOutcome) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.generation != generation {
            debug!(path = %path.display(), "Dropping completion from a previous session");
            return false;
        }
        let Some(&i) = inner.index.get(path) else {
            return false;
        };
        let file = &mut inner.files[i];
        if file.status != FileStatus::Running {
            warn!(
                path = %path.display(),
                status = %file.status,
                "Completion for a file that is not running"
            );
            return false;
        }

        let new_status = if outcome.is_success() {
            FileStatus::Success
        } else {
            FileStatus::Fail
        };
        file.status = new_status;
        file.finished = Some(Utc::now());
        file.error = outcome.error();
        if let Some(entry) = outcome
            .failed_operation()
            .and_then(|index| file.operations.get_mut(&index))
        {
            entry.error = outcome.error();
        }
        inner.running = inner.running.saturating_sub(1);

        self.emit(MonitorEvent::FileStatusChanged {
            path: path.to_path_buf(),
            old_status: FileStatus::Running,
            new_status,
        });
        self.emit(MonitorEvent::FileCompleted {
            path: path.to_path_buf(),
            outcome: outcome.kind(),
            error: outcome.error(),
        });
        true
    }

    /// Owned, insertion-ordered copy of every tracked file.
    pub fn snapshot(&self) -> Vec<TrackedFile> {
        self.inner.lock().files.clone()
    }

    pub fn get(&self, path: &Path) -> Option<TrackedFile> {
        self.inner.lock().get(path).cloned()
    }

    pub fn status_of(&self, path: &Path) -> Option<FileStatus> {
        self.inner.lock().get(path).map(|f| f.status)
    }

    pub fn running_count(&self) -> usize {
        self.inner.lock().running
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.inner.lock().root.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().files.is_empty()
    }
}
