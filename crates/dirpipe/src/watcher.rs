//! Watches one directory and turns raw notifications into file lifecycle
//! events.
//!
//! The OS watcher runs on notify's own thread and forwards raw events through
//! an unbounded channel. [`WatchTranslator`] owns all translation state and is
//! driven by a single task, so it needs no locking.

use notify::event::{AccessKind, AccessMode, CreateKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::Result;

/// A lifecycle event for a file directly inside the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A new regular file appeared.
    FileAppeared(PathBuf),
    /// No further writes are pending for the file.
    FileWriteComplete(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::FileAppeared(path) | WatchEvent::FileWriteComplete(path) => path,
        }
    }
}

/// Translates raw notify events into [`WatchEvent`]s.
///
/// Write completion comes from close-after-write notifications where the
/// platform reports them, and from a settle-time debounce otherwise. Once a
/// close-after-write has been seen the debounce is no longer used.
#[derive(Debug)]
pub struct WatchTranslator {
    root: PathBuf,
    settle: Duration,
    /// Last create/modify time per file still being written.
    pending: HashMap<PathBuf, Instant>,
    close_supported: bool,
}

impl WatchTranslator {
    pub fn new(root: impl Into<PathBuf>, settle: Duration) -> Self {
        Self {
            root: root.into(),
            settle,
            pending: HashMap::new(),
            close_supported: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether any file is waiting for its settle interval to elapse.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn is_top_level(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path())
    }

    /// Feed one raw event.
    pub fn ingest(&mut self, event: &Event, now: Instant) -> Vec<WatchEvent> {
        let mut out = Vec::new();

        for path in &event.paths {
            if !self.is_top_level(path) {
                trace!(path = %path.display(), "Ignoring event outside the watched directory");
                continue;
            }

            match event.kind {
                EventKind::Create(kind) => {
                    if kind == CreateKind::Folder || path.is_dir() {
                        debug!(path = %path.display(), "Directory not followed");
                    } else if path.is_file() {
                        if !self.close_supported {
                            self.pending.insert(path.clone(), now);
                        }
                        out.push(WatchEvent::FileAppeared(path.clone()));
                    } else {
                        trace!(path = %path.display(), "Created entry vanished or is not a regular file");
                    }
                }
                EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                    if !self.close_supported {
                        debug!("Close-after-write notifications available, debounce disabled");
                        self.close_supported = true;
                    }
                    self.pending.remove(path);
                    out.push(WatchEvent::FileWriteComplete(path.clone()));
                }
                EventKind::Modify(_) => {
                    if let Some(last_seen) = self.pending.get_mut(path) {
                        *last_seen = now;
                    }
                }
                EventKind::Remove(_) => {
                    self.pending.remove(path);
                }
                _ => {}
            }
        }

        if self.close_supported {
            self.pending.clear();
        }
        out
    }

    /// Emit completions for files quiet for at least the settle interval,
    /// oldest first.
    pub fn flush(&mut self, now: Instant) -> Vec<WatchEvent> {
        let mut ready: Vec<(PathBuf, Instant)> = Vec::new();
        self.pending.retain(|path, last_seen| {
            if now.saturating_duration_since(*last_seen) >= self.settle {
                ready.push((path.clone(), *last_seen));
                false
            } else {
                true
            }
        });
        ready.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        ready
            .into_iter()
            .map(|(path, _)| WatchEvent::FileWriteComplete(path))
            .collect()
    }
}

/// Raw notifications forwarded from the OS watcher thread.
pub type RawEvents = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Owns the OS watcher for a single directory. Dropping it stops delivery.
pub struct DirectoryWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Start watching `root` (non-recursively).
    pub fn start(root: &Path) -> Result<(Self, RawEvents)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means the session ended.
            let _ = tx.send(res);
        })?;
        watcher.watch(root, RecursiveMode::NonRecursive)?;
        debug!(root = %root.display(), "Watching directory");

        Ok((
            Self {
                root: root.to_path_buf(),
                _watcher: watcher,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, ModifyKind, RemoveKind};
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    fn create(path: &Path) -> Event {
        Event::new(EventKind::Create(CreateKind::File)).add_path(path.to_path_buf())
    }

    fn modify(path: &Path) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any))).add_path(path.to_path_buf())
    }

    fn close_write(path: &Path) -> Event {
        Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(path.to_path_buf())
    }

    #[test]
    fn test_create_regular_file() {
        let (_dir, root) = setup();
        let file = root.join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let mut translator = WatchTranslator::new(&root, Duration::from_secs(2));
        let events = translator.ingest(&create(&file), Instant::now());
        assert_eq!(events, vec![WatchEvent::FileAppeared(file)]);
        assert!(translator.has_pending());
    }

    #[test]
    fn test_directory_is_not_followed() {
        let (_dir, root) = setup();
        let sub = root.join("sub");
        std::fs::create_dir(&sub).unwrap();

        let mut translator = WatchTranslator::new(&root, Duration::from_secs(2));
        let event = Event::new(EventKind::Create(CreateKind::Folder)).add_path(sub.clone());
        assert!(translator.ingest(&event, Instant::now()).is_empty());

        let nested = sub.join("inner.txt");
        std::fs::write(&nested, "x").unwrap();
        assert!(translator.ingest(&create(&nested), Instant::now()).is_empty());
        assert!(!translator.has_pending());
    }

    #[test]
    fn test_close_after_write_completes_once() {
        let (_dir, root) = setup();
        let file = root.join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let start = Instant::now();
        let mut translator = WatchTranslator::new(&root, Duration::from_millis(100));
        translator.ingest(&create(&file), start);
        let events = translator.ingest(&close_write(&file), start);
        assert_eq!(events, vec![WatchEvent::FileWriteComplete(file.clone())]);

        // the debounce must not fire a second completion
        assert!(translator.flush(start + Duration::from_secs(10)).is_empty());

        // later files rely on close notifications only
        let other = root.join("b.txt");
        std::fs::write(&other, "y").unwrap();
        translator.ingest(&create(&other), start);
        assert!(!translator.has_pending());
    }

    #[test]
    fn test_debounce_waits_for_quiet_period() {
        let (_dir, root) = setup();
        let file = root.join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let settle = Duration::from_millis(500);
        let start = Instant::now();
        let mut translator = WatchTranslator::new(&root, settle);
        translator.ingest(&create(&file), start);

        let later = start + Duration::from_millis(400);
        translator.ingest(&modify(&file), later);
        assert!(translator.flush(start + settle).is_empty());

        let events = translator.flush(later + settle);
        assert_eq!(events, vec![WatchEvent::FileWriteComplete(file)]);
        assert!(!translator.has_pending());
    }

    #[test]
    fn test_flush_orders_by_last_activity() {
        let (_dir, root) = setup();
        let a = root.join("a.txt");
        let b = root.join("b.txt");
        std::fs::write(&a, "x").unwrap();
        std::fs::write(&b, "y").unwrap();

        let start = Instant::now();
        let mut translator = WatchTranslator::new(&root, Duration::from_millis(10));
        translator.ingest(&create(&b), start);
        translator.ingest(&create(&a), start + Duration::from_millis(1));

        let events = translator.flush(start + Duration::from_secs(1));
        assert_eq!(
            events,
            vec![WatchEvent::FileWriteComplete(b), WatchEvent::FileWriteComplete(a)]
        );
    }

    #[test]
    fn test_removed_file_is_forgotten() {
        let (_dir, root) = setup();
        let file = root.join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let start = Instant::now();
        let mut translator = WatchTranslator::new(&root, Duration::from_millis(10));
        translator.ingest(&create(&file), start);
        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(file.clone());
        translator.ingest(&remove, start);
        assert!(translator.flush(start + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_modify_of_unknown_file_is_ignored() {
        let (_dir, root) = setup();
        let file = root.join("old.txt");
        let mut translator = WatchTranslator::new(&root, Duration::from_millis(10));
        assert!(translator.ingest(&modify(&file), Instant::now()).is_empty());
        assert!(!translator.has_pending());
    }

    #[tokio::test]
    async fn test_directory_watcher_delivers_events() {
        let (_dir, root) = setup();
        let (watcher, mut rx) = DirectoryWatcher::start(&root).unwrap();
        assert_eq!(watcher.root(), root.as_path());

        std::fs::write(root.join("a.txt"), "x").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event delivered")
            .expect("channel closed")
            .unwrap();
        assert!(event.paths.iter().any(|p| p.ends_with("a.txt")));
    }
}
