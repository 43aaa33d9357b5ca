//! The monitoring switch.
//!
//! A [`Monitor`] owns the registry for its whole lifetime. Each
//! [`enable`](Monitor::enable) starts a session: a watcher, the task pumping
//! its events into the registry, and the scheduler loop, all tied to one
//! session [`CancellationToken`]. [`disable`](Monitor::disable) tears the
//! session down without waiting for running jobs.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::events::MonitorEvent;
use crate::pipeline::Pipeline;
use crate::registry::FileRegistry;
use crate::scheduler::Scheduler;
use crate::watcher::{DirectoryWatcher, RawEvents, WatchEvent, WatchTranslator};
use crate::{Error, Result};

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

struct Session {
    root: PathBuf,
    token: CancellationToken,
    generation: u64,
    watcher: DirectoryWatcher,
}

pub struct Monitor {
    config: MonitorConfig,
    pipeline: Pipeline,
    registry: Arc<FileRegistry>,
    session: Mutex<Option<Session>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, pipeline: Pipeline) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(FileRegistry::new(pipeline.names(), config.event_capacity));
        Ok(Self {
            config,
            pipeline,
            registry,
            session: Mutex::new(None),
        })
    }

    /// Start monitoring `directory`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enable(&self, directory: impl AsRef<Path>) -> Result<()> {
        let directory = directory.as_ref();
        if self.pipeline.is_empty() {
            return Err(Error::config("pipeline has no operations"));
        }

        let mut session = self.session.lock();
        if let Some(active) = session.as_ref() {
            return Err(Error::AlreadyEnabled(active.root.clone()));
        }
        if !directory.is_dir() {
            return Err(Error::config(format!(
                "not an existing directory: {}",
                directory.display()
            )));
        }
        let root = directory.canonicalize()?;

        let (watcher, raw_events) = DirectoryWatcher::start(&root)?;
        let generation = self.registry.start_session(&root);
        let token = CancellationToken::new();

        tokio::spawn(pump(
            raw_events,
            WatchTranslator::new(&root, self.config.settle()),
            self.registry.clone(),
            token.clone(),
            (self.config.settle() / 4).max(MIN_FLUSH_INTERVAL),
        ));

        let scheduler = Scheduler::new(
            self.registry.clone(),
            self.pipeline.clone(),
            self.config.max_concurrent_jobs,
            self.config.tick_interval(),
            token.clone(),
        );
        tokio::spawn(scheduler.run());

        info!(
            directory = %root.display(),
            operations = self.pipeline.len(),
            max_jobs = self.config.max_concurrent_jobs,
            "Monitoring enabled"
        );
        *session = Some(Session {
            root,
            token,
            generation,
            watcher,
        });
        Ok(())
    }

    /// Stop monitoring. Running jobs are signalled but not awaited.
    pub fn disable(&self) {
        let Some(session) = self.session.lock().take() else {
            debug!("Monitoring is not enabled");
            return;
        };
        session.token.cancel();
        drop(session.watcher);
        self.registry.clear();
        info!(
            directory = %session.root.display(),
            generation = session.generation,
            "Monitoring disabled"
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Canonical path of the monitored directory, if enabled.
    pub fn monitored_directory(&self) -> Option<PathBuf> {
        self.session.lock().as_ref().map(|s| s.root.clone())
    }

    pub fn registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.registry.subscribe()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.token.cancel();
        }
    }
}

/// Forward watcher events into the registry until the session ends.
async fn pump(
    mut raw_events: RawEvents,
    mut translator: WatchTranslator,
    registry: Arc<FileRegistry>,
    token: CancellationToken,
    flush_interval: Duration,
) {
    let mut flush = tokio::time::interval(flush_interval);
    flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = raw_events.recv() => match received {
                Some(Ok(event)) => {
                    for event in translator.ingest(&event, std::time::Instant::now()) {
                        if token.is_cancelled() {
                            break;
                        }
                        apply(&registry, event);
                    }
                }
                Some(Err(e)) => error!("Watch error: {}", e),
                None => {
                    debug!("Watcher channel closed");
                    break;
                }
            },
            _ = flush.tick(), if translator.has_pending() => {
                for event in translator.flush(std::time::Instant::now()) {
                    if token.is_cancelled() {
                        break;
                    }
                    apply(&registry, event);
                }
            }
        }
    }
    debug!(root = %translator.root().display(), "Watch pump stopped");
}

fn apply(registry: &FileRegistry, event: WatchEvent) {
    let result = match &event {
        WatchEvent::FileAppeared(path) => registry.register_created(path),
        WatchEvent::FileWriteComplete(path) => registry.mark_saved(path),
    };
    match result {
        Ok(()) => {}
        Err(e @ Error::Inactive(_)) => debug!("{}", e),
        Err(e) if e.is_ignorable() => warn!("{}", e),
        Err(e) => error!(path = %event.path().display(), "Failed to apply watch event: {}", e),
    }
}
