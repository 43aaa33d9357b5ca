//! # dirpipe
//!
//! Watches a single directory and runs every newly written file through a
//! configurable, ordered pipeline of operations.
//!
//! Files move through `created → saved → (queued) → running → success | fail`.
//! A periodic scheduler admits saved files under a global concurrency cap, and
//! each admitted file runs its operations strictly in order, stopping at the
//! first failure. Progress, status changes and completions are published as
//! [`MonitorEvent`]s on a broadcast channel.
//!
//! ```no_run
//! use dirpipe::{Monitor, MonitorConfig, OperationCatalog, OperationSpec, Pipeline};
//!
//! # async fn demo() -> dirpipe::Result<()> {
//! let catalog = OperationCatalog::builtin();
//! let pipeline = Pipeline::assemble(
//!     &catalog,
//!     &[OperationSpec::new("copy").with_param("destination", "/backup")],
//! )?;
//! pipeline.preflight().await?;
//!
//! let monitor = Monitor::new(MonitorConfig::default(), pipeline)?;
//! let mut events = monitor.subscribe();
//! monitor.enable("/incoming")?;
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod file;
pub mod monitor;
pub mod operation;
pub mod operations;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::MonitorConfig;
pub use error::{Error, Result};
pub use events::{MonitorEvent, Outcome};
pub use file::{FileStatus, OperationProgress, TrackedFile};
pub use monitor::Monitor;
pub use operation::{JobFile, Operation, OperationCatalog, Params, ProgressSink, decode_params};
pub use pipeline::{Job, JobOutcome, JobState, OperationSpec, Pipeline};
pub use registry::FileRegistry;
pub use scheduler::Scheduler;
pub use tokio_util::sync::CancellationToken;
