//! Runs one file through every operation of the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Pipeline;
use crate::Error;
use crate::events::Outcome;
use crate::operation::{JobFile, ProgressSink};
use crate::registry::{Admission, FileRegistry};

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every operation returned `Ok`.
    Succeeded,
    /// The first failing operation and its message. `operation_index` is
    /// `None` when the job was torn down outside of any operation.
    Failed {
        operation_index: Option<usize>,
        message: String,
    },
    /// Cancellation was observed before, during or right after the given
    /// operation.
    Cancelled { operation_index: Option<usize> },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }

    pub fn kind(&self) -> Outcome {
        match self {
            JobOutcome::Succeeded => Outcome::Success,
            JobOutcome::Failed { .. } => Outcome::Failed,
            JobOutcome::Cancelled { .. } => Outcome::Cancelled,
        }
    }

    /// Message stored as the file's terminal error.
    pub fn error(&self) -> Option<String> {
        match self {
            JobOutcome::Succeeded => None,
            JobOutcome::Failed { message, .. } => Some(message.clone()),
            JobOutcome::Cancelled { .. } => Some(Error::Cancelled.to_string()),
        }
    }

    pub fn failed_operation(&self) -> Option<usize> {
        match self {
            JobOutcome::Succeeded => None,
            JobOutcome::Failed {
                operation_index, ..
            }
            | JobOutcome::Cancelled { operation_index } => *operation_index,
        }
    }

    fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded => JobState::Succeeded,
            JobOutcome::Failed { .. } => JobState::Failed,
            JobOutcome::Cancelled { .. } => JobState::Cancelled,
        }
    }
}

/// Releases the job's slot exactly once, even if the job future is dropped
/// or panics before reaching a terminal outcome.
struct SlotRelease {
    registry: Arc<FileRegistry>,
    generation: u64,
    path: PathBuf,
    armed: bool,
}

impl SlotRelease {
    fn release(mut self, outcome: &JobOutcome) {
        self.armed = false;
        self.registry.finish(self.generation, &self.path, outcome);
    }
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        if self.armed {
            warn!(path = %self.path.display(), "Job ended without an outcome");
            self.registry.finish(
                self.generation,
                &self.path,
                &JobOutcome::Failed {
                    operation_index: None,
                    message: "job aborted".to_string(),
                },
            );
        }
    }
}

/// One file bound to the full pipeline.
pub struct Job {
    admission: Admission,
    pipeline: Pipeline,
    registry: Arc<FileRegistry>,
    cancel: CancellationToken,
    state: JobState,
}

impl Job {
    pub fn new(
        admission: Admission,
        pipeline: Pipeline,
        registry: Arc<FileRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            admission,
            pipeline,
            registry,
            cancel,
            state: JobState::Created,
        }
    }

    pub fn path(&self) -> &Path {
        &self.admission.path
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run the job on its own task.
    pub fn spawn(self) -> JoinHandle<JobOutcome> {
        tokio::spawn(self.run())
    }

    /// Run every operation in order and finalize the file.
    pub async fn run(mut self) -> JobOutcome {
        self.state = JobState::Running;
        let slot = SlotRelease {
            registry: self.registry.clone(),
            generation: self.admission.generation,
            path: self.admission.path.clone(),
            armed: true,
        };

        let outcome = self.execute().await;
        self.state = outcome.state();

        match &outcome {
            JobOutcome::Succeeded => {
                info!(path = %self.path().display(), "Job completed successfully")
            }
            JobOutcome::Failed { message, .. } => {
                warn!(path = %self.path().display(), error = %message, "Job failed")
            }
            JobOutcome::Cancelled { .. } => {
                info!(path = %self.path().display(), "Job cancelled")
            }
        }

        slot.release(&outcome);
        outcome
    }

    async fn execute(&self) -> JobOutcome {
        let generation = self.admission.generation;

        for descriptor in self.pipeline.iter() {
            let index = descriptor.index;
            if self.cancel.is_cancelled() {
                return JobOutcome::Cancelled {
                    operation_index: Some(index),
                };
            }

            debug!(
                path = %self.path().display(),
                index,
                operation = %descriptor.name,
                "Running operation"
            );
            let file = JobFile::from_admission(&self.admission, index);
            let progress = ProgressSink::new(
                self.registry.clone(),
                generation,
                self.admission.path.clone(),
                index,
            );

            match descriptor.operation.run(&file, &progress, &self.cancel).await {
                Ok(()) if self.cancel.is_cancelled() => {
                    warn!(
                        path = %self.path().display(),
                        operation = %descriptor.name,
                        "Operation returned success after cancellation"
                    );
                    return JobOutcome::Cancelled {
                        operation_index: Some(index),
                    };
                }
                Ok(()) => {
                    self.registry.commit_metadata(
                        generation,
                        &self.admission.path,
                        index,
                        file.take_metadata(),
                    );
                }
                Err(Error::Cancelled) => {
                    return JobOutcome::Cancelled {
                        operation_index: Some(index),
                    };
                }
                Err(e) => {
                    return JobOutcome::Failed {
                        operation_index: Some(index),
                        message: e.to_string(),
                    };
                }
            }
        }

        JobOutcome::Succeeded
    }
}
