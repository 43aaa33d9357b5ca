//! Periodic admission of saved files into running jobs.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::pipeline::{Job, JobOutcome, Pipeline};
use crate::registry::FileRegistry;

/// Admits `SAVED` and `QUEUED` files under a global concurrency cap.
pub struct Scheduler {
    registry: Arc<FileRegistry>,
    pipeline: Pipeline,
    max_jobs: usize,
    tick_interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        registry: Arc<FileRegistry>,
        pipeline: Pipeline,
        max_jobs: usize,
        tick_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            pipeline,
            max_jobs,
            tick_interval,
            cancel,
        }
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    /// Run one admission pass and return the jobs to start.
    ///
    /// Each job gets a child of the session token.
    pub fn tick(&self) -> Vec<Job> {
        self.registry
            .admit(self.max_jobs)
            .into_iter()
            .map(|admission| {
                Job::new(
                    admission,
                    self.pipeline.clone(),
                    self.registry.clone(),
                    self.cancel.child_token(),
                )
            })
            .collect()
    }

    /// Tick until the session token is cancelled.
    ///
    /// Running jobs are detached on exit; they observe the cancelled token on
    /// their own and their late updates are discarded by the registry.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut jobs: JoinSet<JobOutcome> = JoinSet::new();

        info!(
            max_jobs = self.max_jobs,
            interval_ms = self.tick_interval.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    for job in self.tick() {
                        jobs.spawn(job.run());
                    }
                }
                Some(result) = jobs.join_next(), if !jobs.is_empty() => {
                    match result {
                        Ok(outcome) => debug!(outcome = %outcome.kind(), "Job finished"),
                        Err(e) if e.is_panic() => error!("Job task panicked: {}", e),
                        Err(e) => debug!("Job task ended: {}", e),
                    }
                }
            }
        }

        let detached = jobs.len();
        jobs.detach_all();
        info!(detached, "Scheduler stopped");
    }
}
