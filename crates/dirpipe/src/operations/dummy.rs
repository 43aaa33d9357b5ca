//! Sleeps through a fixed number of steps. Useful for demos and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::operation::{JobFile, Operation, Params, ProgressSink, decode_params};
use crate::{Error, Result};

fn default_steps() -> u32 {
    10
}

fn default_step_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DummyConfig {
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Time spent in each step.
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,

    /// Fail when this step is reached instead of sleeping.
    #[serde(default)]
    pub fail_at: Option<u32>,

    /// Failure message used with `fail_at`.
    #[serde(default)]
    pub message: Option<String>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            step_ms: default_step_ms(),
            fail_at: None,
            message: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DummyOperation {
    config: DummyConfig,
}

impl DummyOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &DummyConfig {
        &self.config
    }
}

#[async_trait]
impl Operation for DummyOperation {
    fn name(&self) -> &'static str {
        "Dummy Operation"
    }

    fn configure(&mut self, params: &Params) -> Result<()> {
        let config: DummyConfig = decode_params(params)?;
        if config.steps == 0 {
            return Err(Error::config("steps must be greater than 0"));
        }
        self.config = config;
        Ok(())
    }

    async fn run(
        &self,
        file: &JobFile,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let steps = self.config.steps;
        let step = Duration::from_millis(self.config.step_ms);

        for i in 0..steps {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.config.fail_at == Some(i) {
                let message = self
                    .config
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("simulated failure at step {}", i));
                return Err(Error::operation(message));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(step) => {}
            }

            let percent = (i + 1) as f32 * 100.0 / steps as f32;
            progress.report_percent(percent);
            debug!(path = %file.path().display(), step = i + 1, steps, "Dummy step done");
        }
        Ok(())
    }
}
