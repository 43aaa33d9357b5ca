//! Runtime configuration for a monitoring session.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Fallback concurrency cap when the available parallelism cannot be queried.
const FALLBACK_MAX_JOBS: usize = 2;

fn default_max_concurrent_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_MAX_JOBS)
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_event_capacity() -> usize {
    1024
}

/// Configuration shared by the scheduler, the watcher and the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Maximum number of files processed concurrently.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Interval in milliseconds between scheduler admission passes.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Quiet period in milliseconds after the last write before a file is
    /// considered saved, on platforms that do not report close-after-write.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Capacity of the broadcast channel carrying monitor events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            tick_interval_ms: default_tick_interval_ms(),
            settle_ms: default_settle_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl MonitorConfig {
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    pub fn with_settle_ms(mut self, ms: u64) -> Self {
        self.settle_ms = ms;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(Error::config("max_concurrent_jobs must be at least 1"));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::config("tick_interval_ms must be greater than 0"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("event_capacity must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.max_concurrent_jobs >= 1);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.settle(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_cap_rejected() {
        let config = MonitorConfig::default().with_max_concurrent_jobs(0);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"max_concurrent_jobs": 3}"#).unwrap();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.settle_ms, 2000);
        assert_eq!(config.event_capacity, 1024);
    }
}
