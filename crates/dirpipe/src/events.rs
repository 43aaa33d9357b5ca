//! Events emitted by the monitor for UIs, loggers and tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::file::FileStatus;

/// Terminal outcome of a file's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Events broadcast by the file registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A new file started being tracked.
    FileCreated {
        path: PathBuf,
        relative_path: PathBuf,
        timestamp: DateTime<Utc>,
    },
    /// A file moved between lifecycle states.
    FileStatusChanged {
        path: PathBuf,
        old_status: FileStatus,
        new_status: FileStatus,
    },
    /// An operation reported progress.
    OperationProgress {
        path: PathBuf,
        operation_index: usize,
        percent: f32,
        text: String,
    },
    /// A file's pipeline reached a terminal outcome.
    FileCompleted {
        path: PathBuf,
        outcome: Outcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl MonitorEvent {
    pub fn path(&self) -> &Path {
        match self {
            MonitorEvent::FileCreated { path, .. }
            | MonitorEvent::FileStatusChanged { path, .. }
            | MonitorEvent::OperationProgress { path, .. }
            | MonitorEvent::FileCompleted { path, .. } => path,
        }
    }
}
