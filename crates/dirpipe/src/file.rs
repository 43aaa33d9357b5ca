//! Per-file lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of a tracked file.
///
/// `Created -> Saved -> (Queued <-> Running) -> Success | Fail`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// A new regular file was observed but is still being written.
    Created,
    /// Writing finished; eligible for admission.
    Saved,
    /// Eligible, waiting for a free slot.
    Queued,
    /// Owned by a running job.
    Running,
    /// Every operation succeeded.
    Success,
    /// An operation failed or the job was cancelled.
    Fail,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Saved => "saved",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }

    /// Whether the scheduler may consider this file for admission.
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Saved | Self::Queued)
    }

    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, next),
            (Created, Saved)
                | (Saved, Queued)
                | (Saved, Running)
                | (Queued, Running)
                | (Running, Queued)
                | (Running, Success)
                | (Running, Fail)
        )
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one pipeline operation for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationProgress {
    /// Display name of the operation.
    pub name: String,
    /// Percentage in `0.0..=100.0`.
    pub percent: f32,
    /// Free-form status text.
    pub text: String,
    /// Error reported by this operation, if it was the one that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationProgress {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            percent: 0.0,
            text: format_percent(0.0),
            error: None,
        }
    }
}

pub(crate) fn format_percent(percent: f32) -> String {
    format!("{:.1} %", percent)
}

/// A file tracked by the registry.
///
/// Values handed out by the registry are snapshots; mutating them has no
/// effect on the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the monitored directory.
    pub relative_path: PathBuf,
    pub created: DateTime<Utc>,
    pub status: FileStatus,
    /// Progress keyed by pipeline index.
    pub operations: BTreeMap<usize, OperationProgress>,
    /// Metadata written by operations, keyed by the writer's pipeline index.
    #[serde(default)]
    pub metadata: BTreeMap<usize, Map<String, Value>>,
    /// Terminal error message, set when the status is `Fail`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
}

impl TrackedFile {
    pub(crate) fn new<I, S>(path: PathBuf, relative_path: PathBuf, operation_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path,
            relative_path,
            created: Utc::now(),
            status: FileStatus::Created,
            operations: operation_names
                .into_iter()
                .enumerate()
                .map(|(index, name)| (index, OperationProgress::pending(name)))
                .collect(),
            metadata: BTreeMap::new(),
            error: None,
            finished: None,
        }
    }
}
