//! Crate-wide error types.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("File is already tracked: {}", .0.display())]
    DuplicateCreation(PathBuf),

    #[error("File has been saved again: {}", .0.display())]
    DuplicateSave(PathBuf),

    #[error("File saved before it was created: {}", .0.display())]
    SavedBeforeCreated(PathBuf),

    #[error("File is not tracked: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Terminal failure reported by an operation. Displays as the bare message.
    #[error("{0}")]
    OperationFailure(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Preflight check failed for operation #{index} ({name}): {message}")]
    Preflight {
        index: usize,
        name: String,
        message: String,
    },

    #[error("No monitoring session is active; dropping event for {}", .0.display())]
    Inactive(PathBuf),

    #[error("Monitoring is already enabled for {}", .0.display())]
    AlreadyEnabled(PathBuf),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::OperationFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether this error is the cooperative cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error describes an unexpected but harmless watcher event
    /// that callers log and otherwise ignore.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCreation(_) | Self::DuplicateSave(_) | Self::SavedBeforeCreated(_)
        )
    }
}
