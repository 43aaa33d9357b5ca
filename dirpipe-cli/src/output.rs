use dirpipe::{MonitorEvent, Outcome};
use std::path::Path;
use tracing::{error, info};

use crate::cli::OutputFormat;

/// Writes monitor events to stdout.
pub struct EventPrinter {
    format: OutputFormat,
    root: Option<std::path::PathBuf>,
}

impl EventPrinter {
    pub fn new(format: OutputFormat, root: Option<&Path>) -> Self {
        Self {
            format,
            root: root.map(Path::to_path_buf),
        }
    }

    fn display_path<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        match &self.root {
            Some(root) => path.strip_prefix(root).unwrap_or(path).to_string_lossy(),
            None => path.to_string_lossy(),
        }
    }

    pub fn format(&self, event: &MonitorEvent) -> anyhow::Result<Option<String>> {
        let line = match self.format {
            OutputFormat::Json => Some(serde_json::to_string(event)?),
            OutputFormat::Pretty => match event {
                MonitorEvent::FileCreated { path, .. } => {
                    Some(format!("+ {}", self.display_path(path)))
                }
                MonitorEvent::FileStatusChanged {
                    path, new_status, ..
                } => Some(format!("  {} -> {}", self.display_path(path), new_status)),
                // progress is too chatty for line output
                MonitorEvent::OperationProgress { .. } => None,
                MonitorEvent::FileCompleted {
                    path,
                    outcome,
                    error,
                } => Some(match (outcome, error) {
                    (Outcome::Success, _) => format!("✓ {}", self.display_path(path)),
                    (_, Some(error)) => format!("✗ {}: {}", self.display_path(path), error),
                    (_, None) => format!("✗ {}", self.display_path(path)),
                }),
            },
        };
        Ok(line)
    }

    pub fn print(&self, event: &MonitorEvent) {
        match self.format(event) {
            Ok(Some(line)) => println!("{}", line),
            Ok(None) => {}
            Err(e) => error!("Failed to format event: {}", e),
        }
        if let MonitorEvent::FileCompleted {
            path,
            outcome: Outcome::Success,
            ..
        } = event
        {
            info!(path = %path.display(), "File processed");
        }
    }
}
