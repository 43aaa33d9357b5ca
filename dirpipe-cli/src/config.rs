//! TOML configuration for the command-line tool.
//!
//! ```toml
//! [monitor]
//! directory = "/incoming"
//! max_concurrent_jobs = 2
//! settle_ms = 2000
//!
//! [[operations]]
//! kind = "copy"
//! params = { destination = "/backup" }
//! ```

use anyhow::{Context, Result, bail};
use dirpipe::{MonitorConfig, OperationCatalog, OperationSpec, Pipeline};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Directory to monitor.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(flatten)]
    pub settings: MonitorConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub operations: Vec<OperationSpec>,
}

impl AppConfig {
    /// Load from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.monitor.settings.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, directory: Option<PathBuf>, max_jobs: Option<usize>) -> Self {
        if let Some(directory) = directory {
            self.monitor.directory = Some(directory);
        }
        if let Some(max_jobs) = max_jobs {
            self.monitor.settings.max_concurrent_jobs = max_jobs;
        }
        self
    }

    pub fn directory(&self) -> Result<&Path> {
        match self.monitor.directory.as_deref() {
            Some(directory) => Ok(directory),
            None => bail!("No directory to monitor; pass --dir or set monitor.directory"),
        }
    }

    pub fn pipeline(&self, catalog: &OperationCatalog) -> Result<Pipeline> {
        if self.operations.is_empty() {
            bail!("No operations configured; add at least one [[operations]] entry");
        }
        Ok(Pipeline::assemble(catalog, &self.operations)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[monitor]
directory = "/incoming"
max_concurrent_jobs = 3
settle_ms = 500

[[operations]]
kind = "dummy"
params = { step_ms = 10 }

[[operations]]
kind = "copy"

[operations.params]
destination = "/backup"
overwrite = true
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.directory().unwrap(), Path::new("/incoming"));
        assert_eq!(config.monitor.settings.max_concurrent_jobs, 3);
        assert_eq!(config.monitor.settings.settle_ms, 500);
        assert_eq!(config.monitor.settings.tick_interval_ms, 1000);
        assert_eq!(config.operations.len(), 2);
        assert_eq!(config.operations[1].kind, "copy");
        assert_eq!(config.operations[1].params["overwrite"], true);

        let pipeline = config.pipeline(&OperationCatalog::builtin()).unwrap();
        assert_eq!(pipeline.names(), vec!["Dummy Operation", "Copy"]);
    }

    #[test]
    fn test_overrides_win() {
        let config = AppConfig::parse(SAMPLE)
            .unwrap()
            .with_overrides(Some(PathBuf::from("/other")), Some(1));
        assert_eq!(config.directory().unwrap(), Path::new("/other"));
        assert_eq!(config.monitor.settings.max_concurrent_jobs, 1);
    }

    #[test]
    fn test_zero_cap_rejected() {
        let err = AppConfig::parse("[monitor]\nmax_concurrent_jobs = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_concurrent_jobs"));
    }

    #[test]
    fn test_defaults_need_directory_and_operations() {
        let config = AppConfig::load(None).unwrap();
        assert!(config.directory().is_err());
        assert!(config.pipeline(&OperationCatalog::builtin()).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirpipe.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.operations.len(), 2);

        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
