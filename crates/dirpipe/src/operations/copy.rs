//! Copies each file into a destination directory.
//!
//! The path relative to the monitored directory is preserved under
//! `destination`. Data is streamed in chunks so that cancellation and
//! progress are observed while large files are copied.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::operation::{JobFile, Operation, Params, ProgressSink, decode_params};
use crate::{Error, Result};

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    64 * 1024
}

const PREFLIGHT_FILE: &str = ".dirpipe-preflight";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CopyConfig {
    /// Root directory files are copied into.
    pub destination: PathBuf,

    /// Create missing destination directories.
    #[serde(default = "default_true")]
    pub create_dirs: bool,

    /// Replace files that already exist at the destination.
    #[serde(default)]
    pub overwrite: bool,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Debug, Default)]
pub struct CopyOperation {
    config: Option<CopyConfig>,
}

impl CopyOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&CopyConfig> {
        self.config.as_ref()
    }

    fn require_config(&self) -> Result<&CopyConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| Error::config("copy operation is not configured"))
    }

    fn target_for(config: &CopyConfig, file: &JobFile) -> PathBuf {
        let relative = file.relative_path();
        if relative.as_os_str().is_empty() || relative.is_absolute() {
            let name = file.path().file_name().unwrap_or(relative.as_os_str());
            config.destination.join(name)
        } else {
            config.destination.join(relative)
        }
    }

    /// Stream `source` into `dest`, reporting byte-based progress.
    async fn copy_chunked(
        source: &Path,
        dest: &Path,
        total: u64,
        chunk_size: usize,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut reader = fs::File::open(source).await.map_err(|e| {
            Error::operation(format!("Failed to open source {}: {}", source.display(), e))
        })?;
        let mut writer = fs::File::create(dest).await.map_err(|e| {
            Error::operation(format!(
                "Failed to create destination {}: {}",
                dest.display(),
                e
            ))
        })?;

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut copied: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let n = reader.read(&mut buf).await.map_err(|e| {
                Error::operation(format!("Failed to read {}: {}", source.display(), e))
            })?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await.map_err(map_write_error)?;
            copied += n as u64;

            if total > 0 {
                progress.report_percent((copied as f64 * 100.0 / total as f64) as f32);
            }
        }
        writer.flush().await.map_err(map_write_error)?;
        writer.sync_all().await.map_err(map_write_error)?;
        Ok(copied)
    }
}

/// ENOSPC on Unix is 28, ERROR_DISK_FULL on Windows is 112.
fn map_write_error(e: std::io::Error) -> Error {
    if matches!(e.raw_os_error(), Some(28) | Some(112)) {
        Error::operation("disk full")
    } else {
        Error::operation(format!("Failed to write destination: {}", e))
    }
}

#[async_trait]
impl Operation for CopyOperation {
    fn name(&self) -> &'static str {
        "Copy"
    }

    fn configure(&mut self, params: &Params) -> Result<()> {
        let config: CopyConfig = decode_params(params)?;
        if config.destination.as_os_str().is_empty() {
            return Err(Error::config("destination must not be empty"));
        }
        if config.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than 0"));
        }
        self.config = Some(config);
        Ok(())
    }

    async fn preflight_check(&self) -> Result<()> {
        let config = self.require_config()?;
        let dest = &config.destination;

        if !fs::try_exists(dest).await? {
            if !config.create_dirs {
                return Err(Error::operation(format!(
                    "Destination directory does not exist: {}",
                    dest.display()
                )));
            }
            fs::create_dir_all(dest).await.map_err(|e| {
                Error::operation(format!(
                    "Cannot create destination directory {}: {}",
                    dest.display(),
                    e
                ))
            })?;
        }

        let probe = dest.join(PREFLIGHT_FILE);
        fs::write(&probe, vec![0u8; 1024]).await.map_err(|e| {
            Error::operation(format!("Destination is not writable {}: {}", dest.display(), e))
        })?;
        fs::remove_file(&probe).await?;
        debug!(destination = %dest.display(), "Copy preflight passed");
        Ok(())
    }

    async fn run(
        &self,
        file: &JobFile,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let config = self.require_config()?;
        let source = file.path();
        let dest = Self::target_for(config, file);

        let source_size = fs::metadata(source)
            .await
            .map_err(|e| {
                Error::operation(format!(
                    "Failed to get source file metadata {}: {}",
                    source.display(),
                    e
                ))
            })?
            .len();

        if !config.overwrite && fs::try_exists(&dest).await? {
            return Err(Error::operation(format!(
                "Destination file already exists and overwrite is disabled: {}",
                dest.display()
            )));
        }

        if let Some(parent) = dest.parent()
            && !fs::try_exists(parent).await?
        {
            if !config.create_dirs {
                return Err(Error::operation(format!(
                    "Destination directory does not exist: {}",
                    parent.display()
                )));
            }
            debug!(directory = %parent.display(), "Creating destination directory");
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::operation(format!("Failed to create destination directory: {}", e))
            })?;
        }

        info!(source = %source.display(), destination = %dest.display(), "Copying file");
        let copied = match Self::copy_chunked(
            source,
            &dest,
            source_size,
            config.chunk_size,
            progress,
            cancel,
        )
        .await
        {
            Ok(copied) => copied,
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&dest).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(
                        destination = %dest.display(),
                        error = %remove_err,
                        "Failed to remove partial copy"
                    );
                }
                return Err(e);
            }
        };

        let dest_size = fs::metadata(&dest).await?.len();
        if dest_size != copied || dest_size != source_size {
            let _ = fs::remove_file(&dest).await;
            return Err(Error::operation(format!(
                "File integrity check failed. Source size: {}, Destination size: {}",
                source_size, dest_size
            )));
        }

        progress.report_percent(100.0);
        file.insert_metadata("destination", dest.to_string_lossy().into_owned());
        info!(destination = %dest.display(), bytes = dest_size, "Copy completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn configured(params: serde_json::Value) -> CopyOperation {
        let mut op = CopyOperation::new();
        op.configure(params.as_object().unwrap()).unwrap();
        op
    }

    #[test]
    fn test_copy_config_defaults() {
        let op = configured(json!({"destination": "/backup"}));
        let config = op.config().unwrap();
        assert_eq!(config.destination, PathBuf::from("/backup"));
        assert!(config.create_dirs);
        assert!(!config.overwrite);
        assert_eq!(config.chunk_size, 64 * 1024);
    }

    #[test]
    fn test_copy_requires_destination() {
        let mut op = CopyOperation::new();
        let err = op.configure(&Params::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_copy_preserves_relative_path() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = src_dir.path().join("video.bin");
        let content = vec![7u8; 10_000];
        fs::write(&source, &content).await.unwrap();

        let op = configured(json!({
            "destination": dst_dir.path().join("out"),
            "chunk_size": 1024,
        }));
        let file = JobFile::new(&source, "video.bin", 0);
        let progress = ProgressSink::detached(0);

        op.run(&file, &progress, &CancellationToken::new())
            .await
            .unwrap();

        let dest = dst_dir.path().join("out").join("video.bin");
        assert_eq!(fs::read(&dest).await.unwrap(), content);
        assert!(source.exists());
        assert_eq!(progress.last(), Some(100.0));
        assert_eq!(
            file.metadata()["destination"],
            dest.to_string_lossy().into_owned()
        );
    }

    #[tokio::test]
    async fn test_copy_refuses_overwrite() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = src_dir.path().join("a.txt");
        fs::write(&source, "new").await.unwrap();
        fs::write(dst_dir.path().join("a.txt"), "old").await.unwrap();

        let op = configured(json!({"destination": dst_dir.path()}));
        let file = JobFile::new(&source, "a.txt", 0);
        let err = op
            .run(&file, &ProgressSink::detached(0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("overwrite is disabled"));
        assert_eq!(
            fs::read_to_string(dst_dir.path().join("a.txt")).await.unwrap(),
            "old"
        );
        assert!(file.metadata().is_empty());

        let op = configured(json!({"destination": dst_dir.path(), "overwrite": true}));
        op.run(&file, &ProgressSink::detached(0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(dst_dir.path().join("a.txt")).await.unwrap(),
            "new"
        );
    }

    #[tokio::test]
    async fn test_copy_cancelled_removes_partial_file() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = src_dir.path().join("a.bin");
        fs::write(&source, vec![1u8; 4096]).await.unwrap();

        let op = configured(json!({"destination": dst_dir.path()}));
        let file = JobFile::new(&source, "a.bin", 0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = op
            .run(&file, &ProgressSink::detached(0), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dst_dir.path().join("a.bin").exists());
    }

    #[tokio::test]
    async fn test_copy_missing_source_fails() {
        let dst_dir = TempDir::new().unwrap();
        let op = configured(json!({"destination": dst_dir.path()}));
        let file = JobFile::new(dst_dir.path().join("missing"), "missing", 0);
        let err = op
            .run(&file, &ProgressSink::detached(0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailure(_)));
    }

    #[tokio::test]
    async fn test_copy_preflight_creates_destination() {
        let dst_dir = TempDir::new().unwrap();
        let dest = dst_dir.path().join("nested").join("backup");
        let op = configured(json!({"destination": dest}));

        op.preflight_check().await.unwrap();
        assert!(dest.is_dir());
        assert!(!dest.join(PREFLIGHT_FILE).exists());
    }

    #[tokio::test]
    async fn test_copy_preflight_without_create_dirs() {
        let dst_dir = TempDir::new().unwrap();
        let op = configured(json!({
            "destination": dst_dir.path().join("absent"),
            "create_dirs": false,
        }));
        assert!(op.preflight_check().await.is_err());
    }
}
