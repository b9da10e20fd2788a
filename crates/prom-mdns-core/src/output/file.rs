// # File Output
//
// File-based implementation of OutputWriter for Prometheus file_sd.
//
// ## Atomic Replace
//
// Prometheus re-reads the target file whenever it changes, so a reader must
// never see a half-written file:
//
// 1. The payload is written to `<path>.tmp` in the same directory
// 2. The temp file is flushed and synced to disk
// 3. The temp file is renamed over `<path>` (atomic on POSIX filesystems)
//
// On any failure the temp file is removed and the previous file stays in
// place untouched.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::traits::OutputWriter;

/// Suffix appended to the target file name for the in-flight temp file
const TEMP_SUFFIX: &str = ".tmp";

/// File output with write-then-rename commits
///
/// # Example
///
/// ```rust,no_run
/// use prom_mdns_core::output::FileOutput;
/// use prom_mdns_core::traits::OutputWriter;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let output = FileOutput::new("/etc/prometheus/targets/mdns.json").await?;
///
///     // Atomically replaces the file
///     output.commit(b"[]").await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileOutput {
    path: PathBuf,
}

impl FileOutput {
    /// Create a file output, creating parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if path.file_name().is_none() {
            return Err(Error::config(format!(
                "Output path {} does not name a file",
                path.display()
            )));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::output(format!(
                    "Failed to create output directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self { path })
    }

    /// Path of the committed file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(TEMP_SUFFIX);
        PathBuf::from(name)
    }

    /// Write the payload to the temp file and rename it into place
    async fn write_and_rename(&self, temp_path: &Path, payload: &[u8]) -> Result<(), Error> {
        {
            let mut file = fs::File::create(temp_path).await.map_err(|e| {
                Error::output(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(payload).await.map_err(|e| {
                Error::output(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::output(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::output(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(temp_path, &self.path).await.map_err(|e| {
            Error::output(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl OutputWriter for FileOutput {
    async fn commit(&self, payload: &[u8]) -> Result<(), Error> {
        let temp_path = self.temp_path();

        if let Err(e) = self.write_and_rename(&temp_path, payload).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(
                    "Failed to remove temp file {}: {}",
                    temp_path.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::trace!("Output written to file: {}", self.path.display());
        Ok(())
    }

    fn destination(&self) -> String {
        self.path.display().to_string()
    }
}
