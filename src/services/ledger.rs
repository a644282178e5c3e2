use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Append-only record of candidate ids whose images were already processed
///
/// Stored as a newline-delimited file. The file is re-read on every check
/// so several processes can share it; within one process the check and the
/// append happen under a single lock.
pub struct ProcessedLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProcessedLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `id` has been recorded
    pub async fn contains(&self, id: &str) -> Result<bool, LedgerError> {
        let _guard = self.lock.lock().await;
        self.read_contains(id).await
    }

    /// Record `id` unless it is already present
    ///
    /// Returns `true` when the id was newly recorded.
    pub async fn mark_if_new(&self, id: &str) -> Result<bool, LedgerError> {
        let _guard = self.lock.lock().await;

        if self.read_contains(id).await? {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        file.write_all(format!("{}\n", id).as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        Ok(true)
    }

    async fn read_contains(&self, id: &str) -> Result<bool, LedgerError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents.lines().any(|line| line == id)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
