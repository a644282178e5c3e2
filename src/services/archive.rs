use crate::models::Candidate;
use crate::services::ledger::{LedgerError, ProcessedLedger};
use crate::services::transfer::ImageFetcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Longest name component kept in an archived file name
const MAX_NAME_CHARS: usize = 64;

/// What happened when archiving a candidate's photos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// The ledger already lists this candidate; nothing was fetched
    AlreadyProcessed,
    Downloaded { saved: usize, failed: usize },
}

/// Saves candidate photos to disk for later labelling
///
/// Each candidate is archived at most once; the ledger entry is written
/// before the first download starts.
pub struct ImageArchive {
    ledger: Arc<ProcessedLedger>,
    fetcher: Arc<dyn ImageFetcher>,
    folder: PathBuf,
    jitter_max: Duration,
}

impl ImageArchive {
    pub fn new(ledger: Arc<ProcessedLedger>, fetcher: Arc<dyn ImageFetcher>, folder: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            fetcher,
            folder: folder.into(),
            jitter_max: Duration::ZERO,
        }
    }

    /// Sleep a random duration up to `jitter_max` after each saved image
    pub fn with_jitter(mut self, jitter_max: Duration) -> Self {
        self.jitter_max = jitter_max;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub async fn download(&self, candidate: &Candidate) -> Result<ArchiveOutcome, ArchiveError> {
        tokio::fs::create_dir_all(&self.folder)
            .await
            .map_err(|source| ArchiveError::Io {
                path: self.folder.clone(),
                source,
            })?;

        if !self.ledger.mark_if_new(candidate.id()).await? {
            tracing::debug!("Images of {} already archived", candidate.id());
            return Ok(ArchiveOutcome::AlreadyProcessed);
        }

        let mut saved = 0;
        let mut failed = 0;

        for (index, url) in candidate.images().iter().enumerate() {
            let bytes = match self.fetcher.fetch(url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Failed to download image {}: {}", url, e);
                    failed += 1;
                    continue;
                }
            };

            let path = self.image_path(candidate, index);
            if let Err(e) = tokio::fs::write(&path, &bytes).await {
                tracing::warn!("Failed to save image {} to {}: {}", url, path.display(), e);
                failed += 1;
                continue;
            }
            saved += 1;

            if !self.jitter_max.is_zero() {
                tokio::time::sleep(self.jitter_max.mul_f64(rand::random::<f64>())).await;
            }
        }

        tracing::debug!("Archived {} of {} images for {}", saved, candidate.images().len(), candidate.id());

        Ok(ArchiveOutcome::Downloaded { saved, failed })
    }

    fn image_path(&self, candidate: &Candidate, index: usize) -> PathBuf {
        let name: String = candidate
            .name()
            .chars()
            .take(MAX_NAME_CHARS)
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.folder.join(format!("{}_{}_{}.jpeg", candidate.id(), name, index))
    }
}
