//! Transfer task - fetches one file into the mirror
//!
//! The body is streamed into `<local_path>.incomplete` and renamed into
//! place only once it is fully written, so a file at `local_path` is always
//! complete. The temporary file is removed on every way out.

use crate::error::AllfilesError;
use allfiles_types::{CoreEvent, TransferJob};
use futures::StreamExt;
use reqwest::Client;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36"
);

/// How a successful transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Body written and committed
    Downloaded { bytes: u64 },
    /// Something already sits at the local path
    AlreadyPresent,
}

/// Runs a single [`TransferJob`] to completion on behalf of a worker
pub struct TransferTask {
    worker: usize,
    job: TransferJob,
    client: Client,
    error_for_status: bool,
    event_tx: broadcast::Sender<CoreEvent>,
}

impl TransferTask {
    pub fn new(
        worker: usize,
        job: TransferJob,
        client: Client,
        error_for_status: bool,
        event_tx: broadcast::Sender<CoreEvent>,
    ) -> Self {
        Self {
            worker,
            job,
            client,
            error_for_status,
            event_tx,
        }
    }

    /// Fetch the file unless it is already present.
    ///
    /// # Errors
    ///
    /// Returns [`AllfilesError::RetriesExhausted`] when no round succeeded,
    /// or the I/O error of the final rename.
    pub async fn run(self) -> Result<TransferOutcome, AllfilesError> {
        if fs::metadata(&self.job.local_path).await.is_ok() {
            debug!("File exists: {}", self.job.local_path.display());
            return Ok(TransferOutcome::AlreadyPresent);
        }

        let temp_path = self.job.temp_path();
        let _cleanup = TempFileGuard(temp_path.clone());

        let bytes = self.fetch_with_retries(&temp_path).await?;
        fs::rename(&temp_path, &self.job.local_path).await?;
        debug!("Downloaded {} ({} bytes)", self.job.local_path.display(), bytes);

        Ok(TransferOutcome::Downloaded { bytes })
    }

    async fn fetch_with_retries(&self, temp_path: &Path) -> Result<u64, AllfilesError> {
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.job.max_retries {
            attempts += 1;
            match self.fetch_once(temp_path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    let retry = e.is_retryable() && attempts < self.job.max_retries;
                    if retry {
                        let delay = self.job.retry_base_delay * attempts;
                        warn!(
                            "Attempt {}/{} for {} failed: {}. Retrying in {:?}",
                            attempts, self.job.max_retries, self.job.source_url, e, delay
                        );
                        let _ = self.event_tx.send(CoreEvent::TransferRetrying {
                            worker: self.worker,
                            url: self.job.source_url.clone(),
                            attempt: attempts,
                            delay_ms: delay.as_millis() as u64,
                            error: e.to_string(),
                        });
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                    if !retry {
                        break;
                    }
                }
            }
        }

        Err(AllfilesError::RetriesExhausted {
            url: self.job.source_url.clone(),
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts allowed".to_string()),
        })
    }

    /// One GET, body streamed into the temporary file
    async fn fetch_once(&self, temp_path: &Path) -> Result<u64, AllfilesError> {
        let response = self.client.get(&self.job.source_url).send().await?;
        let response = if self.error_for_status {
            response.error_for_status()?
        } else {
            response
        };

        remove_if_exists(temp_path).await?;
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(temp_path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Removes the temporary file when dropped, including on task cancellation
struct TempFileGuard(PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!("Removed leftover {}", self.0.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.0.display(), e),
        }
    }
}
