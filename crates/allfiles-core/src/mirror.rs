//! Mirror orchestration: manifest entries in, transfer jobs out

use crate::engine::DownloadManager;
use crate::error::AllfilesError;
use crate::manifest::ManifestStream;
use allfiles_types::{
    FileEntry, RunSummary, TransferJob, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use url::Url;

/// Where entries are fetched from and where they land
#[derive(Debug, Clone)]
pub struct MirrorPlan {
    base_url: Url,
    output_dir: PathBuf,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl MirrorPlan {
    /// # Errors
    ///
    /// Returns [`AllfilesError::InvalidUrl`] unless `base_url` is an
    /// absolute URL that paths can be appended to.
    pub fn new(base_url: &str, output_dir: impl Into<PathBuf>) -> Result<Self, AllfilesError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AllfilesError::InvalidUrl(format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(AllfilesError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url: parsed,
            output_dir: output_dir.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        })
    }

    pub fn with_retries(mut self, max_retries: u32, retry_base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = retry_base_delay;
        self
    }

    /// Map an entry to its source URL and local path.
    ///
    /// # Errors
    ///
    /// Returns [`AllfilesError::UnsafePath`] for paths with `..` components.
    pub fn job_for(&self, entry: &FileEntry) -> Result<TransferJob, AllfilesError> {
        let full_path = entry.full_path();
        if full_path.split('/').any(|component| component == "..") {
            return Err(AllfilesError::UnsafePath(full_path));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AllfilesError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(full_path.split('/'));

        let local_path = full_path
            .split('/')
            .fold(self.output_dir.clone(), |path, component| path.join(component));

        Ok(TransferJob::new(url.to_string(), local_path)
            .with_retries(self.max_retries, self.retry_base_delay))
    }
}

/// Feed every entry of the stream to the engine and wait for it to drain.
///
/// # Errors
///
/// A fatal stream item stops the workers and is returned as is.
pub async fn mirror(
    mut entries: ManifestStream,
    plan: &MirrorPlan,
    manager: DownloadManager,
) -> Result<RunSummary, AllfilesError> {
    while let Some(entry) = entries.next().await {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!("Aborting mirror: {}", e);
                manager.abort();
                return Err(e);
            }
        };
        match plan.job_for(&entry) {
            Ok(job) => {
                manager.submit(job).await;
            }
            Err(e) => manager.record_rejected(&entry.full_path(), &e),
        }
    }
    Ok(manager.wait().await)
}
