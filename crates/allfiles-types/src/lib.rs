//! Shared types for allfiles
//!
//! This crate contains the plain data structures passed between
//! the manifest pipeline, the download engine and the CLI.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Manifest Types
// ============================================================================

/// A file accepted from the manifest, ready to be mirrored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Directory header the entry was listed under, as written in the manifest
    pub relative_directory: String,
    pub file_name: String,
    pub size_bytes: u64,
}

impl FileEntry {
    pub fn new(
        relative_directory: impl Into<String>,
        file_name: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            relative_directory: relative_directory.into(),
            file_name: file_name.into(),
            size_bytes,
        }
    }

    /// Directory and file name joined with `/`, without empty or `.` components
    pub fn full_path(&self) -> String {
        self.relative_directory
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .chain(std::iter::once(self.file_name.as_str()))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Lowercase extension including the dot, or an empty string
    pub fn extension(&self) -> String {
        self.file_name
            .rfind('.')
            .map(|idx| self.file_name[idx..].to_lowercase())
            .unwrap_or_default()
    }
}

/// Resolved filter applied to every manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Inclusive lower bound; 0 lets empty files through
    pub min_size_bytes: u64,
    /// Inclusive upper bound; 0 means unlimited
    pub max_size_bytes: u64,
    /// Takes precedence over `exclude_extensions` when non-empty
    pub include_extensions: BTreeSet<String>,
    pub exclude_extensions: BTreeSet<String>,
    pub include_path_prefixes: BTreeSet<String>,
    /// Checked before the include list
    pub exclude_path_prefixes: BTreeSet<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_size_bytes: 1,
            max_size_bytes: 0,
            include_extensions: BTreeSet::new(),
            exclude_extensions: BTreeSet::new(),
            include_path_prefixes: BTreeSet::new(),
            exclude_path_prefixes: BTreeSet::new(),
        }
    }
}

// ============================================================================
// Download Types
// ============================================================================

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

/// A single file transfer, handed to exactly one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub source_url: String,
    pub local_path: PathBuf,
    pub max_retries: u32,
    /// Round `n` waits `retry_base_delay * n` after failing
    pub retry_base_delay: Duration,
}

impl TransferJob {
    pub fn new(source_url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            local_path: local_path.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = retry_base_delay;
        self
    }

    /// Path the body is streamed to before being renamed into place.
    /// e.g., for "data/a/file.zip", it returns "data/a/file.zip.incomplete"
    pub fn temp_path(&self) -> PathBuf {
        let mut path = self.local_path.clone().into_os_string();
        path.push(".incomplete");
        PathBuf::from(path)
    }
}

/// Download engine settings, fixed for the lifetime of the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub proxy_url: Option<String>,
    pub request_timeout: Option<Duration>,
    /// Number of workers; 0 is treated as 1
    pub worker_count: usize,
    /// Consecutive failed jobs after which a worker stops; 0 means never
    pub consecutive_failure_limit: u32,
    /// Treat non-2xx responses as failed rounds
    pub error_for_status: bool,
}

// ============================================================================
// Events
// ============================================================================

/// Structured records emitted by the pipeline and the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    ManifestFinished {
        lines: u64,
        accepted: u64,
    },
    ManifestTruncated {
        line: u64,
        reason: String,
    },
    TransferStarted {
        worker: usize,
        url: String,
        local_path: PathBuf,
    },
    TransferRetrying {
        worker: usize,
        url: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    TransferCompleted {
        worker: usize,
        local_path: PathBuf,
        bytes: u64,
    },
    TransferSkipped {
        worker: usize,
        local_path: PathBuf,
    },
    TransferFailed {
        worker: usize,
        url: String,
        error: String,
    },
    TransferAbandoned {
        url: String,
    },
    WorkerStopped {
        worker: usize,
        consecutive_failures: u32,
    },
}

/// Outcome counts for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Jobs accepted by the queue
    pub queued: u64,
    pub succeeded: u64,
    /// Jobs whose target already existed
    pub skipped: u64,
    pub failed: u64,
    /// Jobs no worker was left to take
    pub abandoned: u64,
    pub bytes_downloaded: u64,
    /// Workers stopped by their consecutive failure limit
    pub stopped_workers: Vec<usize>,
}

impl RunSummary {
    /// Every job with an outcome, whatever it was
    pub fn total(&self) -> u64 {
        self.succeeded + self.skipped + self.failed + self.abandoned
    }
}
