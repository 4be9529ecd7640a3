//! Error types for allfiles core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in allfiles core
#[derive(Debug, Error)]
pub enum AllfilesError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid size: {0:?}")]
    InvalidSize(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cannot read manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed manifest entry at line {line}: {content:?}")]
    MalformedEntry { line: u64, content: String },

    #[error("Refusing path outside the mirror directory: {0}")]
    UnsafePath(String),

    #[error("Giving up on {url} after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AllfilesError {
    /// Check if this error is worth another transfer round
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllfilesError::Network(_) | AllfilesError::Io(_))
    }

    /// Check if this error must end the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AllfilesError::InvalidSize(_)
                | AllfilesError::InvalidUrl(_)
                | AllfilesError::Manifest { .. }
                | AllfilesError::MalformedEntry { .. }
                | AllfilesError::Config(_)
        )
    }
}
