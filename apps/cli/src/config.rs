//! Option defaults from a JSON file, merged under the command line

use crate::{DownloadArgs, FilterArgs};
use allfiles_core::types::EngineConfig;
use allfiles_core::{FilterSettings, MirrorPlan};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MANIFEST: &str = "ALL_FILES";
pub const DEFAULT_OUTPUT_DIR: &str = "./data";
const DEFAULT_FAILURE_LIMIT: u32 = 1;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Contents of `allfiles.json`; keys follow the long flag names
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub file: Option<PathBuf>,
    pub debug: Option<bool>,

    #[serde(alias = "min-size")]
    pub min_size: Option<String>,
    #[serde(alias = "max-size")]
    pub max_size: Option<String>,
    pub exts: Vec<String>,
    #[serde(alias = "exclude-exts")]
    pub exclude_exts: Vec<String>,
    pub paths: Vec<String>,
    #[serde(alias = "exclude-paths")]
    pub exclude_paths: Vec<String>,
    pub types: Vec<String>,
    #[serde(alias = "exclude-types")]
    pub exclude_types: Vec<String>,

    pub url: Option<String>,
    #[serde(alias = "output-dir")]
    pub output_dir: Option<PathBuf>,
    pub proxy: Option<String>,
    pub timeout: Option<u64>,
    pub threads: Option<usize>,
    #[serde(alias = "warn-as-error-limit")]
    pub warn_as_error_limit: Option<u32>,
    pub retries: Option<u32>,
    #[serde(alias = "retry-delay")]
    pub retry_delay: Option<u64>,
    #[serde(alias = "strict-status")]
    pub strict_status: Option<bool>,
}

impl FileConfig {
    /// Read the file if it exists; a missing file means no defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Everything `dl` needs besides the filter
pub struct DownloadSettings {
    pub plan: MirrorPlan,
    pub engine: EngineConfig,
}

pub fn manifest_path(flag: Option<&PathBuf>, file: &FileConfig) -> PathBuf {
    flag.or(file.file.as_ref())
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST))
}

fn list_or(flag: &[String], file: &[String]) -> Vec<String> {
    if flag.is_empty() {
        file.to_vec()
    } else {
        flag.to_vec()
    }
}

pub fn filter_settings(args: &FilterArgs, file: &FileConfig) -> FilterSettings {
    let defaults = FilterSettings::default();
    FilterSettings {
        min_size: args
            .min_size
            .clone()
            .or_else(|| file.min_size.clone())
            .unwrap_or(defaults.min_size),
        max_size: args.max_size.clone().or_else(|| file.max_size.clone()),
        include_extensions: list_or(&args.exts, &file.exts),
        exclude_extensions: list_or(&args.exclude_exts, &file.exclude_exts),
        include_types: list_or(&args.types, &file.types),
        exclude_types: list_or(&args.exclude_types, &file.exclude_types),
        include_paths: list_or(&args.paths, &file.paths),
        exclude_paths: list_or(&args.exclude_paths, &file.exclude_paths),
    }
}

pub fn download_settings(args: &DownloadArgs, file: &FileConfig) -> Result<DownloadSettings> {
    let url = args
        .url
        .clone()
        .or_else(|| file.url.clone())
        .context("No base URL: pass --url or set \"url\" in the config file")?;
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let retries = args.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES);
    let retry_delay = args.retry_delay.or(file.retry_delay).unwrap_or(DEFAULT_RETRY_DELAY_SECS);

    let plan = MirrorPlan::new(&url, output_dir)
        .with_context(|| format!("Invalid base URL {url}"))?
        .with_retries(retries, Duration::from_secs(retry_delay));

    let engine = EngineConfig {
        proxy_url: args.proxy.clone().or_else(|| file.proxy.clone()),
        request_timeout: args
            .timeout
            .or(file.timeout)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        worker_count: args.threads.or(file.threads).unwrap_or(1),
        consecutive_failure_limit: args
            .warn_as_error_limit
            .or(file.warn_as_error_limit)
            .unwrap_or(DEFAULT_FAILURE_LIMIT),
        error_for_status: args.strict_status || file.strict_status.unwrap_or(false),
    };

    Ok(DownloadSettings { plan, engine })
}
