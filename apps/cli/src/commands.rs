//! Command implementations

use crate::config::DownloadSettings;
use crate::output::{print_line, print_output, SummaryReport, Totals};
use crate::progress::MirrorProgress;
use crate::OutputFormat;
use allfiles_core::{
    extensions, format_size, mirror, normalize_extensions, DownloadManager, FilterSettings,
    ManifestFilter, ManifestStream,
};
use allfiles_types::{CoreEvent, FileEntry};
use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

// ============================================================================
// Listing
// ============================================================================

#[derive(Serialize)]
struct EntryLine {
    path: String,
    size_bytes: u64,
    #[serde(skip)]
    show_size: bool,
}

impl EntryLine {
    fn new(entry: &FileEntry, show_size: bool) -> Self {
        Self {
            path: entry.full_path(),
            size_bytes: entry.size_bytes,
            show_size,
        }
    }
}

impl fmt::Display for EntryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.show_size {
            write!(f, "{:>10} {}", format_size(self.size_bytes), self.path)
        } else {
            write!(f, "{}", self.path)
        }
    }
}

async fn open_listing(
    manifest: &Path,
    settings: &FilterSettings,
    event_tx: broadcast::Sender<CoreEvent>,
) -> Result<ManifestStream> {
    let config = settings.resolve().context("Invalid filter")?;
    let filter = ManifestFilter::new(config, event_tx);
    filter
        .open(manifest)
        .await
        .with_context(|| format!("Cannot read listing {}", manifest.display()))
}

pub async fn list_files(
    manifest: &Path,
    settings: &FilterSettings,
    totals: bool,
    show_size: bool,
    format: OutputFormat,
) -> Result<()> {
    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
    let mut entries = open_listing(manifest, settings, event_tx).await?;

    let mut total_bytes = 0u64;
    while let Some(entry) = entries.next().await {
        let entry = entry.context("Listing aborted")?;
        total_bytes += entry.size_bytes;
        print_line(&EntryLine::new(&entry, show_size), format)?;
    }

    if totals {
        print_line(&Totals::new(total_bytes), format)?;
    }
    Ok(())
}

// ============================================================================
// Mirroring
// ============================================================================

pub async fn download_files(
    manifest: &Path,
    settings: &FilterSettings,
    run: DownloadSettings,
    show_progress: bool,
    format: OutputFormat,
) -> Result<()> {
    let (event_tx, event_rx) = broadcast::channel(EVENT_CAPACITY);
    let progress = show_progress.then(|| MirrorProgress::spawn(event_rx));

    let entries = open_listing(manifest, settings, event_tx.clone()).await?;
    let manager =
        DownloadManager::start(run.engine, event_tx).context("Cannot start downloads")?;

    let result = mirror(entries, &run.plan, manager).await;
    if let Some(progress) = progress {
        progress.finish().await;
    }

    let summary = result.context("Mirror aborted")?;
    print_output(&SummaryReport(summary), format)
}

// ============================================================================
// Types
// ============================================================================

pub fn list_types(exts: &[String], format: OutputFormat) -> Result<()> {
    if !exts.is_empty() {
        return lookup_types(exts, format);
    }

    match format {
        OutputFormat::Json => {
            let catalog: BTreeMap<&str, &[&str]> = extensions::types()
                .into_iter()
                .filter_map(|name| extensions::lookup(name).map(|exts| (name, exts)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        }
        OutputFormat::Human => {
            for name in extensions::types() {
                let exts = extensions::lookup(name).unwrap_or_default();
                println!("{:<10} {}", style(name).cyan().bold(), exts.join(" "));
            }
        }
    }
    Ok(())
}

fn lookup_types(exts: &[String], format: OutputFormat) -> Result<()> {
    let found: BTreeMap<String, Option<&str>> = normalize_extensions(exts)
        .into_iter()
        .map(|ext| {
            let type_name = extensions::type_of(&ext);
            (ext, type_name)
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found)?),
        OutputFormat::Human => {
            for (ext, type_name) in &found {
                match type_name {
                    Some(name) => println!("{:<8} {}", ext, style(name).cyan()),
                    None => println!("{:<8} {}", ext, style("unknown").dim()),
                }
            }
        }
    }
    Ok(())
}
