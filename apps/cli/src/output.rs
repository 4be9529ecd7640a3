//! Output formatting utilities

use crate::OutputFormat;
use allfiles_core::format_size;
use allfiles_types::RunSummary;
use console::style;
use serde::Serialize;
use std::fmt;

/// Print output in the specified format
pub fn print_output<T: Serialize + fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Human => {
            println!("{}", value);
        }
    }
    Ok(())
}

/// Print one value per line, JSON lines in json mode
pub fn print_line<T: Serialize + fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Human => println!("{}", value),
    }
    Ok(())
}

/// `TOTAL: 1.50M (1572864)`
#[derive(Serialize)]
pub struct Totals {
    pub total_bytes: u64,
    pub total: String,
}

impl Totals {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            total: format_size(total_bytes),
        }
    }
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TOTAL: {} ({})", self.total, self.total_bytes)
    }
}

/// End of run report
#[derive(Serialize)]
#[serde(transparent)]
pub struct SummaryReport(pub RunSummary);

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = &self.0;
        let mark = if summary.failed == 0 && summary.abandoned == 0 {
            style("✓").green().bold()
        } else {
            style("!").yellow().bold()
        };
        write!(
            f,
            "{} {} downloaded ({}), {} already present, {} failed, {} abandoned",
            mark,
            summary.succeeded,
            format_size(summary.bytes_downloaded),
            summary.skipped,
            summary.failed,
            summary.abandoned
        )?;
        if !summary.stopped_workers.is_empty() {
            let ids: Vec<String> = summary
                .stopped_workers
                .iter()
                .map(ToString::to_string)
                .collect();
            write!(f, "\n{} Workers stopped early: {}", style("✗").red().bold(), ids.join(", "))?;
        }
        Ok(())
    }
}
