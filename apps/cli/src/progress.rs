//! Progress spinner for mirror runs, driven by engine events

use allfiles_core::format_size;
use allfiles_types::CoreEvent;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Running totals shown next to the spinner
#[derive(Debug, Default)]
struct ProgressState {
    done: u64,
    bytes: u64,
    skipped: u64,
    failed: u64,
    current: String,
}

impl ProgressState {
    /// Fold an event in; returns a line worth keeping above the spinner
    fn apply(&mut self, event: &CoreEvent) -> Option<String> {
        match event {
            CoreEvent::TransferStarted { local_path, .. } => {
                self.current = local_path.display().to_string();
                None
            }
            CoreEvent::TransferCompleted { bytes, .. } => {
                self.done += 1;
                self.bytes += bytes;
                None
            }
            CoreEvent::TransferSkipped { .. } => {
                self.done += 1;
                self.skipped += 1;
                None
            }
            CoreEvent::TransferRetrying {
                url, attempt, error, ..
            } => Some(format!(
                "{} {} (attempt {}): {}",
                style("↻").yellow(),
                url,
                attempt,
                error
            )),
            CoreEvent::TransferFailed { url, error, .. } => {
                self.done += 1;
                self.failed += 1;
                Some(format!("{} {}: {}", style("✗").red().bold(), url, error))
            }
            CoreEvent::WorkerStopped {
                worker,
                consecutive_failures,
            } => Some(format!(
                "{} Worker {} stopped after {} failures in a row",
                style("⏹").red(),
                worker,
                consecutive_failures
            )),
            CoreEvent::ManifestTruncated { line, reason } => Some(format!(
                "{} Listing cut short at line {}: {}",
                style("!").yellow().bold(),
                line,
                reason
            )),
            CoreEvent::TransferAbandoned { .. } | CoreEvent::ManifestFinished { .. } => None,
        }
    }

    fn message(&self) -> String {
        format!(
            "{} files, {} ({} present, {} failed) {}",
            self.done,
            format_size(self.bytes),
            self.skipped,
            self.failed,
            style(&self.current).dim()
        )
    }
}

/// Spinner fed by a broadcast subscription until every sender is gone
pub struct MirrorProgress {
    bar: ProgressBar,
    task: JoinHandle<()>,
}

impl MirrorProgress {
    pub fn spawn(mut events: broadcast::Receiver<CoreEvent>) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));

        let task_bar = bar.clone();
        let task = tokio::spawn(async move {
            let mut state = ProgressState::default();
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(line) = state.apply(&event) {
                            task_bar.println(line);
                        }
                        task_bar.set_message(state.message());
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!("Progress display skipped {} events", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { bar, task }
    }

    /// Wait for the event stream to close, then clear the spinner
    pub async fn finish(self) {
        let Self { bar, task } = self;
        // Aborted workers release their senders shortly after the abort
        if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
            tracing::debug!("Progress events still open, clearing anyway");
        }
        bar.finish_and_clear();
    }
}
