//! Download Manager - a fixed pool of workers draining one job queue
//!
//! - Jobs go through a bounded channel, so `submit` waits for a free worker
//! - Each worker keeps its own consecutive failure count and stops itself
//!   once the configured limit is reached
//! - The HTTP client is built once and shared by all workers

use crate::engine::transfer::{TransferOutcome, TransferTask, USER_AGENT};
use crate::error::AllfilesError;
use allfiles_types::{CoreEvent, EngineConfig, RunSummary, TransferJob};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Counters shared by the manager and its workers
#[derive(Debug, Default)]
struct EngineStats {
    queued: AtomicU64,
    succeeded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    bytes: AtomicU64,
    live_workers: AtomicUsize,
}

type JobQueue = Arc<Mutex<mpsc::Receiver<TransferJob>>>;

/// Download manager that feeds jobs to its workers
pub struct DownloadManager {
    job_tx: mpsc::Sender<TransferJob>,
    /// Each handle resolves to whether the worker hit its failure limit
    workers: Vec<JoinHandle<bool>>,
    stats: Arc<EngineStats>,
    event_tx: broadcast::Sender<CoreEvent>,
}

impl DownloadManager {
    /// Build the shared client and spawn the workers.
    ///
    /// # Errors
    ///
    /// Fails if the proxy URL is invalid or the client cannot be built.
    pub fn start(
        config: EngineConfig,
        event_tx: broadcast::Sender<CoreEvent>,
    ) -> Result<Self, AllfilesError> {
        let client = build_client(&config)?;
        let worker_count = config.worker_count.max(1);
        let (job_tx, job_rx) = mpsc::channel(1);
        let queue: JobQueue = Arc::new(Mutex::new(job_rx));
        let stats = Arc::new(EngineStats::default());
        stats.live_workers.store(worker_count, Ordering::Release);

        info!(
            "Starting {} worker(s) (proxy: {:?}, timeout: {:?}, failure limit: {})",
            worker_count, config.proxy_url, config.request_timeout, config.consecutive_failure_limit
        );

        let workers = (0..worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    client: client.clone(),
                    queue: queue.clone(),
                    stats: stats.clone(),
                    event_tx: event_tx.clone(),
                    failure_limit: config.consecutive_failure_limit,
                    error_for_status: config.error_for_status,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Ok(Self {
            job_tx,
            workers,
            stats,
            event_tx,
        })
    }

    /// Hand a job to the next free worker, waiting until one is ready.
    ///
    /// Returns `false` when every worker has stopped; the job is then
    /// counted as abandoned.
    pub async fn submit(&self, job: TransferJob) -> bool {
        match self.job_tx.send(job).await {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(mpsc::error::SendError(job)) => {
                abandon(&self.stats, &self.event_tx, &job);
                false
            }
        }
    }

    /// Count a descriptor that could not become a job at all
    pub fn record_rejected(&self, what: &str, reason: &AllfilesError) {
        warn!("Skipping {}: {}", what, reason);
        self.stats.failed.fetch_add(1, Ordering::AcqRel);
    }

    /// Stop every worker right away; in-flight temporary files are removed
    pub fn abort(self) {
        for handle in &self.workers {
            handle.abort();
        }
    }

    /// Close the queue, let the workers drain it and collect the results
    pub async fn wait(self) -> RunSummary {
        let Self {
            job_tx, workers, stats, ..
        } = self;
        drop(job_tx);

        let mut stopped_workers = Vec::new();
        for (id, handle) in workers.into_iter().enumerate() {
            match handle.await {
                Ok(true) => stopped_workers.push(id),
                Ok(false) => {}
                Err(e) => error!("Worker {} crashed: {}", id, e),
            }
        }

        let summary = RunSummary {
            queued: stats.queued.load(Ordering::Acquire),
            succeeded: stats.succeeded.load(Ordering::Acquire),
            skipped: stats.skipped.load(Ordering::Acquire),
            failed: stats.failed.load(Ordering::Acquire),
            abandoned: stats.abandoned.load(Ordering::Acquire),
            bytes_downloaded: stats.bytes.load(Ordering::Acquire),
            stopped_workers,
        };
        info!(
            "Finished: {} downloaded, {} present, {} failed, {} abandoned",
            summary.succeeded, summary.skipped, summary.failed, summary.abandoned
        );
        summary
    }
}

fn build_client(config: &EngineConfig) -> Result<Client, AllfilesError> {
    let mut builder = Client::builder().user_agent(USER_AGENT);

    match config.proxy_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| AllfilesError::InvalidUrl(format!("{url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        None => builder = builder.no_proxy(),
    }
    if let Some(timeout) = config.request_timeout.filter(|t| !t.is_zero()) {
        builder = builder.timeout(timeout);
    }

    builder.build().map_err(|e| AllfilesError::Config(e.to_string()))
}

fn abandon(stats: &EngineStats, event_tx: &broadcast::Sender<CoreEvent>, job: &TransferJob) {
    warn!("No worker left for {}", job.source_url);
    stats.abandoned.fetch_add(1, Ordering::AcqRel);
    let _ = event_tx.send(CoreEvent::TransferAbandoned {
        url: job.source_url.clone(),
    });
}

struct Worker {
    id: usize,
    client: Client,
    queue: JobQueue,
    stats: Arc<EngineStats>,
    event_tx: broadcast::Sender<CoreEvent>,
    failure_limit: u32,
    error_for_status: bool,
}

impl Worker {
    async fn run(self) -> bool {
        let mut consecutive_failures = 0u32;

        let tripped = loop {
            let next = self.queue.lock().await.recv().await;
            let Some(job) = next else {
                debug!("Worker {} found the queue drained", self.id);
                break false;
            };

            let url = job.source_url.clone();
            let local_path = job.local_path.clone();
            let _ = self.event_tx.send(CoreEvent::TransferStarted {
                worker: self.id,
                url: url.clone(),
                local_path: local_path.clone(),
            });

            let task = TransferTask::new(
                self.id,
                job,
                self.client.clone(),
                self.error_for_status,
                self.event_tx.clone(),
            );
            match task.run().await {
                Ok(TransferOutcome::Downloaded { bytes }) => {
                    consecutive_failures = 0;
                    self.stats.succeeded.fetch_add(1, Ordering::AcqRel);
                    self.stats.bytes.fetch_add(bytes, Ordering::AcqRel);
                    let _ = self.event_tx.send(CoreEvent::TransferCompleted {
                        worker: self.id,
                        local_path,
                        bytes,
                    });
                }
                Ok(TransferOutcome::AlreadyPresent) => {
                    consecutive_failures = 0;
                    self.stats.skipped.fetch_add(1, Ordering::AcqRel);
                    let _ = self.event_tx.send(CoreEvent::TransferSkipped {
                        worker: self.id,
                        local_path,
                    });
                }
                Err(e) => {
                    consecutive_failures += 1;
                    self.stats.failed.fetch_add(1, Ordering::AcqRel);
                    warn!("Downloading {}: {}", url, e);
                    let _ = self.event_tx.send(CoreEvent::TransferFailed {
                        worker: self.id,
                        url,
                        error: e.to_string(),
                    });

                    if self.failure_limit > 0 && consecutive_failures >= self.failure_limit {
                        warn!(
                            "Worker {} stopping after {} consecutive failures",
                            self.id, consecutive_failures
                        );
                        let _ = self.event_tx.send(CoreEvent::WorkerStopped {
                            worker: self.id,
                            consecutive_failures,
                        });
                        break true;
                    }
                }
            }
        };

        self.retire().await;
        tripped
    }

    /// The last worker out closes the queue and abandons whatever is left in it
    async fn retire(&self) {
        if self.stats.live_workers.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let mut queue = self.queue.lock().await;
        queue.close();
        while let Ok(job) = queue.try_recv() {
            abandon(&self.stats, &self.event_tx, &job);
        }
    }
}
