// Upload worker
//
// Runs on its own task so the mux loop never waits on network I/O. Every item goes
// to every sink; transient failures are retried with exponential backoff, anything
// else is logged and dropped. A missing segment self-heals once newer segments
// push it out of the playlist window.

use {
    crate::storage::HlsSink,
    backon::{BackoffBuilder, ExponentialBuilder},
    bytes::Bytes,
    serde::{Deserialize, Serialize},
    std::{io, sync::Arc, time::Duration},
    tokio::{sync::mpsc, task::JoinHandle, time},
    tracing as log,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Items buffered between the mux loop and the worker.
    pub queue_capacity: usize,
    pub max_retries: usize,
    pub min_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Delete cached segments older than this many seconds; `None` keeps everything.
    pub segment_retention_secs: Option<u64>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            max_retries: 3,
            min_retry_delay_ms: 100,
            max_retry_delay_ms: 2_000,
            segment_retention_secs: None,
        }
    }
}

impl UploadConfig {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_retry_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_retry_delay_ms))
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

#[derive(Debug, Clone)]
pub struct UploadItem {
    pub name: String,
    pub data: Bytes,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    /// Successful (item, sink) puts.
    pub uploaded: u64,
    /// Retries after transient failures.
    pub retries: u64,
    /// Puts abandoned after a permanent error or exhausted retries.
    pub failed: u64,
    pub cleaned: u64,
}

/// Write to one sink, retrying transient failures.
///
/// Returns the number of retries that were needed.
pub async fn write_with_retry(
    sink: &Arc<dyn HlsSink>,
    name: &str,
    data: Bytes,
    backoff: ExponentialBuilder,
) -> Result<u64, (io::Error, u64)> {
    let mut retries = 0;
    let mut last_err = None;
    for delay in std::iter::once(Duration::ZERO).chain(backoff.build()) {
        if delay > Duration::ZERO {
            time::sleep(delay).await;
            retries += 1;
        }

        match sink.put(name, data.clone()).await {
            Ok(()) => return Ok(retries),
            Err(e) => {
                if !is_transient_error(&e) {
                    return Err((e, retries));
                }
                log::warn!("{} put {} failed: {} - retrying", sink.label(), name, e);
                last_err = Some(e);
            }
        }
    }

    Err((
        last_err.unwrap_or_else(|| io::Error::other("retry exhausted")),
        retries,
    ))
}

/// Whether an I/O error is worth retrying.
#[must_use]
pub fn is_transient_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Sending side handed to the mux loop.
#[derive(Clone)]
pub struct UploadQueue {
    tx: mpsc::Sender<UploadItem>,
}

impl UploadQueue {
    /// Enqueue without waiting. Returns false when the item was dropped.
    pub fn try_enqueue(&self, name: impl Into<String>, data: Bytes) -> bool {
        let item = UploadItem {
            name: name.into(),
            data,
        };
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(item)) => {
                log::warn!("upload queue full, dropping {}", item.name);
                false
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                log::warn!("upload worker gone, dropping {}", item.name);
                false
            }
        }
    }

    /// Enqueue, waiting for room. Used on the stop path only.
    pub async fn enqueue(&self, name: impl Into<String>, data: Bytes) -> bool {
        let item = UploadItem {
            name: name.into(),
            data,
        };
        self.tx.send(item).await.is_ok()
    }
}

pub struct UploadWorker {
    sinks: Vec<Arc<dyn HlsSink>>,
    config: UploadConfig,
    rx: mpsc::Receiver<UploadItem>,
    stats: UploadStats,
}

impl UploadWorker {
    /// Spawn the worker. It exits once every [`UploadQueue`] clone is dropped and the
    /// queue is drained.
    pub fn spawn(
        sinks: Vec<Arc<dyn HlsSink>>,
        config: UploadConfig,
    ) -> (UploadQueue, JoinHandle<UploadStats>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = Self {
            sinks,
            config,
            rx,
            stats: UploadStats::default(),
        };
        (UploadQueue { tx }, tokio::spawn(worker.run()))
    }

    async fn run(mut self) -> UploadStats {
        let retention = self.config.segment_retention_secs.map(Duration::from_secs);
        let mut cleanup = time::interval(
            retention.map_or(Duration::from_secs(3600), |r| (r / 2).max(Duration::from_secs(1))),
        );
        cleanup.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // first tick fires immediately
        cleanup.tick().await;

        log::debug!("upload worker started with {} sinks", self.sinks.len());
        loop {
            tokio::select! {
                item = self.rx.recv() => {
                    let Some(item) = item else { break };
                    self.upload(item).await;
                }
                _ = cleanup.tick(), if retention.is_some() => {
                    if let Some(retention) = retention {
                        self.cleanup(retention).await;
                    }
                }
            }
        }

        log::info!(
            "upload worker finished: {} uploaded, {} retries, {} failed",
            self.stats.uploaded,
            self.stats.retries,
            self.stats.failed
        );
        self.stats
    }

    async fn upload(&mut self, item: UploadItem) {
        for sink in &self.sinks {
            match write_with_retry(sink, &item.name, item.data.clone(), self.config.backoff()).await {
                Ok(retries) => {
                    self.stats.uploaded += 1;
                    self.stats.retries += retries;
                    log::debug!("{} <- {} ({} bytes)", sink.label(), item.name, item.data.len());
                }
                Err((e, retries)) => {
                    self.stats.failed += 1;
                    self.stats.retries += retries;
                    log::error!("{} upload of {} dropped: {}", sink.label(), item.name, e);
                }
            }
        }
    }

    async fn cleanup(&mut self, retention: Duration) {
        for sink in &self.sinks {
            match sink.cleanup(retention).await {
                Ok(deleted) => self.stats.cleaned += deleted as u64,
                Err(e) => log::warn!("{} cleanup failed: {}", sink.label(), e),
            }
        }
    }
}
