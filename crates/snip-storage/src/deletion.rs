//! Deferred, batched "mark as deleted" pipeline.
//!
//! Callers enqueue [`DeletionTask`]s and return immediately. A single
//! background task accumulates the tokens per owner and hands them to a
//! [`DeletionSink`] in one write per owner, either when an owner's buffer
//! reaches the size threshold or when the periodic timer fires. Closing the
//! pipeline drains the queue and flushes every remaining buffer.
//!
//! Flushing is best-effort: a failed or timed-out write is logged and the
//! owner's buffer is cleared anyway. Nothing is retried.

use async_trait::async_trait;
use snip_core::backend::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination of flushed deletions.
#[async_trait]
pub trait DeletionSink: Send + Sync + 'static {
    /// Marks `tokens` owned by `owner_id` as deleted and returns how many
    /// records changed.
    async fn mark_deleted(&self, owner_id: &str, tokens: &[String]) -> Result<u64>;
}

/// Tuning knobs of the pipeline.
#[derive(Debug, Clone, TypedBuilder)]
pub struct DeletionConfig {
    /// Capacity of the input queue. A full queue blocks `enqueue`.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Buffer length at which an owner is flushed without waiting for the timer.
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Period of the flush-everything timer.
    #[builder(default = DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: Duration,
    /// Upper bound on a single flush write.
    #[builder(default = DEFAULT_FLUSH_TIMEOUT)]
    pub flush_timeout: Duration,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A request to delete tokens owned by one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionTask {
    pub owner_id: String,
    pub short_tokens: Vec<String>,
}

/// Pending-deletion buffers plus the sink they drain into.
struct Flusher {
    sink: Arc<dyn DeletionSink>,
    buffers: Mutex<HashMap<String, Vec<String>>>,
    batch_size: usize,
    flush_timeout: Duration,
}

impl Flusher {
    async fn push(&self, task: DeletionTask) {
        let mut buffers = self.buffers.lock().await;
        let pending = buffers.entry(task.owner_id.clone()).or_default();
        pending.extend(task.short_tokens);
        trace!(owner_id = %task.owner_id, pending = pending.len(), "buffered deletion");

        if pending.len() >= self.batch_size {
            if let Some(tokens) = buffers.remove(&task.owner_id) {
                self.flush_owner(&task.owner_id, tokens).await;
            }
        }
    }

    async fn flush_all(&self) {
        let mut buffers = self.buffers.lock().await;
        for (owner_id, tokens) in buffers.drain() {
            if tokens.is_empty() {
                continue;
            }
            self.flush_owner(&owner_id, tokens).await;
        }
    }

    async fn flush_owner(&self, owner_id: &str, tokens: Vec<String>) {
        match tokio::time::timeout(self.flush_timeout, self.sink.mark_deleted(owner_id, &tokens))
            .await
        {
            Ok(Ok(updated)) => {
                debug!(owner_id, requested = tokens.len(), updated, "flushed deletions");
            }
            Ok(Err(err)) => {
                error!(owner_id, requested = tokens.len(), error = %err, "failed to mark urls as deleted");
            }
            Err(_) => {
                error!(
                    owner_id,
                    requested = tokens.len(),
                    timeout = ?self.flush_timeout,
                    "timed out marking urls as deleted"
                );
            }
        }
    }
}

/// Handle to the background deletion worker.
pub struct DeletionPipeline {
    sender: parking_lot::Mutex<Option<mpsc::Sender<DeletionTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    flusher: Arc<Flusher>,
}

impl std::fmt::Debug for DeletionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionPipeline")
            .field("open", &self.sender.lock().is_some())
            .field("batch_size", &self.flusher.batch_size)
            .field("flush_timeout", &self.flusher.flush_timeout)
            .finish()
    }
}

impl DeletionPipeline {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn DeletionSink>, config: DeletionConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let flusher = Arc::new(Flusher {
            sink,
            buffers: Mutex::new(HashMap::new()),
            batch_size: config.batch_size.max(1),
            flush_timeout: config.flush_timeout,
        });

        let worker = tokio::spawn(run(
            Arc::clone(&flusher),
            receiver,
            config.flush_interval,
        ));

        Self {
            sender: parking_lot::Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            flusher,
        }
    }

    /// Queues a task. Waits only while the queue is full.
    pub async fn enqueue(&self, task: DeletionTask) {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            warn!(owner_id = %task.owner_id, "deletion pipeline is closed, dropping task");
            return;
        };

        if let Err(mpsc::error::SendError(task)) = sender.send(task).await {
            warn!(owner_id = %task.owner_id, "deletion worker has stopped, dropping task");
        }
    }

    /// Flushes every pending buffer now.
    ///
    /// Tasks still sitting in the queue are not included.
    pub async fn flush(&self) {
        self.flusher.flush_all().await;
    }

    /// Closes the queue and waits until the worker has drained it and
    /// flushed every buffer. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());

        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };
        if let Err(err) = worker.await {
            error!(error = %err, "deletion worker terminated abnormally");
            // Whatever the worker left behind still gets flushed.
            self.flusher.flush_all().await;
        }
    }
}

async fn run(flusher: Arc<Flusher>, mut receiver: mpsc::Receiver<DeletionTask>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                trace!("periodic deletion flush");
                flusher.flush_all().await;
            }
            task = receiver.recv() => match task {
                Some(task) => flusher.push(task).await,
                None => break,
            },
        }
    }

    flusher.flush_all().await;
    debug!("deletion worker stopped");
}
