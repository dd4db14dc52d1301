//! `queue` crate: delivery of resume outcomes to the engine.
//!
//! Suspended jobs are resumed by posting a [`ResumeMessage`]. A single
//! worker ([`run_worker`]) drains the queue and hands each message to a
//! [`ResumeHandler`] (the engine's execution controller). Messages are
//! plain serde types so they can be relayed from another process.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nodes::JobResult;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the resume queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Messages buffered before senders wait.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// "The external work job `job_id` was waiting for finished with `outcome`."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeMessage {
    pub job_id: Uuid,
    pub outcome: JobResult,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// The worker side of the queue has been dropped.
    #[error("resume queue is closed")]
    Closed,
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Whatever consumes resume messages.
#[async_trait]
pub trait ResumeHandler: Send + Sync {
    async fn handle(&self, message: ResumeMessage) -> Result<(), HandlerError>;
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResumeSender {
    tx: mpsc::Sender<ResumeMessage>,
}

impl ResumeSender {
    pub async fn send(&self, message: ResumeMessage) -> Result<(), QueueError> {
        debug!("enqueue resume for job {}", message.job_id);
        self.tx.send(message).await.map_err(|_| QueueError::Closed)
    }
}

#[derive(Debug)]
pub struct ResumeReceiver {
    rx: mpsc::Receiver<ResumeMessage>,
}

impl ResumeReceiver {
    /// Next message, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<ResumeMessage> {
        self.rx.recv().await
    }
}

/// Create a bounded resume queue.
pub fn channel(config: &QueueConfig) -> (ResumeSender, ResumeReceiver) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    (ResumeSender { tx }, ResumeReceiver { rx })
}

/// Drain `receiver` until every sender is dropped, handing each message to
/// `handler` in arrival order.
///
/// Handler failures are logged and skipped; duplicate or late deliveries
/// are expected and must not stop the worker.
pub async fn run_worker<H>(mut receiver: ResumeReceiver, handler: Arc<H>)
where
    H: ResumeHandler + ?Sized,
{
    info!("resume worker started");
    while let Some(message) = receiver.recv().await {
        let job_id = message.job_id;
        if let Err(e) = handler.handle(message).await {
            warn!("resume of job {} rejected: {}", job_id, e);
        }
    }
    info!("resume worker stopped: queue closed");
}
