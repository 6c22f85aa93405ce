//! In-memory job queue with at-least-once redelivery accounting.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

use herald_core::error::{HeraldError, Result};
use herald_core::traits::{JobQueue, QueuedJob};

/// Unbounded in-process queue. Enqueue is the trait surface; the worker
/// side takes the receiver once and drains it.
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedJob>>>,
    attempts: Mutex<std::collections::HashMap<String, u32>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            attempts: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Take the consumer end. Panics if taken twice — one worker pool owns
    /// the receiver.
    pub fn take_receiver(&self) -> mpsc::UnboundedReceiver<QueuedJob> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .expect("queue receiver already taken")
    }

    /// How many times a job id was delivered so far.
    pub fn attempts_of(&self, job_id: &str) -> u32 {
        self.attempts.lock().unwrap().get(job_id).copied().unwrap_or(0)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job_id: &str) -> Result<()> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(job_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.tx
            .send(QueuedJob {
                job_id: job_id.to_string(),
                attempt,
            })
            .map_err(|_| HeraldError::Queue("queue receiver dropped".into()))?;
        tracing::trace!(job_id, attempt, "Job enqueued");
        Ok(())
    }
}
