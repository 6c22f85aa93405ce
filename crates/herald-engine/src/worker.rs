//! Queue worker — drains job deliveries and runs each through the
//! orchestrator, a bounded number at a time.
//!
//! Thrown runner errors are redelivered by re-enqueueing up to the
//! configured attempt cap; fatal data errors are never retried.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use herald_core::config::WorkerConfig;
use herald_core::traits::{JobQueue, QueuedJob};

use crate::runner::JobRunner;

pub struct Worker {
    runner: Arc<JobRunner>,
    queue: Arc<dyn JobQueue>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(runner: Arc<JobRunner>, queue: Arc<dyn JobQueue>, config: WorkerConfig) -> Self {
        Self {
            runner,
            queue,
            config,
        }
    }

    /// Drain deliveries until the sender side closes.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<QueuedJob>) {
        tracing::info!(
            concurrency = self.config.concurrency,
            "⚙️ Worker started"
        );
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        while let Some(delivery) = rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let runner = self.runner.clone();
            let queue = self.queue.clone();
            let max_attempts = self.config.max_attempts;
            let redelivery_delay =
                std::time::Duration::from_millis(self.config.redelivery_delay_ms);

            tokio::spawn(async move {
                let _permit = permit;
                tracing::debug!(
                    job_id = %delivery.job_id,
                    attempt = delivery.attempt,
                    "Processing job"
                );

                match runner.run(&delivery.job_id).await {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        tracing::error!(
                            job_id = %delivery.job_id,
                            error = %e,
                            "Job failed with a fatal error, not retrying"
                        );
                    }
                    Err(e) => {
                        if delivery.attempt < max_attempts {
                            tracing::warn!(
                                job_id = %delivery.job_id,
                                attempt = delivery.attempt,
                                error = %e,
                                "Job threw, redelivering"
                            );
                            tokio::time::sleep(redelivery_delay).await;
                            if let Err(enq) = queue.enqueue(&delivery.job_id).await {
                                tracing::error!(
                                    job_id = %delivery.job_id,
                                    error = %enq,
                                    "Redelivery enqueue failed"
                                );
                            }
                        } else {
                            tracing::error!(
                                job_id = %delivery.job_id,
                                attempts = delivery.attempt,
                                error = %e,
                                "Job exhausted redelivery attempts"
                            );
                        }
                    }
                }
            });
        }

        tracing::info!("Worker stopped");
    }
}
