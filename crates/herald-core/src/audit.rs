//! Execution audit recorder — typed, append-only step-event logging.
//!
//! One recorder is shared by the orchestrator and every channel sender so
//! the per-job timeline is written through a single path. Entries are
//! never mutated; a failed append is logged and swallowed, because losing
//! one audit row must never fail a send that already happened.

use std::sync::Arc;

use crate::traits::ExecutionDetailStore;
use crate::types::{DetailStatus, ExecutionDetail, ExecutionDetailKind, Job, Message};

/// Append-only recorder over an [`ExecutionDetailStore`].
#[derive(Clone)]
pub struct ExecutionAudit {
    store: Arc<dyn ExecutionDetailStore>,
}

impl ExecutionAudit {
    pub fn new(store: Arc<dyn ExecutionDetailStore>) -> Self {
        Self { store }
    }

    async fn append(&self, entry: ExecutionDetail) {
        if let Err(e) = self.store.append(&entry).await {
            tracing::warn!(job_id = %entry.job_id, error = %e, "Failed to append execution detail");
        }
    }

    /// Generic event for a job.
    pub async fn record(&self, job: &Job, kind: ExecutionDetailKind, status: DetailStatus) {
        self.append(ExecutionDetail::for_job(job, kind, status)).await;
    }

    /// Event with a raw context blob.
    pub async fn record_raw(
        &self,
        job: &Job,
        kind: ExecutionDetailKind,
        status: DetailStatus,
        raw: impl Into<String>,
    ) {
        self.append(ExecutionDetail::for_job(job, kind, status).with_raw(raw))
            .await;
    }

    pub async fn step_started(&self, job: &Job) {
        self.record(job, ExecutionDetailKind::StepStarted, DetailStatus::Pending)
            .await;
    }

    pub async fn step_completed(&self, job: &Job) {
        self.record(job, ExecutionDetailKind::StepCompleted, DetailStatus::Success)
            .await;
    }

    pub async fn step_failed(&self, job: &Job, reason: &str) {
        self.record_raw(job, ExecutionDetailKind::StepFailed, DetailStatus::Failed, reason)
            .await;
    }

    pub async fn step_canceled(&self, job: &Job) {
        self.record(job, ExecutionDetailKind::StepCanceled, DetailStatus::Success)
            .await;
    }

    pub async fn message_created(&self, job: &Job, message: &Message) {
        self.append(
            ExecutionDetail::for_job(job, ExecutionDetailKind::MessageCreated, DetailStatus::Pending)
                .with_message(&message.id)
                .with_raw(serde_json::to_string(&message.recipient).unwrap_or_default()),
        )
        .await;
    }

    pub async fn message_sent(&self, job: &Job, message: &Message) {
        self.append(
            ExecutionDetail::for_job(job, ExecutionDetailKind::MessageSent, DetailStatus::Success)
                .with_message(&message.id),
        )
        .await;
    }

    pub async fn provider_error(&self, job: &Job, message: &Message, error: &str) {
        self.append(
            ExecutionDetail::for_job(job, ExecutionDetailKind::ProviderError, DetailStatus::Failed)
                .with_message(&message.id)
                .with_raw(error),
        )
        .await;
    }

    pub async fn snooze_resumed(&self, job: &Job, message: &Message) {
        self.append(
            ExecutionDetail::for_job(job, ExecutionDetailKind::SnoozeResumed, DetailStatus::Success)
                .with_message(&message.id),
        )
        .await;
    }
}
