//! Execution details — the append-only audit trail of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::Job;

/// Closed set of step-level events. The timeline of these per job answers
/// "why did/didn't this step fire".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionDetailKind {
    StepStarted,
    StepQueued,
    StepCompleted,
    StepFailed,
    StepCanceled,
    MessageCreated,
    MessageSent,
    ProviderError,
    IntegrationMissing,
    /// Subscriber has no usable target for the channel.
    RecipientMissing,
    ContentNotGenerated,
    FilteredByConditions,
    FilteredByPreferences,
    BridgeSkipRequested,
    DigestMergedToFollower,
    DelayCompleted,
    ChainHalted,
    EnqueueFailed,
    SnoozeResumed,
}

impl ExecutionDetailKind {
    /// Human-readable event message for dashboards and logs.
    pub fn message(&self) -> &'static str {
        match self {
            ExecutionDetailKind::StepStarted => "Step execution started",
            ExecutionDetailKind::StepQueued => "Next step queued",
            ExecutionDetailKind::StepCompleted => "Step completed",
            ExecutionDetailKind::StepFailed => "Step failed",
            ExecutionDetailKind::StepCanceled => "Step canceled",
            ExecutionDetailKind::MessageCreated => "Message record created",
            ExecutionDetailKind::MessageSent => "Message sent through provider",
            ExecutionDetailKind::ProviderError => "Provider returned an error",
            ExecutionDetailKind::IntegrationMissing => {
                "No active integration for the channel"
            }
            ExecutionDetailKind::RecipientMissing => {
                "Subscriber has no delivery target for the channel"
            }
            ExecutionDetailKind::ContentNotGenerated => "Message content not generated",
            ExecutionDetailKind::FilteredByConditions => "Step filtered by conditions",
            ExecutionDetailKind::FilteredByPreferences => {
                "Step filtered by subscriber preferences"
            }
            ExecutionDetailKind::BridgeSkipRequested => "Bridge code requested skip",
            ExecutionDetailKind::DigestMergedToFollower => {
                "Canceled digest merged into active follower"
            }
            ExecutionDetailKind::DelayCompleted => "Delay completed",
            ExecutionDetailKind::ChainHalted => "Chain halted on step failure",
            ExecutionDetailKind::EnqueueFailed => "Failed to queue next step",
            ExecutionDetailKind::SnoozeResumed => "Snoozed message re-delivered",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailSource {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailStatus {
    Pending,
    Success,
    Failed,
    Warning,
}

/// One immutable audit entry. Entries are never mutated or deleted and
/// form a strictly ordered timeline per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDetail {
    pub id: String,
    pub job_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    pub transaction_id: String,
    pub subscriber_id: String,
    pub notification_id: String,
    pub detail: ExecutionDetailKind,
    pub source: DetailSource,
    pub status: DetailStatus,
    /// Raw context blob (JSON) captured at event time.
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default)]
    pub is_retry: bool,
    pub created_at: DateTime<Utc>,
}

impl ExecutionDetail {
    /// Build an internal entry for a job event.
    pub fn for_job(job: &Job, detail: ExecutionDetailKind, status: DetailStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            message_id: None,
            transaction_id: job.transaction_id.clone(),
            subscriber_id: job.subscriber_id.clone(),
            notification_id: job.notification_id.clone(),
            detail,
            source: DetailSource::Internal,
            status,
            raw: None,
            is_test: false,
            is_retry: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}
