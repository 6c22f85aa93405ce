//! Job — one step-execution unit of a workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::{StepType, WorkflowStep};

/// Job status state machine: `Pending → Queued → Running → terminal`.
/// `Delayed` parks digest/delay steps until a trigger resumes or cancels
/// them. Status only advances forward, except when digest merge logic
/// redirects a canceled job to an active follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Delayed,
    Canceled,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled | JobStatus::Skipped
        )
    }
}

/// Digest bookkeeping carried by digest jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestMeta {
    /// Payload field used to group events into one digest window.
    #[serde(default)]
    pub digest_key: Option<String>,
    /// Resolved value of `digest_key` for this run.
    #[serde(default)]
    pub digest_value: Option<String>,
    #[serde(default)]
    pub backoff: bool,
    #[serde(default)]
    pub amount: Option<u32>,
    #[serde(default)]
    pub unit: Option<super::step::DelayUnit>,
}

/// One step-execution unit. Jobs of a transaction form a singly-linked
/// chain via `parent_id`; exactly one job exists per step per transaction
/// and the chain terminates in a job with no child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Groups all jobs of one workflow run.
    pub transaction_id: String,
    /// Previous step's job. `None` for the trigger job.
    pub parent_id: Option<String>,
    pub step_type: StepType,
    pub status: JobStatus,
    pub step: WorkflowStep,
    pub payload: serde_json::Value,
    pub overrides: serde_json::Value,
    #[serde(default)]
    pub tenant: Option<String>,
    pub subscriber_id: String,
    pub environment_id: String,
    pub organization_id: String,
    pub workflow_id: String,
    /// Parent notification record of the run.
    pub notification_id: String,
    #[serde(default)]
    pub digest: Option<DigestMeta>,
    /// Run-level outcome rollup, written when the run halts or completes.
    #[serde(default)]
    pub delivery_lifecycle: Option<super::outcome::DeliveryLifecycle>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a pending job for one step of a transaction.
    pub fn new(transaction_id: &str, step: WorkflowStep, parent_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            parent_id,
            step_type: step.step_type,
            status: JobStatus::Pending,
            step,
            payload: serde_json::Value::Null,
            overrides: serde_json::Value::Null,
            tenant: None,
            subscriber_id: String::new(),
            environment_id: String::new(),
            organization_id: String::new(),
            workflow_id: String::new(),
            notification_id: String::new(),
            digest: None,
            delivery_lifecycle: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An unsnooze job resumes a previously snoozed in-app message instead
    /// of going through the normal send/chain flow.
    pub fn is_unsnooze(&self) -> bool {
        self.step_type == StepType::InApp
            && self.step.delay.is_some()
            && self.payload.get("unsnooze").and_then(|v| v.as_bool()) == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Delayed.is_terminal());
    }

    #[test]
    fn test_unsnooze_detection() {
        let mut step = WorkflowStep::new("step-1", StepType::InApp);
        step.delay = Some(super::super::step::DelaySchedule {
            amount: 5,
            unit: super::super::step::DelayUnit::Minutes,
        });
        let mut job = Job::new("tx-1", step, None);
        assert!(!job.is_unsnooze());

        job.payload = serde_json::json!({"unsnooze": true});
        assert!(job.is_unsnooze());

        // Without delay metadata the flag means nothing.
        job.step.delay = None;
        assert!(!job.is_unsnooze());
    }
}
