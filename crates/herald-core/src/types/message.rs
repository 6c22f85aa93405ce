//! Message — one channel send attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::Job;
use super::step::StepType;

/// Deliverable channels. A subset of [`StepType`]: control steps never
/// produce messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    Push,
    Chat,
    InApp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Push => "push",
            ChannelKind::Chat => "chat",
            ChannelKind::InApp => "in_app",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<StepType> for ChannelKind {
    type Error = ();

    fn try_from(value: StepType) -> std::result::Result<Self, ()> {
        match value {
            StepType::Email => Ok(ChannelKind::Email),
            StepType::Sms => Ok(ChannelKind::Sms),
            StepType::Push => Ok(ChannelKind::Push),
            StepType::Chat => Ok(ChannelKind::Chat),
            StepType::InApp => Ok(ChannelKind::InApp),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Error,
    Warning,
}

/// Where a message is delivered to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientTarget {
    Email(String),
    Phone(String),
    DeviceTokens(Vec<String>),
    WebhookUrl(String),
    /// In-app messages are stored, not pushed to an external endpoint.
    InApp,
}

/// Message severity, inherited from the workflow and optionally overridden
/// by the trigger when the organization's feature flag allows it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Standard,
    High,
    Critical,
}

/// One send attempt through one provider. Created before the provider call
/// so the audit trail exists even when the send fails. Immutable once
/// terminal, except status/identifier updates after provider
/// acknowledgment and in-app idempotent re-delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub job_id: String,
    pub transaction_id: String,
    pub subscriber_id: String,
    pub environment_id: String,
    pub organization_id: String,
    pub workflow_id: String,
    pub notification_id: String,
    /// Step id within the workflow, used for idempotent in-app lookup.
    pub step_id: String,
    pub channel: ChannelKind,
    pub provider_id: String,
    pub integration_id: String,
    pub recipient: RecipientTarget,
    /// None when content storage is disabled.
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub status: MessageStatus,
    /// Provider-side identifier, stored after acknowledgment.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub error_id: Option<String>,
    #[serde(default)]
    pub error_text: Option<String>,
    pub payload: serde_json::Value,
    pub overrides: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub seen: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub snoozed_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Build a message record for a job, before the provider call.
    pub fn for_job(
        job: &Job,
        channel: ChannelKind,
        provider_id: &str,
        integration_id: &str,
        recipient: RecipientTarget,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            transaction_id: job.transaction_id.clone(),
            subscriber_id: job.subscriber_id.clone(),
            environment_id: job.environment_id.clone(),
            organization_id: job.organization_id.clone(),
            workflow_id: job.workflow_id.clone(),
            notification_id: job.notification_id.clone(),
            step_id: job.step.id.clone(),
            channel,
            provider_id: provider_id.to_string(),
            integration_id: integration_id.to_string(),
            recipient,
            subject: None,
            content: None,
            status: MessageStatus::Warning,
            external_id: None,
            error_id: None,
            error_text: None,
            payload: job.payload.clone(),
            overrides: job.overrides.clone(),
            tags: Vec::new(),
            severity: Severity::default(),
            seen: false,
            read: false,
            snoozed_until: None,
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark sent, storing the provider's external identifier.
    pub fn mark_sent(&mut self, external_id: &str) {
        self.status = MessageStatus::Sent;
        self.external_id = Some(external_id.to_string());
        self.updated_at = Utc::now();
    }

    /// Mark errored with the provider's failure text.
    pub fn mark_error(&mut self, error_id: &str, error_text: &str) {
        self.status = MessageStatus::Error;
        self.error_id = Some(error_id.to_string());
        self.error_text = Some(error_text.to_string());
        self.updated_at = Utc::now();
    }

    /// Re-open an in-app message for idempotent re-delivery: unread,
    /// unseen, snooze cleared, timestamps refreshed.
    pub fn reopen(&mut self) {
        self.seen = false;
        self.read = false;
        self.snoozed_until = None;
        self.status = MessageStatus::Sent;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepType, WorkflowStep};

    #[test]
    fn test_channel_from_step_type() {
        assert_eq!(ChannelKind::try_from(StepType::Email), Ok(ChannelKind::Email));
        assert!(ChannelKind::try_from(StepType::Delay).is_err());
        assert!(ChannelKind::try_from(StepType::Trigger).is_err());
    }

    #[test]
    fn test_mark_sent_and_error() {
        let job = Job::new("tx", WorkflowStep::new("s1", StepType::Email), None);
        let mut msg = Message::for_job(
            &job,
            ChannelKind::Email,
            "smtp",
            "int-1",
            RecipientTarget::Email("a@b.c".into()),
        );
        msg.mark_sent("ext-42");
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(msg.external_id.as_deref(), Some("ext-42"));

        msg.mark_error("provider_error", "boom");
        assert_eq!(msg.status, MessageStatus::Error);
        assert_eq!(msg.error_text.as_deref(), Some("boom"));
    }

    #[test]
    fn test_reopen_clears_read_state() {
        let job = Job::new("tx", WorkflowStep::new("s1", StepType::InApp), None);
        let mut msg = Message::for_job(&job, ChannelKind::InApp, "inbox", "int-2", RecipientTarget::InApp);
        msg.seen = true;
        msg.read = true;
        msg.snoozed_until = Some(Utc::now());
        msg.reopen();
        assert!(!msg.seen);
        assert!(!msg.read);
        assert!(msg.snoozed_until.is_none());
        assert_eq!(msg.status, MessageStatus::Sent);
    }
}
