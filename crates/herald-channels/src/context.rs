//! Shared send context, services bundle, override merging and the common
//! create-message / deliver / record tail used by the senders.

use std::sync::Arc;

use serde_json::{Map, Value};

use herald_core::audit::ExecutionAudit;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::{
    IntegrationResolver, MessageStore, TemplateCompiler, WebhookEvent, WebhookNotifier,
};
use herald_core::types::{
    Attachment, BridgeOutput, Job, LifecycleDetail, Message, SendOutcome, Severity, StepTemplate,
    Subscriber,
};

use crate::providers::{Delivery, ProviderRegistry};

/// Everything a sender needs about the step being executed.
pub struct SendContext {
    pub job: Job,
    pub subscriber: Subscriber,
    /// Compiled variables: `{ "payload": ..., "subscriber": ... }`.
    pub variables: Value,
    pub bridge: Option<BridgeOutput>,
    pub severity: Severity,
    pub attachments: Vec<Attachment>,
}

/// Content storage and related send policies.
#[derive(Debug, Clone)]
pub struct SendPolicy {
    pub store_content: bool,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            store_content: true,
        }
    }
}

/// Collaborators shared by all channel senders.
pub struct SenderServices {
    pub integrations: Arc<dyn IntegrationResolver>,
    pub compiler: Arc<dyn TemplateCompiler>,
    pub messages: Arc<dyn MessageStore>,
    pub audit: ExecutionAudit,
    pub webhooks: Arc<dyn WebhookNotifier>,
    pub providers: Arc<ProviderRegistry>,
    pub policy: SendPolicy,
}

/// Merged override object for one send. Later sources win; which sources
/// participate is a per-channel policy.
#[derive(Debug, Clone, Default)]
pub struct MergedOverrides(Map<String, Value>);

impl MergedOverrides {
    /// Merge override sections in ascending precedence. `sources` are keys
    /// into the trigger's override object (provider ids, channel names);
    /// the step-specific section (`steps.<step_id>`) always merges last.
    pub fn merge(overrides: &Value, step_id: &str, sources: &[&str]) -> Self {
        let mut merged = Map::new();
        for source in sources {
            if let Some(Value::Object(section)) = overrides.get(*source) {
                for (k, v) in section {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        if let Some(Value::Object(step_section)) = overrides
            .get("steps")
            .and_then(|steps| steps.get(step_id))
        {
            for (k, v) in step_section {
                merged.insert(k.clone(), v.clone());
            }
        }
        Self(merged)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Compiled step content; bridge output replaces template compilation.
#[derive(Debug, Clone, Default)]
pub struct CompiledContent {
    pub subject: Option<String>,
    pub title: Option<String>,
    pub body: String,
}

/// Compile subject/title/body for a step. When bridge output supplies a
/// field it replaces local compilation for that field entirely.
pub async fn compile_content(
    services: &SenderServices,
    ctx: &SendContext,
    template: &StepTemplate,
) -> Result<CompiledContent> {
    let bridge = ctx.bridge.as_ref();

    let body = match bridge.and_then(|b| b.output_str("body")) {
        Some(body) => body.to_string(),
        None => services.compiler.compile(&template.body, &ctx.variables).await?,
    };

    let subject = match bridge.and_then(|b| b.output_str("subject")) {
        Some(subject) => Some(subject.to_string()),
        None => match &template.subject {
            Some(subject) => Some(services.compiler.compile(subject, &ctx.variables).await?),
            None => None,
        },
    };

    let title = match bridge.and_then(|b| b.output_str("title")) {
        Some(title) => Some(title.to_string()),
        None => match &template.title {
            Some(title) => Some(services.compiler.compile(title, &ctx.variables).await?),
            None => None,
        },
    };

    Ok(CompiledContent {
        subject,
        title,
        body,
    })
}

/// Apply the content storage policy and severity to a freshly created
/// message record.
pub fn apply_content(
    message: &mut Message,
    content: &CompiledContent,
    severity: Severity,
    policy: &SendPolicy,
) {
    if policy.store_content {
        message.subject = content.subject.clone();
        message.content = Some(content.body.clone());
    }
    message.severity = severity;
}

/// The shared tail of every provider-backed send: persist the message
/// before the call, deliver, then record the result on the message, the
/// audit trail and the outbound webhook. Provider exceptions never escape
/// — they resolve to a `Failed` outcome.
pub async fn deliver_and_record(
    services: &SenderServices,
    job: &Job,
    mut message: Message,
    delivery: &Delivery,
) -> Result<SendOutcome> {
    services.messages.insert(&message).await?;
    services.audit.message_created(job, &message).await;

    let handler = match services.providers.get(&message.provider_id) {
        Some(handler) => handler,
        None => {
            let reason = format!("no provider handler registered for '{}'", message.provider_id);
            message.mark_error("provider_error", &reason);
            services.messages.update(&message).await?;
            services.audit.provider_error(job, &message, &reason).await;
            return Ok(SendOutcome::failed(LifecycleDetail::ProviderError, reason));
        }
    };

    match handler.deliver(delivery).await {
        Ok(external_id) => {
            message.mark_sent(&external_id);
            services.messages.update(&message).await?;
            services.audit.message_sent(job, &message).await;
            services
                .webhooks
                .send(
                    WebhookEvent::MessageSent,
                    "message",
                    webhook_payload(&message),
                )
                .await;
            tracing::debug!(
                message_id = %message.id,
                provider = %message.provider_id,
                external_id,
                "Message sent"
            );
            Ok(SendOutcome::Success)
        }
        Err(e) => {
            let reason = e.to_string();
            message.mark_error("provider_error", &reason);
            services.messages.update(&message).await?;
            services.audit.provider_error(job, &message, &reason).await;
            services
                .webhooks
                .send(
                    WebhookEvent::MessageFailed,
                    "message",
                    webhook_payload(&message),
                )
                .await;
            tracing::warn!(
                message_id = %message.id,
                provider = %message.provider_id,
                error = %reason,
                "Provider call failed"
            );
            Ok(SendOutcome::failed(LifecycleDetail::ProviderError, reason))
        }
    }
}

fn webhook_payload(message: &Message) -> Value {
    serde_json::json!({
        "message_id": message.id,
        "channel": message.channel,
        "provider_id": message.provider_id,
        "status": message.status,
        "external_id": message.external_id,
        "error": message.error_text,
        "transaction_id": message.transaction_id,
        "subscriber_id": message.subscriber_id,
    })
}

/// Convert a content-generation failure into the terminal `Failed`
/// outcome shared by every sender.
pub fn content_failure(e: HeraldError) -> SendOutcome {
    SendOutcome::failed(LifecycleDetail::ContentNotGenerated, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_precedence_later_wins() {
        let overrides = json!({
            "sendgrid": {"from": "provider@x.io", "reply_to": "p@x.io"},
            "email": {"from": "channel@x.io"},
            "steps": {"step-1": {"from": "step@x.io"}}
        });

        let merged = MergedOverrides::merge(&overrides, "step-1", &["sendgrid", "email"]);
        assert_eq!(merged.get_str("from"), Some("step@x.io"));
        // Provider-level survives when nothing overrides it.
        assert_eq!(merged.get_str("reply_to"), Some("p@x.io"));
    }

    #[test]
    fn test_merge_skips_missing_sections() {
        let overrides = json!({"email": {"to": "a@b.c"}});
        let merged = MergedOverrides::merge(&overrides, "step-9", &["mailgun", "email"]);
        assert_eq!(merged.get_str("to"), Some("a@b.c"));
        assert!(merged.get("from").is_none());
    }

    #[test]
    fn test_string_list() {
        let overrides = json!({"fcm": {"device_tokens": ["t1", "t2"]}});
        let merged = MergedOverrides::merge(&overrides, "s", &["fcm"]);
        assert_eq!(merged.string_list("device_tokens"), vec!["t1", "t2"]);
        assert!(merged.string_list("missing").is_empty());
    }
}
