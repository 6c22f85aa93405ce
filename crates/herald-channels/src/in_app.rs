//! In-app channel sender.
//!
//! In-app messages are stored, not pushed through an external provider:
//! creation is the delivery. Re-sending the same step for the same
//! notification/subscriber updates the existing message in place
//! (unread, unseen, snooze cleared) instead of duplicating it.

use std::sync::Arc;

use async_trait::async_trait;

use herald_core::error::Result;
use herald_core::traits::{IntegrationQuery, WebhookEvent};
use herald_core::types::{
    ChannelKind, DetailStatus, ExecutionDetailKind, LifecycleDetail, Message, MessageStatus,
    RecipientTarget, SendOutcome,
};

use crate::context::{
    apply_content, compile_content, content_failure, MergedOverrides, SendContext, SenderServices,
};
use crate::ChannelSender;

pub struct InAppSender {
    services: Arc<SenderServices>,
}

impl InAppSender {
    pub fn new(services: Arc<SenderServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn send(&self, ctx: &SendContext) -> Result<SendOutcome> {
        let job = &ctx.job;
        let services = &self.services;

        let pre = MergedOverrides::merge(&job.overrides, &job.step.id, &["in_app"]);
        let integration = services
            .integrations
            .resolve(&IntegrationQuery {
                organization_id: &job.organization_id,
                environment_id: &job.environment_id,
                channel: ChannelKind::InApp,
                provider_id: pre.get_str("provider_id"),
                identifier: pre.get_str("integration_identifier"),
                tenant: job.tenant.as_deref(),
            })
            .await?;
        let Some(integration) = integration else {
            services
                .audit
                .record(job, ExecutionDetailKind::IntegrationMissing, DetailStatus::Failed)
                .await;
            return Ok(SendOutcome::failed(
                LifecycleDetail::NoActiveIntegration,
                "no active in-app integration",
            ));
        };

        let content = match compile_content(services, ctx, &job.step.template).await {
            Ok(content) => content,
            Err(e) => {
                services
                    .audit
                    .record_raw(
                        job,
                        ExecutionDetailKind::ContentNotGenerated,
                        DetailStatus::Failed,
                        e.to_string(),
                    )
                    .await;
                return Ok(content_failure(e));
            }
        };

        let existing = services
            .messages
            .find_in_app(&job.notification_id, &job.step.id, &job.subscriber_id)
            .await?;

        let message = match existing {
            Some(mut message) => {
                // Idempotent re-delivery: refresh the stored message.
                message.reopen();
                if services.policy.store_content {
                    message.subject = content.subject.clone();
                    message.content = Some(content.body.clone());
                }
                services.messages.update(&message).await?;
                services
                    .audit
                    .record_raw(
                        job,
                        ExecutionDetailKind::MessageSent,
                        DetailStatus::Success,
                        "existing in-app message re-delivered",
                    )
                    .await;
                message
            }
            None => {
                let mut message = Message::for_job(
                    job,
                    ChannelKind::InApp,
                    &integration.provider_id,
                    &integration.id,
                    RecipientTarget::InApp,
                );
                apply_content(&mut message, &content, ctx.severity, &services.policy);
                message.status = MessageStatus::Sent;
                services.messages.insert(&message).await?;
                services.audit.message_created(job, &message).await;
                services.audit.message_sent(job, &message).await;
                message
            }
        };

        services
            .webhooks
            .send(
                WebhookEvent::MessageSent,
                "message",
                serde_json::json!({
                    "message_id": message.id,
                    "channel": message.channel,
                    "transaction_id": message.transaction_id,
                    "subscriber_id": message.subscriber_id,
                }),
            )
            .await;

        Ok(SendOutcome::Success)
    }
}
