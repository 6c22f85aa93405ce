//! Email channel sender.
//!
//! Override merge order: provider-id section, then `email`, then the
//! step-specific section. A missing recipient address skips the step; a
//! missing integration fails it.

use std::sync::Arc;

use async_trait::async_trait;

use herald_core::error::Result;
use herald_core::types::{
    ChannelKind, DetailStatus, ExecutionDetailKind, LifecycleDetail, Message, RecipientTarget,
    SendOutcome,
};
use herald_core::traits::IntegrationQuery;

use crate::context::{
    apply_content, compile_content, content_failure, deliver_and_record, MergedOverrides,
    SendContext, SenderServices,
};
use crate::providers::Delivery;
use crate::ChannelSender;

pub struct EmailSender {
    services: Arc<SenderServices>,
}

impl EmailSender {
    pub fn new(services: Arc<SenderServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, ctx: &SendContext) -> Result<SendOutcome> {
        let job = &ctx.job;
        let services = &self.services;

        // Channel/step overrides may narrow integration selection before
        // the provider id is known.
        let pre = MergedOverrides::merge(&job.overrides, &job.step.id, &["email"]);
        let integration = services
            .integrations
            .resolve(&IntegrationQuery {
                organization_id: &job.organization_id,
                environment_id: &job.environment_id,
                channel: ChannelKind::Email,
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
                "no active email integration",
            ));
        };

        let overrides = MergedOverrides::merge(
            &job.overrides,
            &job.step.id,
            &[&integration.provider_id, "email"],
        );

        let to = overrides
            .get_str("to")
            .map(String::from)
            .or_else(|| ctx.subscriber.email.clone());
        let Some(to) = to else {
            services
                .audit
                .record(job, ExecutionDetailKind::RecipientMissing, DetailStatus::Warning)
                .await;
            return Ok(SendOutcome::skipped(
                LifecycleDetail::MissingEmailAddress,
                "subscriber has no email address",
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

        let mut message = Message::for_job(
            job,
            ChannelKind::Email,
            &integration.provider_id,
            &integration.id,
            RecipientTarget::Email(to.clone()),
        );
        apply_content(&mut message, &content, ctx.severity, &services.policy);

        let delivery = Delivery {
            recipient: RecipientTarget::Email(to),
            subject: content.subject.clone(),
            title: content.title.clone(),
            body: content.body.clone(),
            credentials: integration.credentials.clone(),
            overrides: overrides.as_value(),
            payload: job.payload.clone(),
            attachments: ctx.attachments.clone(),
        };

        deliver_and_record(services, job, message, &delivery).await
    }
}
