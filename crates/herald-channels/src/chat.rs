//! Chat channel sender — fans out across the subscriber's chat channels
//! per active integration, including a synthetic WhatsApp-Business target
//! derived from the subscriber's phone number.
//!
//! Override merge order is channel section (`chat`) then step section.
//! A channel with no webhook url is skipped per target; no deliverable
//! target at all skips the step (unlike push, which fails hard).

use std::sync::Arc;

use async_trait::async_trait;

use herald_core::error::Result;
use herald_core::types::{
    ChannelKind, DetailStatus, ExecutionDetailKind, LifecycleDetail, Message, RecipientTarget,
    SendOutcome,
};

use crate::context::{
    apply_content, compile_content, content_failure, deliver_and_record, MergedOverrides,
    SendContext, SenderServices,
};
use crate::providers::{Delivery, WHATSAPP_BUSINESS};
use crate::ChannelSender;

pub struct ChatSender {
    services: Arc<SenderServices>,
}

impl ChatSender {
    pub fn new(services: Arc<SenderServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChannelSender for ChatSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    async fn send(&self, ctx: &SendContext) -> Result<SendOutcome> {
        let job = &ctx.job;
        let services = &self.services;

        let integrations = services
            .integrations
            .resolve_all(
                &job.organization_id,
                &job.environment_id,
                ChannelKind::Chat,
                job.tenant.as_deref(),
            )
            .await?;
        if integrations.is_empty() {
            services
                .audit
                .record(job, ExecutionDetailKind::IntegrationMissing, DetailStatus::Failed)
                .await;
            return Ok(SendOutcome::failed(
                LifecycleDetail::NoActiveIntegration,
                "no active chat integration",
            ));
        }

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

        let overrides = MergedOverrides::merge(&job.overrides, &job.step.id, &["chat"]);

        let mut successes = 0u32;
        let mut skipped = 0u32;

        for integration in &integrations {
            // Synthetic WhatsApp-Business channel: the subscriber's phone
            // number stands in for a stored chat channel.
            if integration.provider_id == WHATSAPP_BUSINESS {
                let Some(phone) = ctx.subscriber.phone.clone() else {
                    services
                        .audit
                        .record_raw(
                            job,
                            ExecutionDetailKind::RecipientMissing,
                            DetailStatus::Warning,
                            "no phone number for whatsapp business channel",
                        )
                        .await;
                    skipped += 1;
                    continue;
                };
                let mut message = Message::for_job(
                    job,
                    ChannelKind::Chat,
                    &integration.provider_id,
                    &integration.id,
                    RecipientTarget::Phone(phone.clone()),
                );
                apply_content(&mut message, &content, ctx.severity, &services.policy);
                let delivery = Delivery {
                    recipient: RecipientTarget::Phone(phone),
                    subject: None,
                    title: None,
                    body: content.body.clone(),
                    credentials: integration.credentials.clone(),
                    overrides: overrides.as_value(),
                    payload: job.payload.clone(),
                    attachments: Vec::new(),
                };
                if deliver_and_record(services, job, message, &delivery)
                    .await?
                    .is_success()
                {
                    successes += 1;
                }
                continue;
            }

            let mut urls: Vec<String> = ctx
                .subscriber
                .channels_for(&integration.provider_id, integration.identifier.as_deref())
                .iter()
                .filter_map(|c| c.credentials.webhook_url.clone())
                .collect();
            if urls.is_empty() {
                if let Some(url) = overrides.get_str("webhook_url") {
                    urls.push(url.to_string());
                }
            }
            if urls.is_empty() {
                services
                    .audit
                    .record_raw(
                        job,
                        ExecutionDetailKind::RecipientMissing,
                        DetailStatus::Warning,
                        format!("no chat webhook for provider {}", integration.provider_id),
                    )
                    .await;
                skipped += 1;
                continue;
            }

            for url in urls {
                let mut message = Message::for_job(
                    job,
                    ChannelKind::Chat,
                    &integration.provider_id,
                    &integration.id,
                    RecipientTarget::WebhookUrl(url.clone()),
                );
                apply_content(&mut message, &content, ctx.severity, &services.policy);
                let delivery = Delivery {
                    recipient: RecipientTarget::WebhookUrl(url),
                    subject: None,
                    title: None,
                    body: content.body.clone(),
                    credentials: integration.credentials.clone(),
                    overrides: overrides.as_value(),
                    payload: job.payload.clone(),
                    attachments: Vec::new(),
                };
                if deliver_and_record(services, job, message, &delivery)
                    .await?
                    .is_success()
                {
                    successes += 1;
                }
            }
        }

        if successes > 0 {
            return Ok(SendOutcome::Success);
        }
        if skipped > 0 {
            return Ok(SendOutcome::skipped(
                LifecycleDetail::MissingChatWebhook,
                "no chat target succeeded; some channels had no webhook",
            ));
        }
        Ok(SendOutcome::failed(
            LifecycleDetail::ProviderError,
            "all chat targets failed",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SendPolicy;
    use crate::providers::{LoopbackProvider, ProviderRegistry};
    use herald_core::audit::ExecutionAudit;
    use herald_core::types::{
        ChannelCredentials, Integration, Job, Severity, StepType, Subscriber, SubscriberChannel,
        WorkflowStep,
    };
    use herald_store::{
        MemoryExecutionLog, MemoryMessageStore, NullWebhookNotifier, SimpleTemplateCompiler,
        StaticIntegrationResolver,
    };
    use serde_json::json;

    fn chat_integration(provider: &str) -> Integration {
        Integration {
            id: format!("int-{provider}"),
            provider_id: provider.into(),
            channel: ChannelKind::Chat,
            identifier: None,
            credentials: json!({}),
            active: true,
            primary: false,
        }
    }

    fn chat_services(
        integrations: Vec<Integration>,
        providers: Vec<Arc<LoopbackProvider>>,
    ) -> (Arc<SenderServices>, Arc<MemoryMessageStore>) {
        let messages = Arc::new(MemoryMessageStore::new());
        let mut registry = ProviderRegistry::new();
        for p in providers {
            registry.register(p);
        }
        let services = Arc::new(SenderServices {
            integrations: Arc::new(StaticIntegrationResolver::new(integrations)),
            compiler: Arc::new(SimpleTemplateCompiler),
            messages: messages.clone(),
            audit: ExecutionAudit::new(Arc::new(MemoryExecutionLog::new())),
            webhooks: Arc::new(NullWebhookNotifier),
            providers: Arc::new(registry),
            policy: SendPolicy::default(),
        });
        (services, messages)
    }

    fn chat_ctx(channels: Vec<SubscriberChannel>, phone: Option<&str>) -> SendContext {
        let mut step = WorkflowStep::new("step-chat", StepType::Chat);
        step.template.body = "Deploy finished".into();
        let mut job = Job::new("tx-1", step, None);
        job.overrides = json!({});
        let mut subscriber = Subscriber::new("sub-1");
        subscriber.channels = channels;
        subscriber.phone = phone.map(String::from);
        SendContext {
            variables: json!({"payload": {}}),
            job,
            subscriber,
            bridge: None,
            severity: Severity::default(),
            attachments: Vec::new(),
        }
    }

    fn webhook_channel(provider: &str, url: &str) -> SubscriberChannel {
        SubscriberChannel {
            provider_id: provider.into(),
            integration_identifier: None,
            credentials: ChannelCredentials {
                webhook_url: Some(url.into()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_multi_channel_fanout_success() {
        let slack = Arc::new(LoopbackProvider::new("slack"));
        let (services, messages) = chat_services(
            vec![chat_integration("slack")],
            vec![slack.clone()],
        );
        let sender = ChatSender::new(services);

        let ctx = chat_ctx(
            vec![
                webhook_channel("slack", "https://hooks.slack.test/a"),
                webhook_channel("slack", "https://hooks.slack.test/b"),
            ],
            None,
        );
        let outcome = sender.send(&ctx).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(slack.sent_count(), 2);
        assert_eq!(messages.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_whatsapp_business_synthesized_from_phone() {
        let wa = Arc::new(LoopbackProvider::new(WHATSAPP_BUSINESS));
        let (services, messages) = chat_services(
            vec![chat_integration(WHATSAPP_BUSINESS)],
            vec![wa.clone()],
        );
        let sender = ChatSender::new(services);

        let ctx = chat_ctx(vec![], Some("+84901112222"));
        let outcome = sender.send(&ctx).await.unwrap();
        assert!(outcome.is_success());
        let stored = messages.all().await;
        assert_eq!(
            stored[0].recipient,
            RecipientTarget::Phone("+84901112222".into())
        );
    }

    #[tokio::test]
    async fn test_no_webhook_anywhere_is_skip() {
        let (services, _) = chat_services(
            vec![chat_integration("slack")],
            vec![Arc::new(LoopbackProvider::new("slack"))],
        );
        let sender = ChatSender::new(services);

        let outcome = sender.send(&chat_ctx(vec![], None)).await.unwrap();
        match outcome {
            SendOutcome::Skipped(s) => {
                assert_eq!(s.detail, LifecycleDetail::MissingChatWebhook)
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_override_webhook_url_fills_missing_channel() {
        let slack = Arc::new(LoopbackProvider::new("slack"));
        let (services, _) = chat_services(
            vec![chat_integration("slack")],
            vec![slack.clone()],
        );
        let sender = ChatSender::new(services);

        let mut ctx = chat_ctx(vec![], None);
        ctx.job.overrides = json!({"chat": {"webhook_url": "https://hooks.slack.test/adhoc"}});
        let outcome = sender.send(&ctx).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(slack.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_still_succeeds() {
        let slack = Arc::new(LoopbackProvider::new("slack"));
        let discord = Arc::new(LoopbackProvider::new("discord"));
        discord.set_failing(true);
        let (services, _) = chat_services(
            vec![chat_integration("slack"), chat_integration("discord")],
            vec![slack, discord],
        );
        let sender = ChatSender::new(services);

        let ctx = chat_ctx(
            vec![
                webhook_channel("slack", "https://hooks.slack.test/a"),
                webhook_channel("discord", "https://discord.test/hook"),
            ],
            None,
        );
        let outcome = sender.send(&ctx).await.unwrap();
        assert!(outcome.is_success());
    }
}
