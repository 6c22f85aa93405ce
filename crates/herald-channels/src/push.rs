//! Push channel sender — fans out across every active push integration
//! and the subscriber's device tokens per provider.
//!
//! Override merge order here is provider-id section then step section
//! (no channel section). Credential-bearing overrides (`device_tokens`)
//! synthesize an ad-hoc target even when the subscriber has no stored
//! channel for the provider. Aggregate rule: success if at least one
//! target succeeded, else skipped if at least one target had no tokens,
//! else failed. No tokens for any channel at all is a hard failure.

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
use crate::providers::Delivery;
use crate::ChannelSender;

pub struct PushSender {
    services: Arc<SenderServices>,
}

impl PushSender {
    pub fn new(services: Arc<SenderServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn send(&self, ctx: &SendContext) -> Result<SendOutcome> {
        let job = &ctx.job;
        let services = &self.services;

        let integrations = services
            .integrations
            .resolve_all(
                &job.organization_id,
                &job.environment_id,
                ChannelKind::Push,
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
                "no active push integration",
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

        let mut successes = 0u32;
        let mut skipped = 0u32;
        let mut attempted = 0u32;

        for integration in &integrations {
            let overrides =
                MergedOverrides::merge(&job.overrides, &job.step.id, &[&integration.provider_id]);

            let mut tokens: Vec<String> = ctx
                .subscriber
                .channels_for(&integration.provider_id, integration.identifier.as_deref())
                .iter()
                .flat_map(|c| c.credentials.device_tokens.iter().cloned())
                .collect();
            for token in overrides.string_list("device_tokens") {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }

            if tokens.is_empty() {
                services
                    .audit
                    .record_raw(
                        job,
                        ExecutionDetailKind::RecipientMissing,
                        DetailStatus::Warning,
                        format!("no device tokens for provider {}", integration.provider_id),
                    )
                    .await;
                skipped += 1;
                continue;
            }
            attempted += 1;

            let mut message = Message::for_job(
                job,
                ChannelKind::Push,
                &integration.provider_id,
                &integration.id,
                RecipientTarget::DeviceTokens(tokens.clone()),
            );
            apply_content(&mut message, &content, ctx.severity, &services.policy);

            let delivery = Delivery {
                recipient: RecipientTarget::DeviceTokens(tokens),
                subject: content.subject.clone(),
                title: content.title.clone(),
                body: content.body.clone(),
                credentials: integration.credentials.clone(),
                overrides: overrides.as_value(),
                payload: job.payload.clone(),
                attachments: Vec::new(),
            };

            // Individual target failures do not stop the fan-out.
            if deliver_and_record(services, job, message, &delivery)
                .await?
                .is_success()
            {
                successes += 1;
            }
        }

        if successes > 0 {
            return Ok(SendOutcome::Success);
        }
        if attempted == 0 {
            return Ok(SendOutcome::failed(
                LifecycleDetail::NoActiveChannel,
                "subscriber has no device tokens for any push channel",
            ));
        }
        if skipped > 0 {
            return Ok(SendOutcome::skipped(
                LifecycleDetail::MissingDeviceTokens,
                "no push target succeeded; some had no device tokens",
            ));
        }
        Ok(SendOutcome::failed(
            LifecycleDetail::ProviderError,
            "all push targets failed",
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

    fn push_integration(provider: &str) -> Integration {
        Integration {
            id: format!("int-{provider}"),
            provider_id: provider.into(),
            channel: ChannelKind::Push,
            identifier: None,
            credentials: json!({}),
            active: true,
            primary: false,
        }
    }

    fn push_services(
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

    fn push_ctx(channels: Vec<SubscriberChannel>) -> SendContext {
        let mut step = WorkflowStep::new("step-push", StepType::Push);
        step.template.title = Some("Alert".into());
        step.template.body = "New event".into();
        let mut job = Job::new("tx-1", step, None);
        job.payload = json!({});
        job.overrides = json!({});
        let mut subscriber = Subscriber::new("sub-1");
        subscriber.channels = channels;
        SendContext {
            variables: json!({"payload": {}}),
            job,
            subscriber,
            bridge: None,
            severity: Severity::default(),
            attachments: Vec::new(),
        }
    }

    fn tokens_channel(provider: &str, tokens: &[&str]) -> SubscriberChannel {
        SubscriberChannel {
            provider_id: provider.into(),
            integration_identifier: None,
            credentials: ChannelCredentials {
                device_tokens: tokens.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_one_success_wins_over_failures() {
        let good = Arc::new(LoopbackProvider::new("fcm_a"));
        let bad = Arc::new(LoopbackProvider::new("apns_b"));
        bad.set_failing(true);
        let (services, _) = push_services(
            vec![push_integration("fcm_a"), push_integration("apns_b")],
            vec![good.clone(), bad],
        );
        let sender = PushSender::new(services);

        let ctx = push_ctx(vec![
            tokens_channel("fcm_a", &["t1"]),
            tokens_channel("apns_b", &["t2"]),
        ]);
        let outcome = sender.send(&ctx).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(good.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_all_failures_aggregate_to_failed() {
        let bad = Arc::new(LoopbackProvider::new("fcm_a"));
        bad.set_failing(true);
        let (services, messages) =
            push_services(vec![push_integration("fcm_a")], vec![bad]);
        let sender = PushSender::new(services);

        let ctx = push_ctx(vec![tokens_channel("fcm_a", &["t1"])]);
        let outcome = sender.send(&ctx).await.unwrap();
        match outcome {
            SendOutcome::Failed(f) => assert_eq!(f.detail, LifecycleDetail::ProviderError),
            other => panic!("expected failure, got {other:?}"),
        }
        // Message record exists even though the send failed.
        assert_eq!(messages.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mixed_skip_and_failure_aggregates_to_skipped() {
        let bad = Arc::new(LoopbackProvider::new("fcm_a"));
        bad.set_failing(true);
        let (services, _) = push_services(
            vec![push_integration("fcm_a"), push_integration("apns_b")],
            vec![bad, Arc::new(LoopbackProvider::new("apns_b"))],
        );
        let sender = PushSender::new(services);

        // Tokens only for the failing provider; the other is skipped.
        let ctx = push_ctx(vec![tokens_channel("fcm_a", &["t1"])]);
        let outcome = sender.send(&ctx).await.unwrap();
        match outcome {
            SendOutcome::Skipped(s) => {
                assert_eq!(s.detail, LifecycleDetail::MissingDeviceTokens)
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_tokens_anywhere_is_hard_failure() {
        let (services, _) = push_services(
            vec![push_integration("fcm_a")],
            vec![Arc::new(LoopbackProvider::new("fcm_a"))],
        );
        let sender = PushSender::new(services);

        let ctx = push_ctx(vec![]);
        let outcome = sender.send(&ctx).await.unwrap();
        match outcome {
            SendOutcome::Failed(f) => assert_eq!(f.detail, LifecycleDetail::NoActiveChannel),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_override_tokens_synthesize_target() {
        let provider = Arc::new(LoopbackProvider::new("fcm_a"));
        let (services, messages) =
            push_services(vec![push_integration("fcm_a")], vec![provider.clone()]);
        let sender = PushSender::new(services);

        let mut ctx = push_ctx(vec![]);
        ctx.job.overrides = json!({"fcm_a": {"device_tokens": ["adhoc-1", "adhoc-2"]}});
        let outcome = sender.send(&ctx).await.unwrap();
        assert!(outcome.is_success());

        let stored = messages.all().await;
        assert_eq!(
            stored[0].recipient,
            RecipientTarget::DeviceTokens(vec!["adhoc-1".into(), "adhoc-2".into()])
        );
    }

    #[tokio::test]
    async fn test_no_integrations_is_integration_failure() {
        let (services, _) = push_services(vec![], vec![]);
        let sender = PushSender::new(services);
        let outcome = sender.send(&push_ctx(vec![])).await.unwrap();
        match outcome {
            SendOutcome::Failed(f) => {
                assert_eq!(f.detail, LifecycleDetail::NoActiveIntegration)
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
